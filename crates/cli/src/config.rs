//! CLI configuration utilities

use anyhow::{Context, Result};
use conceptual_client::{ClientConfig, ExecutionContext, FileStorage, Registry, TokenStore};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Config file looked up in the data directory when `--config` is not given
const CONFIG_FILE_NAME: &str = "config.toml";

/// File holding the persisted session
const SESSION_FILE_NAME: &str = "session.json";

/// Data directory: explicit flag or `CONCEPTUAL_STATE_DIR`, then the system data dir
pub fn resolve_data_dir(explicit: Option<PathBuf>) -> PathBuf {
    explicit.unwrap_or_else(|| {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("conceptual")
    })
}

/// Load client configuration: defaults, then the config file, then `CONCEPTUAL_*`
/// variables, then `--server`
pub fn load_client_config(
    data_dir: &Path,
    config_file: Option<&Path>,
    server: Option<String>,
) -> Result<ClientConfig> {
    let default_file = data_dir.join(CONFIG_FILE_NAME);
    let file = config_file.unwrap_or(&default_file);
    debug!(path = %file.display(), "Loading configuration");

    let mut config = ClientConfig::load(ExecutionContext::Client, Some(file))
        .with_context(|| format!("failed to load configuration from {}", file.display()))?;

    if let Some(server) = server {
        config.server_url = server;
        config.validate()?;
    }
    Ok(config)
}

/// Session file inside the data directory
pub fn session_path(data_dir: &Path) -> PathBuf {
    data_dir.join(SESSION_FILE_NAME)
}

/// Build the registry clients over the session file in `data_dir`
pub fn open_registry(config: &ClientConfig, data_dir: &Path) -> Result<Registry> {
    std::fs::create_dir_all(data_dir)
        .with_context(|| format!("failed to create data directory {}", data_dir.display()))?;
    let tokens = TokenStore::new(FileStorage::new(session_path(data_dir)));
    Ok(Registry::new(config, tokens)?)
}
