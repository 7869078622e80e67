//! Client configuration

use crate::error::ClientError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Server used when neither environment variable is set
pub const DEFAULT_SERVER_URL: &str = "http://localhost:8000";

/// Variable read first in an interactive (client) context
pub const PUBLIC_SERVER_URL_VAR: &str = "CONCEPTUAL_PUBLIC_SERVER_URL";

/// Variable read first in a server/background context
pub const SERVER_URL_VAR: &str = "CONCEPTUAL_SERVER_URL";

/// Path prefix of every registry endpoint
pub const API_PREFIX: &str = "/api";

/// Authentication configuration
pub struct AuthConfig;

impl AuthConfig {
    /// Proactive refresh interval, shorter than the 15 minute access token lifetime
    pub const TOKEN_REFRESH_INTERVAL: Duration = Duration::from_secs(10 * 60);

    /// Storage key for the user id
    pub const USER_ID_KEY: &'static str = "conceptual_user_id";

    /// Storage key for the access token
    pub const ACCESS_TOKEN_KEY: &'static str = "conceptual_access_token";

    /// Storage key for the refresh token
    pub const REFRESH_TOKEN_KEY: &'static str = "conceptual_refresh_token";

    /// Auth endpoints that must never carry a bearer token
    pub const NO_AUTH_PATHS: [&'static str; 3] = ["/auth/login", "/auth/register", "/auth/refresh"];

    /// Namespace whose 401s never trigger a refresh
    pub const AUTH_NAMESPACE: &'static str = "/auth/";
}

/// Where the client runs, which decides the server URL variable consulted first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutionContext {
    /// Interactive front-end with persistent token storage
    #[default]
    Client,
    /// Background or server-side process without token storage
    Server,
}

/// Pick the server URL for a context, falling back to the other variable and then the default
pub fn resolve_server_url(
    context: ExecutionContext,
    public_url: Option<&str>,
    server_url: Option<&str>,
) -> String {
    fn present(value: Option<&str>) -> Option<&str> {
        value.map(str::trim).filter(|v| !v.is_empty())
    }

    let (first, second) = match context {
        ExecutionContext::Client => (public_url, server_url),
        ExecutionContext::Server => (server_url, public_url),
    };
    present(first)
        .or_else(|| present(second))
        .unwrap_or(DEFAULT_SERVER_URL)
        .to_string()
}

/// Resolved client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Registry server root, without the `/api` prefix
    pub server_url: String,

    /// Request timeout in seconds
    pub timeout_secs: u64,

    /// Proactive token refresh interval in seconds
    pub refresh_interval_secs: u64,

    /// User agent sent with every request
    pub user_agent: String,
}

/// Raw layered settings before the server URL is resolved for a context
#[derive(Debug, Deserialize)]
struct RawClientConfig {
    public_server_url: Option<String>,
    server_url: Option<String>,
    timeout_secs: u64,
    refresh_interval_secs: u64,
    user_agent: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            timeout_secs: 10,
            refresh_interval_secs: AuthConfig::TOKEN_REFRESH_INTERVAL.as_secs(),
            user_agent: concat!("conceptual-client/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl ClientConfig {
    /// Create a configuration pointing at a specific server
    pub fn with_server_url(server_url: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
            ..Self::default()
        }
    }

    /// Load configuration with defaults and `CONCEPTUAL_*` environment variables
    ///
    /// # Errors
    ///
    /// Returns an error if environment variables cannot be parsed
    pub fn from_env(context: ExecutionContext) -> Result<Self, ClientError> {
        Self::load(context, None)
    }

    /// Load configuration from an optional file, overridden by the environment
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or the values cannot be parsed
    pub fn load(context: ExecutionContext, file: Option<&Path>) -> Result<Self, ClientError> {
        let defaults = Self::default();

        let mut builder = config::Config::builder()
            .set_default("timeout_secs", defaults.timeout_secs)
            .and_then(|b| b.set_default("refresh_interval_secs", defaults.refresh_interval_secs))
            .and_then(|b| b.set_default("user_agent", defaults.user_agent))
            .map_err(|e| ClientError::Configuration(e.to_string()))?;

        if let Some(path) = file {
            builder = builder.add_source(config::File::from(path).required(false));
        }

        let raw: RawClientConfig = builder
            .add_source(config::Environment::with_prefix("CONCEPTUAL").try_parsing(true))
            .build()
            .and_then(|settings| settings.try_deserialize::<RawClientConfig>())
            .map_err(|e| ClientError::Configuration(e.to_string()))?;

        let config = Self {
            server_url: resolve_server_url(
                context,
                raw.public_server_url.as_deref(),
                raw.server_url.as_deref(),
            ),
            timeout_secs: raw.timeout_secs,
            refresh_interval_secs: raw.refresh_interval_secs,
            user_agent: raw.user_agent,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check that the server URL is an absolute http(s) URL and the intervals are usable
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Configuration`] describing the first problem found
    pub fn validate(&self) -> Result<(), ClientError> {
        let url = url::Url::parse(&self.server_url).map_err(|e| {
            ClientError::Configuration(format!("invalid server url '{}': {e}", self.server_url))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ClientError::Configuration(format!(
                "server url must use http or https, got '{}'",
                url.scheme()
            )));
        }
        if self.timeout_secs == 0 {
            return Err(ClientError::Configuration(
                "timeout_secs must be greater than zero".into(),
            ));
        }
        if self.refresh_interval_secs == 0 {
            return Err(ClientError::Configuration(
                "refresh_interval_secs must be greater than zero".into(),
            ));
        }
        Ok(())
    }

    /// Base URL every API path is appended to
    pub fn api_base_url(&self) -> String {
        format!("{}{API_PREFIX}", self.server_url.trim_end_matches('/'))
    }

    /// Request timeout
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Proactive refresh interval
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_context_prefers_public_url() {
        let url = resolve_server_url(
            ExecutionContext::Client,
            Some("https://public.example"),
            Some("https://internal.example"),
        );
        assert_eq!(url, "https://public.example");
    }

    #[test]
    fn server_context_prefers_server_url() {
        let url = resolve_server_url(
            ExecutionContext::Server,
            Some("https://public.example"),
            Some("https://internal.example"),
        );
        assert_eq!(url, "https://internal.example");
    }

    #[test]
    fn contexts_fall_back_to_each_other_then_default() {
        assert_eq!(
            resolve_server_url(ExecutionContext::Server, Some("https://public.example"), None),
            "https://public.example"
        );
        assert_eq!(
            resolve_server_url(ExecutionContext::Client, None, Some("  ")),
            DEFAULT_SERVER_URL
        );
        assert_eq!(
            resolve_server_url(ExecutionContext::Client, None, None),
            DEFAULT_SERVER_URL
        );
    }

    #[test]
    fn api_base_url_strips_trailing_slash() {
        let config = ClientConfig::with_server_url("http://registry.local:8000/");
        assert_eq!(config.api_base_url(), "http://registry.local:8000/api");
    }

    #[test]
    fn validate_rejects_bad_urls() {
        assert!(ClientConfig::with_server_url("not a url").validate().is_err());
        assert!(ClientConfig::with_server_url("ftp://host").validate().is_err());
        assert!(ClientConfig::default().validate().is_ok());
    }

    #[test]
    fn validate_rejects_zero_durations() {
        let config = ClientConfig {
            timeout_secs: 0,
            ..ClientConfig::default()
        };
        assert!(matches!(config.validate(), Err(ClientError::Configuration(m)) if m.contains("timeout_secs")));

        let config = ClientConfig {
            refresh_interval_secs: 0,
            ..ClientConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn resolved_url_is_trimmed() {
        assert_eq!(
            resolve_server_url(ExecutionContext::Client, Some("  https://public.example "), None),
            "https://public.example"
        );
    }

    #[test]
    fn load_reads_values_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("client.toml");
        std::fs::write(&path, "timeout_secs = 3\nrefresh_interval_secs = 42\n").unwrap();

        let config = ClientConfig::load(ExecutionContext::Client, Some(&path)).unwrap();
        assert_eq!(config.timeout(), Duration::from_secs(3));
        assert_eq!(config.refresh_interval(), Duration::from_secs(42));
    }
}
