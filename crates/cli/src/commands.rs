//! CLI commands

use anyhow::{Context, Result, bail};
use clap::Subcommand;
use conceptual_client::types::{FileMap, ProfileUpdate, ReadmeOptions, RegisterRequest};
use conceptual_client::{AuthStatus, LikeTracker, Registry, load_upload_dir};
use std::path::{Component, Path, PathBuf};
use std::time::Duration;
use tracing::info;

#[derive(Subcommand)]
pub enum Commands {
    /// Log in and store the session
    Login {
        #[arg(long)]
        email: String,

        #[arg(long, env = "CONCEPTUAL_PASSWORD", hide_env_values = true)]
        password: String,
    },

    /// Create an account and store the session
    Register {
        #[arg(long)]
        email: String,

        #[arg(long, env = "CONCEPTUAL_PASSWORD", hide_env_values = true)]
        password: String,

        #[arg(long)]
        name: Option<String>,

        #[arg(long)]
        username: Option<String>,

        #[arg(long)]
        bio: Option<String>,
    },

    /// Revoke and forget the stored session
    Logout,

    /// Validate the stored session and print the user id
    Whoami,

    /// List registered concepts
    List,

    /// Show the published versions and stats of a concept
    Versions {
        /// Concept unique name
        name: String,
    },

    /// Print the files of a concept
    Files {
        name: String,

        /// Version to read (latest when omitted)
        #[arg(long)]
        version: Option<String>,
    },

    /// Download a concept version into a directory
    Download {
        name: String,
        version: String,

        /// Author username recorded with the download
        #[arg(long)]
        author: Option<String>,

        /// Output directory
        #[arg(short, long, default_value = ".")]
        output: PathBuf,
    },

    /// Publish a folder as the next version of a concept
    Publish {
        /// Folder to upload
        dir: PathBuf,

        /// Unique name (defaults to the folder name)
        #[arg(long)]
        name: Option<String>,
    },

    /// Like a concept
    Like { concept: String },

    /// Remove a like from a concept
    Unlike { concept: String },

    /// List liked concepts
    Likes {
        /// User to list (defaults to the logged-in user)
        #[arg(long)]
        user: Option<String>,
    },

    /// User profiles
    Profile {
        #[command(subcommand)]
        command: ProfileCommands,
    },

    /// Concept README
    Readme {
        #[command(subcommand)]
        command: ReadmeCommands,
    },
}

#[derive(Subcommand)]
pub enum ProfileCommands {
    /// Show a profile (defaults to the logged-in user)
    Show { user: Option<String> },

    /// Update fields of your profile
    Set {
        #[arg(long)]
        username: Option<String>,

        #[arg(long)]
        display_name: Option<String>,

        #[arg(long)]
        avatar_url: Option<String>,

        #[arg(long)]
        bio: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum ReadmeCommands {
    /// Print the README
    Get { concept: String },

    /// Ask the server to generate the README
    Generate {
        concept: String,

        /// Replace an existing README
        #[arg(long)]
        overwrite: bool,

        /// Display name used in the generated text
        #[arg(long)]
        display_name: Option<String>,

        /// Wait until the README is available
        #[arg(long)]
        wait: bool,

        /// Seconds between polls while waiting
        #[arg(long, default_value = "3")]
        poll_interval: u64,

        /// Polls before giving up
        #[arg(long, default_value = "20")]
        attempts: u32,
    },

    /// Replace the README with the content of a file
    Update { concept: String, file: PathBuf },
}

impl Commands {
    pub async fn execute(self, registry: &Registry) -> Result<()> {
        match self {
            Self::Login { email, password } => {
                let user = registry
                    .session
                    .login_with_password(&email, &password)
                    .await?;
                println!("Logged in as {user}");
                Ok(())
            }
            Self::Register {
                email,
                password,
                name,
                username,
                bio,
            } => {
                let user = registry
                    .session
                    .register(RegisterRequest {
                        email,
                        password,
                        name,
                        username,
                        bio,
                    })
                    .await?;
                println!("Registered and logged in as {user}");
                Ok(())
            }
            Self::Logout => {
                registry.session.logout().await;
                println!("Logged out");
                Ok(())
            }
            Self::Whoami => match registry.session.initialize().await {
                AuthStatus::Authenticated { user_id } => {
                    println!("{user_id}");
                    Ok(())
                }
                _ => bail!("not logged in"),
            },
            Self::List => list_concepts(registry).await,
            Self::Versions { name } => show_versions(registry, &name).await,
            Self::Files { name, version } => {
                let files = registry
                    .concepts
                    .get_concept_files(&name, version.as_deref())
                    .await?;
                for (path, content) in files {
                    println!("==> {path} <==\n{content}");
                }
                Ok(())
            }
            Self::Download {
                name,
                version,
                author,
                output,
            } => {
                let files = registry
                    .concepts
                    .download_version(&name, &version, author.as_deref())
                    .await?;
                let written = write_files(&output, &files)?;
                println!("Downloaded {written} files to {}", output.display());
                Ok(())
            }
            Self::Publish { dir, name } => publish(registry, &dir, name).await,
            Self::Like { concept } => toggle_like(registry, &concept, true).await,
            Self::Unlike { concept } => toggle_like(registry, &concept, false).await,
            Self::Likes { user } => {
                let user = match user {
                    Some(user) => user,
                    None => logged_in_user(registry)?,
                };
                for item in registry.liking.liked_items(&user).await {
                    let name = registry.concepts.get_concept_unique_name(&item).await;
                    println!("{name}");
                }
                Ok(())
            }
            Self::Profile { command } => command.execute(registry).await,
            Self::Readme { command } => command.execute(registry).await,
        }
    }
}

impl ProfileCommands {
    pub async fn execute(self, registry: &Registry) -> Result<()> {
        match self {
            Self::Show { user } => {
                let user = match user {
                    Some(user) => user,
                    None => logged_in_user(registry)?,
                };
                let profile = registry.profile.get_profile(&user).await?;
                println!("{}", serde_json::to_string_pretty(&profile)?);
                Ok(())
            }
            Self::Set {
                username,
                display_name,
                avatar_url,
                bio,
            } => {
                let update = ProfileUpdate {
                    username,
                    display_name,
                    avatar_url,
                    bio,
                };
                if update.is_empty() {
                    bail!("nothing to update");
                }
                let user = logged_in_user(registry)?;
                let response = registry.profile.set_profile(&user, &update).await?;
                if !response.ok {
                    bail!("profile update was not accepted");
                }
                println!("Profile updated");
                Ok(())
            }
        }
    }
}

impl ReadmeCommands {
    pub async fn execute(self, registry: &Registry) -> Result<()> {
        match self {
            Self::Get { concept } => {
                let concept_id = resolve_concept_id(registry, &concept).await?;
                match registry.readme.get_readme(&concept_id).await {
                    Some(readme) => println!("{}", readme.content.unwrap_or_default()),
                    None => bail!("no README for {concept}"),
                }
                Ok(())
            }
            Self::Generate {
                concept,
                overwrite,
                display_name,
                wait,
                poll_interval,
                attempts,
            } => {
                let concept_id = resolve_concept_id(registry, &concept).await?;
                let options = ReadmeOptions {
                    overwrite,
                    display_name,
                    ..ReadmeOptions::default()
                };
                if !wait {
                    registry.readme.generate_readme(&concept_id, &options).await?;
                    println!("README generation requested for {concept}");
                    return Ok(());
                }
                let readme = registry
                    .readme
                    .generate_and_wait(
                        &concept_id,
                        &options,
                        Duration::from_secs(poll_interval),
                        attempts,
                    )
                    .await?;
                match readme {
                    Some(readme) => println!("{}", readme.content.unwrap_or_default()),
                    None => bail!("README for {concept} was not ready after {attempts} polls"),
                }
                Ok(())
            }
            Self::Update { concept, file } => {
                let content = std::fs::read_to_string(&file)
                    .with_context(|| format!("failed to read {}", file.display()))?;
                let concept_id = resolve_concept_id(registry, &concept).await?;
                let readme = registry.readme.update_readme(&concept_id, &content).await?;
                println!("Updated {}", readme.path);
                Ok(())
            }
        }
    }
}

async fn list_concepts(registry: &Registry) -> Result<()> {
    let concepts = registry.concepts.get_all_concepts().await?;
    if concepts.is_empty() {
        println!("No concepts registered");
        return Ok(());
    }
    for concept in concepts {
        let author = if concept.author_username.is_empty() {
            concept.owner
        } else {
            concept.author_username
        };
        println!("{:<32} {:<20} {}", concept.unique_name, author, concept.updated_at);
    }
    Ok(())
}

async fn show_versions(registry: &Registry, name: &str) -> Result<()> {
    let concept_id = resolve_concept_id(registry, name).await?;
    let (versions, downloads, likes, latest) = tokio::join!(
        registry.concepts.get_versions(&concept_id),
        registry.concepts.download_count(name),
        registry.liking.count_for_item(&concept_id),
        registry.concepts.get_concept_latest_version(&concept_id),
    );

    println!("{name} ({concept_id})");
    println!(
        "latest: {}  downloads: {downloads}  likes: {likes}",
        latest.as_deref().unwrap_or("-")
    );
    for version in versions? {
        println!(
            "  v{:<6} {:<10} {:<10} {}",
            version.version.to_string(),
            version.semver,
            version.status,
            version.published_at
        );
    }
    Ok(())
}

async fn publish(registry: &Registry, dir: &Path, name: Option<String>) -> Result<()> {
    let files = load_upload_dir(dir).with_context(|| format!("failed to read {}", dir.display()))?;
    let name = match name {
        Some(name) => name,
        None => dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .context("cannot infer a concept name from the folder, pass --name")?,
    };

    info!(name = %name, files = files.len(), "Publishing folder");
    let published = registry
        .concepts
        .publish_concept_with_folder(&name, &files)
        .await?;
    if published.recovered {
        println!(
            "Published {name} version {} (confirmed from the version list)",
            published.version
        );
    } else {
        println!("Published {name} version {}", published.version);
    }
    Ok(())
}

async fn toggle_like(registry: &Registry, name: &str, like: bool) -> Result<()> {
    let user = logged_in_user(registry)?;
    let concept_id = resolve_concept_id(registry, name).await?;

    let mut tracker = LikeTracker::new(registry.liking.clone(), concept_id, user);
    let current = tracker.fetch().await;
    if current.liked == like {
        println!("{name}: {} likes", current.count);
        return Ok(());
    }

    let response = tracker.toggle().await;
    if let Some(error) = response.error {
        bail!(error);
    }
    println!("{name}: {} likes", tracker.state().count);
    Ok(())
}

async fn resolve_concept_id(registry: &Registry, name: &str) -> Result<String> {
    registry
        .concepts
        .get_concept_id(name)
        .await?
        .with_context(|| format!("concept {name} not found"))
}

fn logged_in_user(registry: &Registry) -> Result<String> {
    registry
        .api()
        .tokens()
        .user_id()
        .context("not logged in, run `conceptual login` first")
}

/// Write downloaded files under `root`.
///
/// Every path is checked before anything is written, so a map containing a
/// path that escapes `root` leaves the directory untouched.
fn write_files(root: &Path, files: &FileMap) -> Result<usize> {
    if let Some(unsafe_path) = files.keys().find(|path| {
        Path::new(path)
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
    }) {
        bail!("refusing to write unsafe path {unsafe_path}");
    }

    for (relative, content) in files {
        let path = root.join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, content)
            .with_context(|| format!("failed to write {}", path.display()))?;
    }
    Ok(files.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_nested_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut files = FileMap::new();
        files.insert("Counter/spec.md".into(), "# Counter".into());
        files.insert("Counter/src/counter.ts".into(), "export {}".into());

        assert_eq!(write_files(dir.path(), &files).unwrap(), 2);
        let spec = std::fs::read_to_string(dir.path().join("Counter/spec.md")).unwrap();
        assert_eq!(spec, "# Counter");
        assert!(dir.path().join("Counter/src/counter.ts").exists());
    }

    #[test]
    fn rejects_escaping_paths() {
        let dir = tempfile::tempdir().unwrap();
        let mut files = FileMap::new();
        files.insert("../evil.sh".into(), "rm -rf /".into());
        assert!(write_files(dir.path(), &files).is_err());

        let mut files = FileMap::new();
        files.insert("/etc/passwd".into(), String::new());
        assert!(write_files(dir.path(), &files).is_err());
    }

    #[test]
    fn unsafe_path_anywhere_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let mut files = FileMap::new();
        files.insert("Alpha/spec.md".into(), "# Alpha".into());
        files.insert("Zeta/../../evil.sh".into(), "echo".into());

        assert!(write_files(dir.path(), &files).is_err());
        assert!(!dir.path().join("Alpha").exists());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
