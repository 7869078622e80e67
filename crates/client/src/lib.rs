//! Conceptual registry client
//!
//! Authenticated HTTP client for the concept registry: token persistence,
//! transparent access token refresh, session lifecycle, and the concept,
//! profile, liking and README endpoints.

pub mod client;
pub mod concepts;
pub mod config;
pub mod error;
pub mod inflight;
pub mod liking;
pub mod profile;
pub mod readme;
pub mod registry;
pub mod session;
pub mod storage;
pub mod types;

pub use client::{ApiClient, ApiClientBuilder, ApiRequest};
pub use concepts::{ConceptsClient, PublishedVersion, load_upload_dir, parse_version_number};
pub use config::{ClientConfig, ExecutionContext};
pub use error::{ClientError, RefreshError};
pub use liking::{LikeState, LikeTracker, LikingClient};
pub use profile::ProfileClient;
pub use readme::ReadmeClient;
pub use registry::Registry;
pub use session::{AuthStatus, SessionManager};
pub use storage::{FileStorage, MemoryStorage, StorageBackend, TokenStore};
