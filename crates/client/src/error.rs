//! Client error types

use thiserror::Error;

/// Client error types
#[derive(Debug, Error)]
pub enum ClientError {
    /// Network or request error
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Server returned an error status
    #[error("Server error {status}: {message}")]
    ServerError { status: u16, message: String },

    /// Authentication failed
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Resource not found
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Bad request
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Forbidden
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    /// Input rejected before anything was sent
    #[error("{0}")]
    Validation(String),

    /// The session could not be refreshed and has been torn down
    #[error("Session ended: {0}")]
    Refresh(#[from] RefreshError),

    /// A publish for the same concept name is still running
    #[error("A publish for '{0}' is already in progress")]
    PublishInProgress(String),

    /// README generation for the same concept is still running
    #[error("README generation for '{0}' is already in progress")]
    ReadmeInProgress(String),
}

/// Outcome shared by every request waiting on the same token refresh.
///
/// Cloned into each waiter, so all of them fail with the same value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RefreshError {
    #[error("no refresh token")]
    MissingRefreshToken,

    #[error("token refresh failed: {0}")]
    Rejected(String),

    #[error("token refresh was abandoned before completing")]
    Abandoned,
}

/// Error body returned by the registry (`{ "error": "..." }`)
#[derive(Debug, serde::Deserialize)]
pub(crate) struct ApiErrorBody {
    pub error: Option<String>,
}

impl ClientError {
    /// Create error from HTTP status code
    pub fn from_status(status: reqwest::StatusCode, message: String) -> Self {
        match status.as_u16() {
            400 => Self::BadRequest(message),
            401 => Self::AuthenticationFailed(message),
            403 => Self::Forbidden(message),
            404 => Self::NotFound(message),
            _ => Self::ServerError {
                status: status.as_u16(),
                message,
            },
        }
    }

    /// Build an error from a raw response body, preferring the server's `error` field
    pub(crate) fn from_response_body(status: reqwest::StatusCode, body: &str) -> Self {
        let message = serde_json::from_str::<ApiErrorBody>(body)
            .ok()
            .and_then(|parsed| parsed.error)
            .unwrap_or_else(|| {
                if body.is_empty() {
                    status.to_string()
                } else {
                    body.to_string()
                }
            });
        Self::from_status(status, message)
    }

    /// True when the server answered 401
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::AuthenticationFailed(_))
    }

    /// True when the session was torn down after a failed refresh
    pub fn is_session_ended(&self) -> bool {
        matches!(self, Self::Refresh(_))
    }

    /// True for transport failures where no HTTP status was received
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Request(e) if e.status().is_none() && !e.is_decode())
    }

    /// Failures on our side of the wire: the server may have processed the request
    pub fn is_client_side(&self) -> bool {
        matches!(self, Self::Request(e) if e.status().is_none()) || matches!(self, Self::Serialization(_))
    }

    /// HTTP status carried by this error, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::BadRequest(_) => Some(400),
            Self::AuthenticationFailed(_) => Some(401),
            Self::Forbidden(_) => Some(403),
            Self::NotFound(_) => Some(404),
            Self::ServerError { status, .. } => Some(*status),
            Self::Request(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// The server-provided message for status errors, the display text otherwise
    pub fn message(&self) -> String {
        match self {
            Self::BadRequest(m)
            | Self::AuthenticationFailed(m)
            | Self::Forbidden(m)
            | Self::NotFound(m)
            | Self::ServerError { message: m, .. } => m.clone(),
            other => other.to_string(),
        }
    }
}
