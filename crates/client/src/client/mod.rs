//! Registry HTTP client
//!
//! [`ApiClient`] is the single entry point for every registry call. It attaches
//! the stored access token and, when the server answers 401, runs one shared
//! token refresh and replays the request with the new token. Any number of
//! requests failing at the same time wait on that single refresh and all see
//! the same outcome.

pub mod auth;
mod request;

pub use request::{ApiRequest, MultipartField, RequestBody};

use crate::config::{AuthConfig, ClientConfig};
use crate::error::{ClientError, RefreshError};
use crate::storage::TokenStore;
use reqwest::{Client, ClientBuilder, Response, header};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

type RefreshOutcome = Result<String, RefreshError>;

/// Callback run when a failed refresh has ended the stored session
pub type SessionEndedHook = Arc<dyn Fn(&RefreshError) + Send + Sync>;

/// Shared refresh coordination state
#[derive(Debug, Default)]
struct RefreshState {
    in_progress: bool,
    pending: Vec<oneshot::Sender<RefreshOutcome>>,
}

/// Registry API client
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    tokens: TokenStore,
    refresh: Arc<Mutex<RefreshState>>,
    session_ended: Arc<Mutex<Option<SessionEndedHook>>>,
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.base_url)
            .field("tokens", &self.tokens)
            .finish_non_exhaustive()
    }
}

/// True for the auth endpoints that never carry a bearer token
fn skips_token_injection(path: &str) -> bool {
    AuthConfig::NO_AUTH_PATHS.contains(&path)
}

/// True for paths whose 401s are final
fn is_auth_namespace(path: &str) -> bool {
    path.starts_with(AuthConfig::AUTH_NAMESPACE)
}

impl ApiClient {
    /// Create a new client with default configuration
    pub fn new(base_url: impl Into<String>, tokens: TokenStore) -> Result<Self, ClientError> {
        Self::builder().base_url(base_url).tokens(tokens).build()
    }

    /// Create a client from resolved configuration
    pub fn from_config(config: &ClientConfig, tokens: TokenStore) -> Result<Self, ClientError> {
        config.validate()?;
        Self::builder()
            .base_url(config.api_base_url())
            .timeout(config.timeout())
            .user_agent(config.user_agent.clone())
            .tokens(tokens)
            .build()
    }

    /// Create a new client builder
    pub fn builder() -> ApiClientBuilder {
        ApiClientBuilder::default()
    }

    /// Get the base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Token store shared with the session manager
    pub fn tokens(&self) -> &TokenStore {
        &self.tokens
    }

    /// True while a token refresh is in flight
    pub fn is_refreshing(&self) -> bool {
        self.lock_refresh().in_progress
    }

    /// POST a JSON body and decode the JSON response
    pub async fn post<B, T>(&self, path: &str, body: &B) -> Result<T, ClientError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.send(ApiRequest::post(path).json(body)?).await
    }

    /// Send a request and decode the JSON response
    pub async fn send<T: DeserializeOwned>(&self, request: ApiRequest) -> Result<T, ClientError> {
        let response = self.send_with_refresh(request).await?;
        Ok(response.json().await?)
    }

    /// Send a request, refreshing the session and replaying once on 401
    pub async fn send_with_refresh(&self, mut request: ApiRequest) -> Result<Response, ClientError> {
        match self.dispatch(&request).await {
            Err(e)
                if e.is_unauthorized()
                    && !request.is_retried()
                    && !is_auth_namespace(request.path()) =>
            {
                request.mark_retried();
                debug!(path = request.path(), "Access token rejected, refreshing session");

                let access_token = self.refresh_session().await?;
                request.set_bearer(&access_token);

                self.dispatch(&request).await.inspect_err(|e| log_failure(&request, e))
            }
            Err(e) => {
                log_failure(&request, &e);
                Err(e)
            }
            Ok(response) => Ok(response),
        }
    }

    /// Obtain a fresh access token, joining a refresh that is already in flight.
    ///
    /// At most one refresh call runs at a time. On failure the stored auth data
    /// has been cleared and every waiter receives the same error.
    pub async fn refresh_session(&self) -> Result<String, RefreshError> {
        let waiter = {
            let mut state = self.lock_refresh();
            if state.in_progress {
                let (tx, rx) = oneshot::channel();
                state.pending.push(tx);
                Some(rx)
            } else {
                state.in_progress = true;
                None
            }
        };

        if let Some(rx) = waiter {
            debug!("Token refresh already in flight, waiting for its outcome");
            return rx.await.unwrap_or(Err(RefreshError::Abandoned));
        }

        let mut guard = RefreshGuard {
            state: &self.refresh,
            settled: false,
        };
        let outcome = self.perform_refresh().await;
        guard.settle(&outcome);
        outcome
    }

    /// Register the callback run when a failed refresh ends the session.
    ///
    /// Replaces any previous callback. Clones of this client share it.
    pub fn on_session_ended(&self, hook: impl Fn(&RefreshError) + Send + Sync + 'static) {
        *self
            .session_ended
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(hook));
    }

    async fn perform_refresh(&self) -> RefreshOutcome {
        let (epoch, refresh_token) = self.tokens.refresh_snapshot();
        let Some(refresh_token) = refresh_token else {
            warn!("No refresh token available, ending session");
            return Err(self.end_session(epoch, RefreshError::MissingRefreshToken));
        };

        match self.refresh_tokens(&refresh_token).await {
            Ok(rotated) => {
                if !self
                    .tokens
                    .rotate_tokens(epoch, &rotated.access_token, &rotated.refresh_token)
                {
                    info!("Session changed during token refresh, discarding rotated tokens");
                    return Err(RefreshError::Abandoned);
                }
                info!("Access token refreshed");
                Ok(rotated.access_token)
            }
            Err(e) => {
                warn!(error = %e, "Token refresh failed");
                Err(self.end_session(epoch, RefreshError::Rejected(e.message())))
            }
        }
    }

    /// Clear the session the failed refresh belonged to and notify the hook.
    /// A session replaced meanwhile is left alone.
    fn end_session(&self, epoch: u64, reason: RefreshError) -> RefreshError {
        if !self.tokens.clear_auth_data_if(epoch) {
            debug!("Session changed during token refresh, keeping current credentials");
            return reason;
        }
        warn!(error = %reason, "Session ended");

        let hook = self
            .session_ended
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(hook) = hook {
            hook(&reason);
        }
        reason
    }

    /// Send one attempt of a request
    async fn dispatch(&self, request: &ApiRequest) -> Result<Response, ClientError> {
        let url = format!("{}{}", self.base_url, request.path());
        let mut builder = self
            .client
            .request(request.method().clone(), url)
            .headers(request.headers().clone());

        if !request.is_multipart() && !request.headers().contains_key(header::CONTENT_TYPE) {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
        }

        if !skips_token_injection(request.path())
            && !request.headers().contains_key(header::AUTHORIZATION)
        {
            if let Some(token) = self.tokens.access_token() {
                builder = builder.bearer_auth(token);
            }
        }

        builder = match request.body() {
            RequestBody::Empty => builder,
            RequestBody::Json(bytes) => builder.body(bytes.clone()),
            RequestBody::Multipart(fields) => builder.multipart(request::build_form(fields)),
        };

        let response = builder.send().await?;
        let status = response.status();

        if status.is_success() {
            Ok(response)
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(ClientError::from_response_body(status, &body))
        }
    }

    fn lock_refresh(&self) -> MutexGuard<'_, RefreshState> {
        self.refresh.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Settles the shared refresh state exactly once, even if the refreshing task is dropped
struct RefreshGuard<'a> {
    state: &'a Mutex<RefreshState>,
    settled: bool,
}

impl RefreshGuard<'_> {
    fn settle(&mut self, outcome: &RefreshOutcome) {
        self.settled = true;
        let pending = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            state.in_progress = false;
            std::mem::take(&mut state.pending)
        };
        if !pending.is_empty() {
            debug!(waiters = pending.len(), "Releasing requests queued on token refresh");
        }
        for waiter in pending {
            // The waiter may have been dropped; nothing to deliver then.
            let _ = waiter.send(outcome.clone());
        }
    }
}

impl Drop for RefreshGuard<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.settle(&Err(RefreshError::Abandoned));
        }
    }
}

fn log_failure(request: &ApiRequest, error: &ClientError) {
    let path = request.path();
    match error {
        ClientError::Request(e) if e.status().is_none() => {
            error!(path, error = %e, "Network error");
        }
        e if e.status().is_some() => {
            warn!(path, status = e.status(), message = %e.message(), "API error");
        }
        e => {
            error!(path, error = %e, "Request error");
        }
    }
}

/// Builder for [`ApiClient`]
#[derive(Default)]
pub struct ApiClientBuilder {
    base_url: Option<String>,
    timeout: Option<Duration>,
    user_agent: Option<String>,
    tokens: Option<TokenStore>,
}

impl ApiClientBuilder {
    /// Set the base URL (including the `/api` prefix)
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Set the request timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the user agent
    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = Some(agent.into());
        self
    }

    /// Set the token store; defaults to a detached store
    pub fn tokens(mut self, tokens: TokenStore) -> Self {
        self.tokens = Some(tokens);
        self
    }

    /// Build the client
    pub fn build(self) -> Result<ApiClient, ClientError> {
        let base_url = self
            .base_url
            .ok_or_else(|| ClientError::Configuration("base_url is required".into()))?;

        // Ensure base_url ends without a trailing slash
        let base_url = base_url.trim_end_matches('/').to_string();

        let timeout = self
            .timeout
            .unwrap_or_else(|| ClientConfig::default().timeout());
        let user_agent = self
            .user_agent
            .unwrap_or_else(|| ClientConfig::default().user_agent);

        let client = ClientBuilder::new()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()?;

        Ok(ApiClient {
            client,
            base_url,
            tokens: self.tokens.unwrap_or_else(TokenStore::detached),
            refresh: Arc::new(Mutex::new(RefreshState::default())),
            session_ended: Arc::default(),
        })
    }
}
