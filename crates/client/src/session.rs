//! Authentication session management
//!
//! [`SessionManager`] owns the login/logout lifecycle on top of an
//! [`ApiClient`] and its [`TokenStore`](crate::storage::TokenStore), and runs
//! a background timer that refreshes the access token before it expires so
//! that normal use never hits the reactive 401 path.

use crate::client::ApiClient;
use crate::config::ClientConfig;
use crate::error::{ClientError, RefreshError};
use crate::types::RegisterRequest;
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Authentication state exposed to front-ends
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AuthStatus {
    /// Persisted credentials are still being validated
    Loading,
    Unauthenticated,
    Authenticated { user_id: String },
}

impl AuthStatus {
    pub fn user_id(&self) -> Option<&str> {
        match self {
            Self::Authenticated { user_id } => Some(user_id),
            _ => None,
        }
    }
}

struct SessionInner {
    client: ApiClient,
    refresh_interval: Duration,
    status: watch::Sender<AuthStatus>,
    timer: Mutex<Option<CancellationToken>>,
}

impl Drop for SessionInner {
    fn drop(&mut self) {
        let slot = self.timer.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(timer) = slot.take() {
            timer.cancel();
        }
    }
}

/// Login, logout and proactive token refresh
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<SessionInner>,
}

impl SessionManager {
    /// Create a manager refreshing every `refresh_interval`. Starts in [`AuthStatus::Loading`].
    ///
    /// Installs itself as the client's session-ended hook, so a refresh that
    /// fails on any request also ends this manager's session.
    pub fn new(client: ApiClient, refresh_interval: Duration) -> Self {
        let (status, _) = watch::channel(AuthStatus::Loading);
        let inner = Arc::new(SessionInner {
            client,
            refresh_interval,
            status,
            timer: Mutex::new(None),
        });

        let session = Arc::downgrade(&inner);
        inner.client.on_session_ended(move |reason| {
            if let Some(inner) = session.upgrade() {
                Self { inner }.session_ended(reason);
            }
        });

        Self { inner }
    }

    /// Create a manager using the configured refresh interval
    pub fn from_config(client: ApiClient, config: &ClientConfig) -> Self {
        Self::new(client, config.refresh_interval())
    }

    pub fn client(&self) -> &ApiClient {
        &self.inner.client
    }

    /// Current state
    pub fn status(&self) -> AuthStatus {
        self.inner.status.borrow().clone()
    }

    /// Receive every state change
    pub fn subscribe(&self) -> watch::Receiver<AuthStatus> {
        self.inner.status.subscribe()
    }

    pub fn user_id(&self) -> Option<String> {
        self.status().user_id().map(str::to_string)
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self.status(), AuthStatus::Authenticated { .. })
    }

    /// True while the proactive refresh timer is armed
    pub fn is_refresh_timer_running(&self) -> bool {
        self.lock_timer()
            .as_ref()
            .is_some_and(|timer| !timer.is_cancelled())
    }

    /// Hydrate from persisted credentials.
    ///
    /// Missing tokens settle as unauthenticated after clearing stale data.
    /// Present tokens are validated against the server; on success the
    /// server's identity is adopted and the refresh timer starts.
    pub async fn initialize(&self) -> AuthStatus {
        self.set_status(AuthStatus::Loading);
        let tokens = self.client().tokens();

        let (Some(access_token), Some(_)) = (tokens.access_token(), tokens.refresh_token()) else {
            debug!("No persisted session");
            tokens.clear_auth_data();
            self.set_status(AuthStatus::Unauthenticated);
            return self.status();
        };

        match self.client().current_user(&access_token).await {
            Ok(user_id) => {
                info!(%user_id, "Restored persisted session");
                tokens.set_user_id(&user_id);
                self.set_status(AuthStatus::Authenticated { user_id });
                self.start_refresh_timer();
            }
            Err(e) => {
                warn!(error = %e, "Persisted session is no longer valid");
                tokens.clear_auth_data();
                self.set_status(AuthStatus::Unauthenticated);
            }
        }
        self.status()
    }

    /// Adopt a session: persist credentials, update state, (re)start the refresh timer
    pub fn login(&self, user_id: &str, access_token: &str, refresh_token: &str) {
        self.client()
            .tokens()
            .set_auth_data(user_id, access_token, refresh_token);
        self.set_status(AuthStatus::Authenticated {
            user_id: user_id.to_string(),
        });
        self.start_refresh_timer();
        info!(user_id, "Logged in");
    }

    /// Authenticate with email and password and adopt the resulting session
    pub async fn login_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<String, ClientError> {
        let auth = self.client().login(email, password).await?;
        self.login(&auth.user, &auth.access_token, &auth.refresh_token);
        Ok(auth.user)
    }

    /// Create an account and adopt the resulting session
    pub async fn register(&self, request: RegisterRequest) -> Result<String, ClientError> {
        let auth = self.client().register(request).await?;
        self.login(&auth.user, &auth.access_token, &auth.refresh_token);
        Ok(auth.user)
    }

    /// End the session locally. The server-side revoke is best effort.
    pub async fn logout(&self) {
        let tokens = self.client().tokens();
        if let Some(access_token) = tokens.access_token() {
            if let Err(e) = self.client().logout(&access_token).await {
                warn!(error = %e, "Logout API call failed, clearing local session anyway");
            }
        }
        self.stop_refresh_timer();
        tokens.clear_auth_data();
        self.set_status(AuthStatus::Unauthenticated);
        info!("Logged out");
    }

    /// One proactive refresh.
    ///
    /// A failure that ends the session tears it down through the client's
    /// session-ended hook. A refresh overtaken by a login or logout fails
    /// without touching the newer session.
    pub async fn refresh_now(&self) -> Result<(), RefreshError> {
        match self.client().refresh_session().await {
            Ok(_) => {
                debug!("Proactive token refresh succeeded");
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "Proactive token refresh failed");
                Err(e)
            }
        }
    }

    /// The stored session is gone: stop the timer and settle as unauthenticated
    fn session_ended(&self, reason: &RefreshError) {
        info!(reason = %reason, "Session ended by failed token refresh");
        self.stop_refresh_timer();
        self.set_status(AuthStatus::Unauthenticated);
    }

    /// Arm the refresh timer, replacing any running one
    pub fn start_refresh_timer(&self) {
        let cancel = CancellationToken::new();
        if let Some(previous) = self.lock_timer().replace(cancel.clone()) {
            previous.cancel();
        }

        let period = self.inner.refresh_interval;
        let session = Arc::downgrade(&self.inner);
        tokio::spawn(run_refresh_timer(session, period, cancel));
        debug!(?period, "Proactive refresh timer started");
    }

    /// Disarm the refresh timer
    pub fn stop_refresh_timer(&self) {
        if let Some(timer) = self.lock_timer().take() {
            timer.cancel();
            debug!("Proactive refresh timer stopped");
        }
    }

    fn set_status(&self, status: AuthStatus) {
        self.inner.status.send_replace(status);
    }

    fn lock_timer(&self) -> std::sync::MutexGuard<'_, Option<CancellationToken>> {
        self.inner.timer.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

async fn run_refresh_timer(session: Weak<SessionInner>, period: Duration, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = ticker.tick() => {
                let Some(inner) = session.upgrade() else { break };
                // A failure that ended the session has cancelled this timer already;
                // any other failure leaves the session and the next tick alone.
                let _ = SessionManager { inner }.refresh_now().await;
            }
        }
    }
}
