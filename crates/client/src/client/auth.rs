//! Authentication API client methods

use super::{ApiClient, ApiRequest};
use crate::error::ClientError;
use crate::types::{
    AuthResponse, CurrentUserResponse, LoginRequest, LogoutResponse, RefreshRequest,
    RefreshResponse, RegisterRequest,
};
use serde_json::json;

impl ApiClient {
    /// Log in with email and password
    pub async fn login(&self, email: &str, password: &str) -> Result<AuthResponse, ClientError> {
        let request = ApiRequest::post("/auth/login").json(&LoginRequest {
            email: email.to_string(),
            password: password.to_string(),
        })?;
        self.send(request).await
    }

    /// Register a new account; empty optional fields are omitted
    pub async fn register(&self, request: RegisterRequest) -> Result<AuthResponse, ClientError> {
        let non_empty = |value: Option<String>| value.filter(|v| !v.is_empty());
        let request = RegisterRequest {
            name: non_empty(request.name),
            username: non_empty(request.username),
            bio: non_empty(request.bio),
            ..request
        };
        self.send(ApiRequest::post("/auth/register").json(&request)?)
            .await
    }

    /// Exchange a refresh token for a rotated token pair
    pub async fn refresh_tokens(&self, refresh_token: &str) -> Result<RefreshResponse, ClientError> {
        let request = ApiRequest::post("/auth/refresh").json(&RefreshRequest {
            refresh_token: refresh_token.to_string(),
        })?;
        // Sent without the 401 retry layer: this call is what that layer runs,
        // and a 401 here is final anyway.
        let response = self.dispatch(&request).await?;
        Ok(response.json().await?)
    }

    /// Revoke the session identified by `access_token`
    pub async fn logout(&self, access_token: &str) -> Result<LogoutResponse, ClientError> {
        let request = ApiRequest::post("/auth/logout")
            .json(&json!({}))?
            .bearer(access_token);
        self.send(request).await
    }

    /// Resolve the user id that `access_token` belongs to
    pub async fn current_user(&self, access_token: &str) -> Result<String, ClientError> {
        let request = ApiRequest::post("/auth/_getUser")
            .json(&json!({}))?
            .bearer(access_token);
        let response: CurrentUserResponse = self.send(request).await?;
        Ok(response.user)
    }
}
