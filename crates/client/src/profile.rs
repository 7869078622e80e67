//! User profile client methods

use crate::client::ApiClient;
use crate::error::ClientError;
use crate::types::{OneOrMany, Profile, ProfileUpdate, SetProfileResponse};
use serde::Serialize;
use serde_json::json;

#[derive(Serialize)]
struct SetProfileRequest<'a> {
    user: &'a str,
    #[serde(flatten)]
    update: &'a ProfileUpdate,
}

#[derive(Debug, Clone)]
pub struct ProfileClient {
    api: ApiClient,
}

impl ProfileClient {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }

    /// Profile of `user`; all fields empty when no profile exists yet
    pub async fn get_profile(&self, user: &str) -> Result<Profile, ClientError> {
        let rows: OneOrMany<Profile> = self
            .api
            .post("/UserProfileDisplaying/_profileOf", &json!({ "user": user }))
            .await?;
        Ok(rows.first_or_default())
    }

    /// Update the provided fields of `user`'s profile
    pub async fn set_profile(
        &self,
        user: &str,
        update: &ProfileUpdate,
    ) -> Result<SetProfileResponse, ClientError> {
        self.api
            .post(
                "/UserProfileDisplaying/setProfile",
                &SetProfileRequest { user, update },
            )
            .await
    }
}
