//! One-stop handle over every registry client

use crate::client::ApiClient;
use crate::concepts::ConceptsClient;
use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::liking::LikingClient;
use crate::profile::ProfileClient;
use crate::readme::ReadmeClient;
use crate::session::SessionManager;
use crate::storage::TokenStore;

/// Domain clients sharing one [`ApiClient`] and session
#[derive(Clone)]
pub struct Registry {
    pub session: SessionManager,
    pub concepts: ConceptsClient,
    pub profile: ProfileClient,
    pub liking: LikingClient,
    pub readme: ReadmeClient,
}

impl Registry {
    /// Build every client from configuration and a token store
    pub fn new(config: &ClientConfig, tokens: TokenStore) -> Result<Self, ClientError> {
        let api = ApiClient::from_config(config, tokens)?;
        Ok(Self::from_client(api, config))
    }

    pub fn from_client(api: ApiClient, config: &ClientConfig) -> Self {
        Self {
            session: SessionManager::from_config(api.clone(), config),
            concepts: ConceptsClient::new(api.clone()),
            profile: ProfileClient::new(api.clone()),
            liking: LikingClient::new(api.clone()),
            readme: ReadmeClient::new(api),
        }
    }

    pub fn api(&self) -> &ApiClient {
        self.session.client()
    }
}
