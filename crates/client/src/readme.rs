//! README generation and editing

use crate::client::{ApiClient, ApiRequest};
use crate::error::ClientError;
use crate::inflight::InFlightSet;
use crate::types::{Readme, ReadmeOptions};
use serde::Serialize;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    concept: &'a str,
    #[serde(flatten)]
    options: &'a ReadmeOptions,
    #[serde(skip_serializing_if = "Option::is_none")]
    access_token: Option<String>,
}

/// README generation is asynchronous server-side: trigger it, then poll
#[derive(Debug, Clone)]
pub struct ReadmeClient {
    api: ApiClient,
    generating: InFlightSet,
}

impl ReadmeClient {
    pub fn new(api: ApiClient) -> Self {
        Self {
            api,
            generating: InFlightSet::new(),
        }
    }

    /// True while generation for `concept` is being triggered or awaited
    pub fn is_generating(&self, concept: &str) -> bool {
        self.generating.contains(concept)
    }

    /// Trigger generation. Rejected while another generation for `concept` runs here.
    pub async fn generate_readme(
        &self,
        concept: &str,
        options: &ReadmeOptions,
    ) -> Result<(), ClientError> {
        let Some(_guard) = self.generating.try_acquire(concept) else {
            return Err(ClientError::ReadmeInProgress(concept.to_string()));
        };
        self.trigger(concept, options).await
    }

    /// Trigger generation and poll until content appears.
    ///
    /// The concept stays claimed for the whole wait. Returns `None` if no
    /// content showed up within `attempts` polls.
    pub async fn generate_and_wait(
        &self,
        concept: &str,
        options: &ReadmeOptions,
        interval: Duration,
        attempts: u32,
    ) -> Result<Option<Readme>, ClientError> {
        let Some(_guard) = self.generating.try_acquire(concept) else {
            return Err(ClientError::ReadmeInProgress(concept.to_string()));
        };
        self.trigger(concept, options).await?;
        Ok(self.wait_for_readme(concept, interval, attempts).await)
    }

    async fn trigger(&self, concept: &str, options: &ReadmeOptions) -> Result<(), ClientError> {
        let request = GenerateRequest {
            concept,
            options,
            access_token: self.api.tokens().access_token(),
        };
        self.api
            .send_with_refresh(ApiRequest::post("/registry/readme/generate").json(&request)?)
            .await?;
        info!(concept, overwrite = options.overwrite, "README generation requested");
        Ok(())
    }

    /// Current README; `None` when missing or unavailable
    pub async fn get_readme(&self, concept: &str) -> Option<Readme> {
        match self
            .api
            .post::<_, Readme>("/registry/readme/get", &json!({ "concept": concept }))
            .await
        {
            Ok(readme) => Some(readme),
            Err(e) => {
                debug!(concept, error = %e, "README unavailable");
                None
            }
        }
    }

    /// Poll every `interval` until the README has content, at most `attempts` times
    pub async fn wait_for_readme(
        &self,
        concept: &str,
        interval: Duration,
        attempts: u32,
    ) -> Option<Readme> {
        for attempt in 1..=attempts {
            if let Some(readme) = self.get_readme(concept).await {
                if readme.content.as_deref().is_some_and(|c| !c.is_empty()) {
                    return Some(readme);
                }
            }
            debug!(concept, attempt, "README not ready yet");
            if attempt < attempts {
                tokio::time::sleep(interval).await;
            }
        }
        None
    }

    /// Replace the README content
    pub async fn update_readme(&self, concept: &str, content: &str) -> Result<Readme, ClientError> {
        self.api
            .post(
                "/registry/readme/update",
                &json!({ "concept": concept, "content": content }),
            )
            .await
    }
}
