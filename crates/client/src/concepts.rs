//! Concept registry client methods

use crate::client::ApiClient;
use crate::error::ClientError;
use crate::inflight::InFlightSet;
use crate::types::{
    ConceptIdRow, ConceptItem, ConceptVersion, CountResponse, FileMap, FilesResponse,
    LatestVersionRow, OneOrMany, OwnerRow, PublishRequest, PublishResponse, RegistryAllResponse,
    UniqueNameRow, UploadFile, VersionNumber,
};
use serde::Serialize;
use serde_json::json;
use std::collections::BTreeMap;
use std::io;
use std::path::Path;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Major component of a semver string as a non-negative integer.
///
/// `"2.1.3"` is 2. Non-numeric or negative majors are rejected.
pub fn parse_version_number(semver: &str) -> Result<u64, ClientError> {
    let major = semver.trim().split('.').next().unwrap_or_default().trim();
    major.parse::<u64>().map_err(|_| {
        ClientError::Validation(format!(
            "Invalid version number. Expected non-negative integer, got: {semver}"
        ))
    })
}

fn version_of(version: &ConceptVersion) -> Option<u64> {
    match &version.version {
        VersionNumber::Number(n) => Some(*n),
        VersionNumber::Text(text) => parse_version_number(text)
            .or_else(|_| parse_version_number(&version.semver))
            .ok(),
    }
}

/// Result of a publish
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedVersion {
    pub version: String,
    /// The response was lost and the version was read back from the version list
    pub recovered: bool,
}

/// Read a folder into upload entries.
///
/// Paths are `/`-separated and start with the folder's own name, the way a
/// browser folder picker reports them. Entries are sorted by path.
pub fn load_upload_dir(root: &Path) -> io::Result<Vec<UploadFile>> {
    let prefix = root
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();

    let mut files = Vec::new();
    let mut stack = vec![(root.to_path_buf(), prefix)];
    while let Some((dir, relative)) = stack.pop() {
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            let path = if relative.is_empty() {
                name
            } else {
                format!("{relative}/{name}")
            };
            let file_type = entry.file_type()?;
            if file_type.is_dir() {
                stack.push((entry.path(), path));
            } else if file_type.is_file() {
                files.push(UploadFile::new(path, std::fs::read(entry.path())?));
            }
        }
    }
    files.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(files)
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DownloadRequest<'a> {
    #[serde(rename = "unique_name")]
    unique_name: &'a str,
    version: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    access_token: Option<String>,
    #[serde(rename = "author_username", skip_serializing_if = "Option::is_none")]
    author_username: Option<&'a str>,
}

/// Concept publishing, browsing and downloading
#[derive(Debug, Clone)]
pub struct ConceptsClient {
    api: ApiClient,
    publishing: InFlightSet,
}

impl ConceptsClient {
    pub fn new(api: ApiClient) -> Self {
        Self {
            api,
            publishing: InFlightSet::new(),
        }
    }

    /// True while a publish for `unique_name` is running
    pub fn is_publishing(&self, unique_name: &str) -> bool {
        self.publishing.contains(unique_name.trim())
    }

    /// Publish a folder as the next version of `unique_name`.
    ///
    /// A second publish for the same name fails with
    /// [`ClientError::PublishInProgress`] until the first finishes. If the
    /// request fails on the client side after it was sent, the version list
    /// is consulted and a version newer than the one seen before submitting
    /// is reported as the outcome.
    pub async fn publish_concept_with_folder(
        &self,
        unique_name: &str,
        files: &[UploadFile],
    ) -> Result<PublishedVersion, ClientError> {
        let unique_name = unique_name.trim();
        if unique_name.is_empty() {
            return Err(ClientError::Validation("Concept name is required".into()));
        }
        if files.is_empty() {
            return Err(ClientError::Validation(
                "Please select a folder to upload".into(),
            ));
        }

        let Some(_guard) = self.publishing.try_acquire(unique_name) else {
            return Err(ClientError::PublishInProgress(unique_name.to_string()));
        };

        let baseline = self.latest_version_number(unique_name).await;

        let request = PublishRequest {
            unique_name,
            files: files
                .iter()
                .map(|file| (file.path.as_str(), file.bytes.as_slice()))
                .collect::<BTreeMap<_, _>>(),
            request_id: Uuid::new_v4().to_string(),
            access_token: self.api.tokens().access_token(),
        };
        debug!(
            unique_name,
            files = request.files.len(),
            request_id = %request.request_id,
            "Publishing concept"
        );

        match self
            .api
            .post::<_, PublishResponse>("/registry/publish", &request)
            .await
        {
            Ok(response) => {
                info!(unique_name, version = %response.version, "Concept published");
                Ok(PublishedVersion {
                    version: response.version.to_string(),
                    recovered: false,
                })
            }
            Err(e) if e.is_client_side() => {
                warn!(unique_name, error = %e, "Publish response lost, checking version list");
                match self.latest_version_number(unique_name).await {
                    Some(latest) if baseline.is_none_or(|before| latest > before) => {
                        info!(unique_name, version = latest, "Publish confirmed from version list");
                        Ok(PublishedVersion {
                            version: latest.to_string(),
                            recovered: true,
                        })
                    }
                    _ => Err(e),
                }
            }
            Err(e) => Err(e),
        }
    }

    /// Highest published version of `unique_name`, if it can be determined
    async fn latest_version_number(&self, unique_name: &str) -> Option<u64> {
        let concept_id = self.get_concept_id(unique_name).await.ok().flatten()?;
        let versions = self.get_versions(&concept_id).await.ok()?;
        versions.iter().filter_map(version_of).max()
    }

    /// All registered concepts, without versions
    pub async fn get_all_concepts(&self) -> Result<Vec<ConceptItem>, ClientError> {
        let response: RegistryAllResponse = self.api.post("/registry/all", &json!({})).await?;
        Ok(response.results.into_iter().map(ConceptItem::from).collect())
    }

    /// File contents of a concept, latest version unless `version` is given
    pub async fn get_concept_files(
        &self,
        unique_name: &str,
        version: Option<&str>,
    ) -> Result<FileMap, ClientError> {
        let mut body = json!({ "unique_name": unique_name });
        if let Some(version) = version {
            body["version"] = json!(version);
        }
        let response: FilesResponse = self.api.post("/registry/files", &body).await?;
        Ok(response.files)
    }

    /// Concept id registered under `unique_name`
    pub async fn get_concept_id(&self, unique_name: &str) -> Result<Option<String>, ClientError> {
        let rows: OneOrMany<ConceptIdRow> = self
            .api
            .post(
                "/ConceptRegistering/_getConceptByUniqueName",
                &json!({ "uniqueName": unique_name }),
            )
            .await?;
        Ok(rows.first_or_default().concept.filter(|id| !id.is_empty()))
    }

    /// Published versions of a concept
    pub async fn get_versions(&self, concept_id: &str) -> Result<Vec<ConceptVersion>, ClientError> {
        self.api
            .post(
                "/ConceptRegistering/_listVersions",
                &json!({ "concept": concept_id }),
            )
            .await
    }

    /// Download the files of one version. The server records the download.
    pub async fn download_version(
        &self,
        unique_name: &str,
        version: &str,
        author_username: Option<&str>,
    ) -> Result<FileMap, ClientError> {
        let request = DownloadRequest {
            unique_name,
            version,
            access_token: self.api.tokens().access_token(),
            author_username,
        };
        let response: FilesResponse = self.api.post("/registry/download", &request).await?;
        info!(unique_name, version, files = response.files.len(), "Downloaded concept version");
        Ok(response.files)
    }

    /// Number of downloads of a concept; 0 when unavailable
    pub async fn download_count(&self, unique_name: &str) -> u64 {
        self.api
            .post::<_, OneOrMany<CountResponse>>(
                "/Downloading/_countForItem",
                &json!({ "item": unique_name }),
            )
            .await
            .map(|rows| rows.first_or_default().n)
            .unwrap_or(0)
    }

    /// Unique name of a concept id; the id itself when unavailable
    pub async fn get_concept_unique_name(&self, concept: &str) -> String {
        self.api
            .post::<_, OneOrMany<UniqueNameRow>>(
                "/ConceptRegistering/_getUniqueName",
                &json!({ "concept": concept }),
            )
            .await
            .ok()
            .and_then(|rows| rows.first_or_default().unique_name)
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| concept.to_string())
    }

    /// Owner of a concept id; empty when unavailable
    pub async fn get_concept_owner(&self, concept: &str) -> String {
        self.api
            .post::<_, OneOrMany<OwnerRow>>("/ConceptRegistering/_getOwner", &json!({ "concept": concept }))
            .await
            .ok()
            .and_then(|rows| rows.first_or_default().owner)
            .unwrap_or_default()
    }

    /// Latest published version of a concept id, if any
    pub async fn get_concept_latest_version(&self, concept: &str) -> Option<String> {
        self.api
            .post::<_, OneOrMany<LatestVersionRow>>(
                "/ConceptRegistering/_latestPublished",
                &json!({ "concept": concept }),
            )
            .await
            .ok()
            .and_then(|rows| rows.first_or_default().version)
            .map(|version| version.to_string())
            .filter(|version| !version.is_empty())
    }
}
