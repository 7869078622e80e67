//! Wire types for the registry API

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Response that some query endpoints wrap in an array and others return bare
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    Many(Vec<T>),
    One(T),
}

impl<T> OneOrMany<T> {
    /// The single object, or the first element of the array
    pub fn first(self) -> Option<T> {
        match self {
            Self::Many(items) => items.into_iter().next(),
            Self::One(item) => Some(item),
        }
    }
}

impl<T: Default> OneOrMany<T> {
    /// The single object, the first element, or `T::default()` for an empty array
    pub fn first_or_default(self) -> T {
        self.first().unwrap_or_default()
    }
}

// Auth

#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
}

/// Returned by both login and register
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub user: String,
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshResponse {
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogoutResponse {
    #[serde(default)]
    pub status: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CurrentUserResponse {
    pub user: String,
}

// Registry

/// One file of a folder upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadFile {
    /// `/`-separated path relative to the upload root
    pub path: String,
    pub bytes: Vec<u8>,
}

impl UploadFile {
    pub fn new(path: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            path: path.into(),
            bytes: bytes.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PublishRequest<'a> {
    #[serde(rename = "unique_name")]
    pub unique_name: &'a str,
    /// Bytes serialize as JSON numeric arrays
    pub files: BTreeMap<&'a str, &'a [u8]>,
    pub request_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PublishResponse {
    #[serde(default)]
    pub concept: String,
    pub version: VersionNumber,
    #[serde(default)]
    pub unique_name: String,
    #[serde(default)]
    pub ok: bool,
}

/// Version identifiers arrive as either strings or numbers
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum VersionNumber {
    Number(u64),
    Text(String),
}

impl std::fmt::Display for VersionNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl Default for VersionNumber {
    fn default() -> Self {
        Self::Text(String::new())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegistryConcept {
    pub concept: String,
    pub unique_name: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub author_username: String,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub updated_at: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegistryAllResponse {
    #[serde(default)]
    pub results: Vec<RegistryConcept>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConceptVersion {
    #[serde(default)]
    pub version: VersionNumber,
    #[serde(default)]
    pub semver: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub published_at: String,
}

impl Serialize for VersionNumber {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Number(n) => serializer.serialize_u64(*n),
            Self::Text(s) => serializer.serialize_str(s),
        }
    }
}

/// A concept as presented to users
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConceptItem {
    pub concept: String,
    pub unique_name: String,
    pub owner: String,
    pub author_username: String,
    pub created_at: String,
    pub updated_at: String,
    /// Not included by the listing endpoint; fetch with `get_versions`
    pub versions: Vec<ConceptVersion>,
}

impl From<RegistryConcept> for ConceptItem {
    fn from(c: RegistryConcept) -> Self {
        Self {
            concept: c.concept,
            unique_name: c.unique_name,
            owner: c.author,
            author_username: c.author_username,
            created_at: c.created_at,
            updated_at: c.updated_at,
            versions: Vec::new(),
        }
    }
}

/// Map of relative path to file content
pub type FileMap = BTreeMap<String, String>;

#[derive(Debug, Clone, Deserialize)]
pub struct FilesResponse {
    #[serde(default)]
    pub files: FileMap,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct ConceptIdRow {
    #[serde(default)]
    pub concept: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct UniqueNameRow {
    #[serde(default)]
    pub unique_name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct OwnerRow {
    #[serde(default)]
    pub owner: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct LatestVersionRow {
    #[serde(default)]
    pub version: Option<VersionNumber>,
}

/// `{ "n": ... }` count payload
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CountResponse {
    #[serde(default)]
    pub n: u64,
}

// README

/// Options for README generation
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadmeOptions {
    pub overwrite: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub files: Option<FileMap>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actions: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Readme {
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub content: Option<String>,
}

// Profile

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub avatar_url: String,
    #[serde(default)]
    pub bio: String,
}

/// Partial profile update; unset fields are left untouched server-side
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
}

impl ProfileUpdate {
    pub fn is_empty(&self) -> bool {
        self.username.is_none()
            && self.display_name.is_none()
            && self.avatar_url.is_none()
            && self.bio.is_none()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SetProfileResponse {
    #[serde(default)]
    pub ok: bool,
}

// Liking

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LikeResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ok: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl LikeResponse {
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            ok: None,
            error: Some(message.into()),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct IsLikedResponse {
    #[serde(default)]
    pub liked: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct LikedItemsResponse {
    #[serde(default)]
    pub items: Vec<String>,
}
