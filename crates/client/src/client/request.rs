//! Replayable request description

use crate::error::ClientError;
use reqwest::header::{self, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, multipart};
use serde::Serialize;

/// Request payload, kept in a form that can be sent more than once
#[derive(Debug, Clone, Default)]
pub enum RequestBody {
    #[default]
    Empty,
    /// Serialized JSON document
    Json(Vec<u8>),
    /// Multipart form; sent without the JSON content type
    Multipart(Vec<MultipartField>),
}

/// One part of a multipart body
#[derive(Debug, Clone)]
pub struct MultipartField {
    pub name: String,
    pub file_name: Option<String>,
    pub bytes: Vec<u8>,
}

impl MultipartField {
    pub fn text(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            file_name: None,
            bytes: value.into().into_bytes(),
        }
    }

    pub fn file(name: impl Into<String>, file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            file_name: Some(file_name.into()),
            bytes,
        }
    }
}

pub(super) fn build_form(fields: &[MultipartField]) -> multipart::Form {
    fields.iter().fold(multipart::Form::new(), |form, field| {
        let part = multipart::Part::bytes(field.bytes.clone());
        let part = match &field.file_name {
            Some(file_name) => part.file_name(file_name.clone()),
            None => part,
        };
        form.part(field.name.clone(), part)
    })
}

/// An API call that can be replayed after a token refresh
#[derive(Debug, Clone)]
pub struct ApiRequest {
    method: Method,
    path: String,
    headers: HeaderMap,
    body: RequestBody,
    retried: bool,
}

impl ApiRequest {
    /// Request for `path`, relative to the API base URL
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            headers: HeaderMap::new(),
            body: RequestBody::Empty,
            retried: false,
        }
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    /// Attach a JSON body
    pub fn json<B: Serialize + ?Sized>(mut self, body: &B) -> Result<Self, ClientError> {
        self.body = RequestBody::Json(serde_json::to_vec(body)?);
        Ok(self)
    }

    /// Attach a multipart body
    pub fn multipart(mut self, fields: Vec<MultipartField>) -> Self {
        self.body = RequestBody::Multipart(fields);
        self
    }

    /// Set a header explicitly. An explicit `Authorization` header is never overwritten.
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Authenticate this request with a specific token instead of the stored one
    pub fn bearer(mut self, token: &str) -> Self {
        self.set_bearer(token);
        self
    }

    pub(super) fn set_bearer(&mut self, token: &str) {
        match HeaderValue::from_str(&format!("Bearer {token}")) {
            Ok(mut value) => {
                value.set_sensitive(true);
                self.headers.insert(header::AUTHORIZATION, value);
            }
            Err(_) => {
                tracing::warn!("Access token contains characters not allowed in a header");
            }
        }
    }

    pub(super) fn mark_retried(&mut self) {
        self.retried = true;
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> &RequestBody {
        &self.body
    }

    pub fn is_multipart(&self) -> bool {
        matches!(self.body, RequestBody::Multipart(_))
    }

    /// True once the request has been replayed after a refresh
    pub fn is_retried(&self) -> bool {
        self.retried
    }
}
