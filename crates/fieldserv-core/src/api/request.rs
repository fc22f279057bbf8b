use reqwest::header::HeaderMap;
use reqwest::{Method, StatusCode};
use serde::Serialize;

/// Snapshot of one outgoing request.
///
/// Kept by value so it can be decorated and, after a credential renewal,
/// replayed exactly once.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub body: Option<serde_json::Value>,
    pub headers: HeaderMap,
    replayed: bool,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
            headers: HeaderMap::new(),
            replayed: false,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    /// Attach a JSON body.
    pub fn json<B: Serialize + ?Sized>(mut self, body: &B) -> Result<Self, serde_json::Error> {
        self.body = Some(serde_json::to_value(body)?);
        Ok(self)
    }

    /// True once this request has been reissued after a renewal.
    pub fn is_replay(&self) -> bool {
        self.replayed
    }

    /// Consume the request and return the copy that will be reissued.
    pub(crate) fn into_replay(mut self) -> Self {
        self.replayed = true;
        self
    }
}

/// What a transport hands back when a response was received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: StatusCode,
    pub body: Vec<u8>,
}

impl RawResponse {
    pub fn new(status: StatusCode, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// True if the body holds nothing but whitespace.
    pub fn is_body_empty(&self) -> bool {
        self.body.iter().all(u8::is_ascii_whitespace)
    }
}
