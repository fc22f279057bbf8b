//! The seam between the pipeline and the network.

use std::future::Future;
use std::time::Duration;

use reqwest::Client;
use thiserror::Error;
use tracing::debug;

use super::request::{ApiRequest, RawResponse};

/// Default HTTP request timeout in seconds.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Failure to obtain a response at all.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Request timed out")]
    Timeout,

    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Transport error: {0}")]
    Other(String),
}

impl TransportError {
    /// True when the server was never reached or the exchange broke off.
    pub fn is_connectivity(&self) -> bool {
        matches!(
            self,
            TransportError::Timeout | TransportError::Connect(_) | TransportError::Io(_)
        )
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TransportError::Timeout
        } else if err.is_connect() {
            TransportError::Connect(err.to_string())
        } else if err.is_request() || err.is_body() || err.is_decode() {
            TransportError::Io(err.to_string())
        } else {
            TransportError::Other(err.to_string())
        }
    }
}

/// Issues one HTTP request and returns status + body, or a transport error.
pub trait Transport: Send + Sync + 'static {
    fn send(
        &self,
        request: &ApiRequest,
    ) -> impl Future<Output = Result<RawResponse, TransportError>> + Send;
}

/// Production transport on top of reqwest.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct ReqwestTransport {
    client: Client,
    base_url: String,
}

impl ReqwestTransport {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

impl Transport for ReqwestTransport {
    async fn send(&self, request: &ApiRequest) -> Result<RawResponse, TransportError> {
        let url = self.url(&request.path);
        debug!(method = %request.method, url = %url, replay = request.is_replay(), "Sending request");

        let mut builder = self
            .client
            .request(request.method.clone(), &url)
            .headers(request.headers.clone());
        if let Some(ref body) = request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status();
        let body = response.bytes().await?.to_vec();
        debug!(url = %url, status = status.as_u16(), bytes = body.len(), "Received response");

        Ok(RawResponse { status, body })
    }
}
