//! In-process transport for tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use reqwest::header::AUTHORIZATION;
use reqwest::StatusCode;

use super::request::{ApiRequest, RawResponse};
use super::transport::{Transport, TransportError};

type Responder = dyn Fn(&ApiRequest) -> Result<RawResponse, TransportError> + Send + Sync;

/// Answers every request with a scripted closure and records what was sent.
#[derive(Clone)]
pub struct FakeTransport {
    responder: Arc<Responder>,
    sent: Arc<Mutex<Vec<ApiRequest>>>,
    delays: Arc<HashMap<String, Duration>>,
}

impl FakeTransport {
    pub fn new(
        responder: impl Fn(&ApiRequest) -> Result<RawResponse, TransportError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            responder: Arc::new(responder),
            sent: Arc::new(Mutex::new(Vec::new())),
            delays: Arc::new(HashMap::new()),
        }
    }

    /// Hold responses for `path` back by `delay`.
    pub fn with_delay(mut self, path: &str, delay: Duration) -> Self {
        let mut delays = (*self.delays).clone();
        delays.insert(path.to_string(), delay);
        self.delays = Arc::new(delays);
        self
    }

    pub fn json(code: u16, body: &str) -> Result<RawResponse, TransportError> {
        Ok(RawResponse::new(
            StatusCode::from_u16(code).expect("valid status"),
            body,
        ))
    }

    /// Authorization header a request carried, or "" if none.
    pub fn authorization(request: &ApiRequest) -> String {
        request
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string()
    }

    pub fn sent(&self) -> Vec<ApiRequest> {
        self.sent.lock().expect("fake transport lock").clone()
    }

    pub fn calls_to(&self, path: &str) -> usize {
        self.sent().iter().filter(|r| r.path == path).count()
    }
}

impl Transport for FakeTransport {
    async fn send(&self, request: &ApiRequest) -> Result<RawResponse, TransportError> {
        self.sent
            .lock()
            .expect("fake transport lock")
            .push(request.clone());
        // Give other in-flight calls a chance to interleave.
        tokio::task::yield_now().await;
        if let Some(delay) = self.delays.get(&request.path) {
            tokio::time::sleep(*delay).await;
        }
        (self.responder)(request)
    }
}
