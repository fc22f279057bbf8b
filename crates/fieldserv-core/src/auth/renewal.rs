//! Recovery from 401/403 responses by exchanging the refresh token.
//!
//! Renewals are single-flight: concurrent rejections queue on one async mutex,
//! and whoever gets it after a successful renewal just replays with the new
//! token. A renewal runs in its own task and completes even if the caller that
//! started it is cancelled.

use std::sync::Arc;

use reqwest::header::AUTHORIZATION;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info, warn};

use super::credentials::CredentialStore;
use super::decorator::RequestDecorator;
use crate::api::error::{is_auth_failure, RawFailure};
use crate::api::transport::Transport;
use crate::api::ApiRequest;

/// Default path of the credential renewal endpoint.
pub const DEFAULT_RENEWAL_PATH: &str = "/auth/refresh";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RenewalRequest<'a> {
    refresh_token: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RenewalResponse {
    access_token: String,
    /// Some servers rotate the refresh token on every renewal.
    #[serde(default)]
    refresh_token: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Renewal {
    Renewed,
    AlreadyRenewed,
    Failed,
}

pub struct UnauthorizedHandler<T> {
    transport: Arc<T>,
    store: CredentialStore,
    decorator: RequestDecorator,
    renewal_path: Arc<str>,
    in_flight: Arc<AsyncMutex<()>>,
}

impl<T> Clone for UnauthorizedHandler<T> {
    fn clone(&self) -> Self {
        Self {
            transport: Arc::clone(&self.transport),
            store: self.store.clone(),
            decorator: self.decorator.clone(),
            renewal_path: Arc::clone(&self.renewal_path),
            in_flight: Arc::clone(&self.in_flight),
        }
    }
}

impl<T: Transport> UnauthorizedHandler<T> {
    pub fn new(
        transport: Arc<T>,
        store: CredentialStore,
        decorator: RequestDecorator,
        renewal_path: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            store,
            decorator,
            renewal_path: Arc::from(renewal_path.into()),
            in_flight: Arc::new(AsyncMutex::new(())),
        }
    }

    /// Decide what to do with a response to `request`.
    ///
    /// Returns the request to reissue, already carrying the renewed token and
    /// tagged as a replay, or `None` when the response is final.
    pub async fn authenticate(&self, status: StatusCode, request: &ApiRequest) -> Option<ApiRequest> {
        if !is_auth_failure(status) {
            return None;
        }
        if request.is_replay() {
            debug!(path = %request.path, "Replayed request rejected again, giving up");
            return None;
        }

        let sent = request
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();

        let handler = self.clone();
        let renewal = tokio::spawn(async move { handler.renew_once(&sent).await });
        match renewal.await {
            Ok(Renewal::Renewed | Renewal::AlreadyRenewed) => {}
            Ok(Renewal::Failed) => return None,
            Err(e) => {
                warn!(error = %e, "Renewal task did not complete");
                return None;
            }
        }

        match self.decorator.decorate(&self.store, request.clone()) {
            Ok(replay) => Some(replay.into_replay()),
            Err(e) => {
                warn!(error = %e, "Renewed token is not a valid header value");
                None
            }
        }
    }

    async fn renew_once(&self, sent_header: &str) -> Renewal {
        let _permit = self.in_flight.lock().await;

        let current = self.store.get();
        if current.is_logged_in && self.decorator.header_value(&current) != sent_header {
            debug!("Credential already renewed by a concurrent request");
            return Renewal::AlreadyRenewed;
        }
        if current.refresh_token.is_empty() {
            info!("No refresh token available, ending session");
            self.end_session().await;
            return Renewal::Failed;
        }

        match self.request_renewal(&current.refresh_token).await {
            Ok(renewed) => {
                let saved = self
                    .store
                    .write_blocking(move |store| match renewed.refresh_token {
                        Some(ref refresh) if !refresh.is_empty() => {
                            store.save(&renewed.access_token, refresh)
                        }
                        _ => store.update_access_token(&renewed.access_token),
                    })
                    .await;
                if let Err(e) = saved {
                    warn!(error = %e, "Failed to persist renewed credential");
                }
                info!("Access token renewed");
                Renewal::Renewed
            }
            Err(raw) => {
                warn!(?raw, "Credential renewal failed, ending session");
                self.end_session().await;
                Renewal::Failed
            }
        }
    }

    async fn request_renewal(&self, refresh_token: &str) -> Result<RenewalResponse, RawFailure> {
        let request = ApiRequest::post(self.renewal_path.as_ref())
            .json(&RenewalRequest { refresh_token })
            .map_err(|e| RawFailure::Other(e.to_string()))?;

        let response = self.transport.send(&request).await?;
        if !response.is_success() {
            return Err(RawFailure::Status {
                status: response.status,
                body: response.body,
            });
        }

        let renewed: RenewalResponse = serde_json::from_slice(&response.body)
            .map_err(|e| RawFailure::UndecodableBody(e.to_string()))?;
        if renewed.access_token.is_empty() {
            return Err(RawFailure::EmptyBody);
        }
        Ok(renewed)
    }

    async fn end_session(&self) {
        if let Err(e) = self.store.write_blocking(|store| store.clear()).await {
            warn!(error = %e, "Failed to erase stored credential");
        }
    }
}
