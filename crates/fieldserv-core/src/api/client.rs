//! API client that runs every remote call through the result pipeline.
//!
//! A call is decorated with the current credential, sent, given one chance at
//! renewal-and-replay if the server rejects the credential, and finally turned
//! into a [`RemoteOutcome`]. Callers never see transport errors directly.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use anyhow::{Context as _, Result};
use serde::de::DeserializeOwned;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio::task::AbortHandle;
use tracing::{debug, info, warn};

use super::error::{is_auth_failure, ErrorCategory, RawFailure};
use super::outcome::RemoteOutcome;
use super::request::{ApiRequest, RawResponse};
use super::transport::{ReqwestTransport, Transport};
use crate::auth::renewal::{UnauthorizedHandler, DEFAULT_RENEWAL_PATH};
use crate::auth::{CredentialStore, RequestDecorator};
use crate::config::Config;

/// Knobs for the pipeline itself, independent of the transport.
#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub renewal_path: String,
    /// Scheme written before the token in `Authorization`, e.g. `Bearer`.
    pub authorization_scheme: Option<String>,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            renewal_path: DEFAULT_RENEWAL_PATH.to_string(),
            authorization_scheme: None,
        }
    }
}

/// Client for the field-service REST API.
/// Clone is cheap - all state is shared behind Arc.
pub struct ApiClient<T> {
    transport: Arc<T>,
    store: CredentialStore,
    decorator: RequestDecorator,
    handler: UnauthorizedHandler<T>,
    runtime: Handle,
}

impl<T> Clone for ApiClient<T> {
    fn clone(&self) -> Self {
        Self {
            transport: Arc::clone(&self.transport),
            store: self.store.clone(),
            decorator: self.decorator.clone(),
            handler: self.handler.clone(),
            runtime: self.runtime.clone(),
        }
    }
}

impl ApiClient<ReqwestTransport> {
    /// Build a client talking HTTP to the configured server.
    /// Must be called from within a tokio runtime.
    pub fn from_config(config: &Config, store: CredentialStore) -> Result<Self> {
        let runtime = Handle::try_current().context("API client needs a tokio runtime")?;
        let transport = ReqwestTransport::new(
            config.base_url(),
            Duration::from_secs(config.request_timeout_secs()),
        )
        .context("Failed to build HTTP client")?;
        Ok(Self::new(transport, store, config.client_settings(), runtime))
    }
}

impl<T: Transport> ApiClient<T> {
    pub fn new(transport: T, store: CredentialStore, settings: ClientSettings, runtime: Handle) -> Self {
        let transport = Arc::new(transport);
        let decorator = RequestDecorator::new(settings.authorization_scheme);
        let handler = UnauthorizedHandler::new(
            Arc::clone(&transport),
            store.clone(),
            decorator.clone(),
            settings.renewal_path,
        );
        Self {
            transport,
            store,
            decorator,
            handler,
            runtime,
        }
    }

    pub fn store(&self) -> &CredentialStore {
        &self.store
    }

    // ===== Call styles =====

    /// Run one call to completion.
    pub async fn execute<R: DeserializeOwned>(&self, request: ApiRequest) -> RemoteOutcome<R> {
        let outcome = RemoteOutcome::from_transport(self.exchange(request).await);
        if outcome.is_auth_expired() && self.store.get().is_logged_in {
            info!("Session expired, signing out");
            if let Err(e) = self.store.write_blocking(|store| store.clear()).await {
                warn!(error = %e, "Failed to erase stored credential");
            }
        }
        outcome
    }

    /// Run one call on a background task.
    ///
    /// The returned handle resolves to the outcome, or to `None` if the call
    /// was cancelled. Dropping the handle cancels the call.
    pub fn spawn<R>(&self, request: ApiRequest) -> PendingCall<R>
    where
        R: DeserializeOwned + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let client = self.clone();
        let task = self.runtime.spawn(async move {
            let outcome = client.execute(request).await;
            // A closed receiver means the caller stopped waiting.
            let _ = tx.send(outcome);
        });
        PendingCall {
            rx,
            abort: AbortOnDrop(task.abort_handle()),
        }
    }

    /// Run one call on a background task and hand the outcome to `on_outcome`.
    ///
    /// The callback runs at most once; never if the subscription is cancelled
    /// first.
    pub fn subscribe<R, F>(&self, request: ApiRequest, on_outcome: F) -> Subscription
    where
        R: DeserializeOwned + Send + 'static,
        F: FnOnce(RemoteOutcome<R>) + Send + 'static,
    {
        let client = self.clone();
        let task = self.runtime.spawn(async move {
            on_outcome(client.execute(request).await);
        });
        Subscription {
            abort: task.abort_handle(),
        }
    }

    /// Run one call and block the current thread until it finishes.
    ///
    /// The call itself still runs on the runtime. Must not be used from
    /// inside an async context.
    pub fn execute_blocking<R>(&self, request: ApiRequest) -> RemoteOutcome<R>
    where
        R: DeserializeOwned + Send + 'static,
    {
        let PendingCall { rx, abort } = self.spawn(request);
        let outcome = rx.blocking_recv();
        drop(abort);
        outcome.unwrap_or_else(|_| {
            RemoteOutcome::from_category(ErrorCategory::Unknown("call abandoned".to_string()))
        })
    }

    // ===== Pipeline =====

    async fn exchange(&self, request: ApiRequest) -> Result<RawResponse, RawFailure> {
        let request = self
            .decorator
            .decorate(&self.store, request)
            .map_err(|e| RawFailure::Other(format!("Invalid authorization header: {}", e)))?;

        let response = self.transport.send(&request).await?;
        if !is_auth_failure(response.status) {
            return Ok(response);
        }

        match self.handler.authenticate(response.status, &request).await {
            Some(replay) => {
                debug!(method = %replay.method, path = %replay.path, "Replaying request with renewed credential");
                Ok(self.transport.send(&replay).await?)
            }
            None => Ok(response),
        }
    }
}

/// A call running in the background. Resolves to `None` if cancelled.
pub struct PendingCall<R> {
    rx: oneshot::Receiver<RemoteOutcome<R>>,
    abort: AbortOnDrop,
}

impl<R> PendingCall<R> {
    /// Abandon the call. No outcome will be delivered.
    pub fn cancel(self) {
        self.abort.0.abort();
    }
}

impl<R> Future for PendingCall<R> {
    type Output = Option<RemoteOutcome<R>>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx).poll(cx).map(|received| received.ok())
    }
}

struct AbortOnDrop(AbortHandle);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Handle to a callback-style call.
#[derive(Debug)]
pub struct Subscription {
    abort: AbortHandle,
}

impl Subscription {
    pub fn cancel(&self) {
        self.abort.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.abort.is_finished()
    }
}
