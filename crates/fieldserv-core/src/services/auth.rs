use anyhow::Result;
use tracing::{info, warn};

use crate::api::{ApiClient, ApiRequest, RawFailure, RemoteOutcome, Transport};
use crate::models::{AuthTokens, LoginRequest, RegisterRequest};

const LOGIN_PATH: &str = "/auth/login";
const REGISTER_PATH: &str = "/auth/register";

/// Sign-in, registration and sign-out.
pub struct AuthService<T> {
    client: ApiClient<T>,
}

impl<T: Transport> AuthService<T> {
    pub fn new(client: ApiClient<T>) -> Self {
        Self { client }
    }

    /// Authenticate and store the issued tokens.
    pub async fn login(&self, phone: &str, password: &str) -> RemoteOutcome<AuthTokens> {
        let body = LoginRequest {
            phone: phone.to_string(),
            password: password.to_string(),
        };
        self.issue(ApiRequest::post(LOGIN_PATH).json(&body)).await
    }

    /// Create an account and store the issued tokens.
    pub async fn register(&self, request: &RegisterRequest) -> RemoteOutcome<AuthTokens> {
        self.issue(ApiRequest::post(REGISTER_PATH).json(request)).await
    }

    pub fn logout(&self) -> Result<()> {
        info!("Signing out");
        self.client.store().clear()
    }

    pub fn is_logged_in(&self) -> bool {
        self.client.store().get().is_logged_in
    }

    async fn issue(&self, request: Result<ApiRequest, serde_json::Error>) -> RemoteOutcome<AuthTokens> {
        let request = match request {
            Ok(request) => request,
            Err(e) => return RemoteOutcome::failure(&RawFailure::Other(e.to_string())),
        };
        let path = request.path.clone();

        let outcome: RemoteOutcome<AuthTokens> = self.client.execute(request).await;
        if let RemoteOutcome::Success { ref value } = outcome {
            let tokens = value.clone();
            let saved = self
                .client
                .store()
                .write_blocking(move |store| store.save(&tokens.access_token, &tokens.refresh_token))
                .await;
            if let Err(e) = saved {
                warn!(error = %e, "Failed to persist issued credential");
            }
            info!(path = %path, "Signed in");
        }
        outcome
    }
}
