use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::error::{classify, ErrorCategory, RawFailure};
use super::request::RawResponse;

/// Uniform result of every remote operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum RemoteOutcome<T> {
    Success { value: T },
    Failure { category: ErrorCategory, message: String },
}

impl<T> RemoteOutcome<T> {
    pub fn success(value: T) -> Self {
        RemoteOutcome::Success { value }
    }

    /// Classify a raw failure and wrap it.
    pub fn failure(raw: &RawFailure) -> Self {
        Self::from_category(classify(raw))
    }

    pub fn from_category(category: ErrorCategory) -> Self {
        let message = category.user_message();
        RemoteOutcome::Failure { category, message }
    }

    /// Turn the result of one exchange into an outcome.
    ///
    /// This is the only place responses are classified; every call style goes
    /// through it.
    pub fn from_transport<E>(result: Result<RawResponse, E>) -> Self
    where
        T: DeserializeOwned,
        E: Into<RawFailure>,
    {
        match decode(result) {
            Ok(value) => RemoteOutcome::success(value),
            Err(raw) => {
                if let Some(body) = raw.truncated_body() {
                    warn!(?raw, body = %body, "Request rejected");
                } else {
                    warn!(?raw, "Request failed");
                }
                RemoteOutcome::failure(&raw)
            }
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, RemoteOutcome::Success { .. })
    }

    pub fn category(&self) -> Option<&ErrorCategory> {
        match self {
            RemoteOutcome::Success { .. } => None,
            RemoteOutcome::Failure { category, .. } => Some(category),
        }
    }

    pub fn is_auth_expired(&self) -> bool {
        matches!(self.category(), Some(ErrorCategory::AuthExpired))
    }

    pub fn ok(self) -> Option<T> {
        match self {
            RemoteOutcome::Success { value } => Some(value),
            RemoteOutcome::Failure { .. } => None,
        }
    }

    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> RemoteOutcome<U> {
        match self {
            RemoteOutcome::Success { value } => RemoteOutcome::Success { value: f(value) },
            RemoteOutcome::Failure { category, message } => {
                RemoteOutcome::Failure { category, message }
            }
        }
    }

    pub fn into_result(self) -> Result<T, ErrorCategory> {
        match self {
            RemoteOutcome::Success { value } => Ok(value),
            RemoteOutcome::Failure { category, .. } => Err(category),
        }
    }
}

fn decode<T, E>(result: Result<RawResponse, E>) -> Result<T, RawFailure>
where
    T: DeserializeOwned,
    E: Into<RawFailure>,
{
    let response = result.map_err(Into::into)?;
    if !response.is_success() {
        return Err(RawFailure::Status {
            status: response.status,
            body: response.body,
        });
    }
    if response.is_body_empty() {
        // Types that accept null (unit, Option) were not expecting a body.
        return serde_json::from_value(serde_json::Value::Null).map_err(|_| RawFailure::EmptyBody);
    }
    match serde_json::from_slice(&response.body) {
        Ok(value) => Ok(value),
        Err(e) => {
            // A well-formed body the caller did not ask for is still a success.
            let well_formed = serde_json::from_slice::<serde_json::Value>(&response.body).is_ok();
            match serde_json::from_value(serde_json::Value::Null) {
                Ok(value) if well_formed => Ok(value),
                _ => Err(RawFailure::UndecodableBody(e.to_string())),
            }
        }
    }
}
