use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::transport::TransportError;

/// User-facing message for failures where no response was received
pub const CONNECTION_PROBLEM: &str = "connection problem";

/// User-facing message for rejected or unrenewable credentials
pub const SESSION_EXPIRED: &str = "session expired";

/// User-facing message for a success status without a usable body
pub const EMPTY_RESPONSE: &str = "empty response";

/// Maximum length for error response bodies in log messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

/// Closed set of failure classifications shown to callers.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(tag = "kind", content = "detail", rename_all = "camelCase")]
pub enum ErrorCategory {
    #[error("Network unavailable")]
    NetworkUnavailable,

    #[error("Session expired")]
    AuthExpired,

    #[error("Rejected by server ({code}): {message}")]
    ServerRejected { code: u16, message: String },

    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl ErrorCategory {
    /// Message suitable for showing to the user as-is.
    pub fn user_message(&self) -> String {
        match self {
            ErrorCategory::NetworkUnavailable => CONNECTION_PROBLEM.to_string(),
            ErrorCategory::AuthExpired => SESSION_EXPIRED.to_string(),
            ErrorCategory::ServerRejected { message, .. } => message.clone(),
            ErrorCategory::Unknown(message) => message.clone(),
        }
    }
}

/// Structured error body returned by the API on business-rule rejections.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerErrorBody {
    pub error_code: String,
    pub message: String,
    #[serde(default)]
    pub cause: String,
}

/// Everything that can go wrong between issuing a request and holding a
/// decoded payload, before it has been classified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawFailure {
    /// A response arrived with a non-2xx status.
    Status { status: StatusCode, body: Vec<u8> },
    /// A 2xx response had no body where one was expected.
    EmptyBody,
    /// A 2xx response body could not be decoded into the expected type.
    UndecodableBody(String),
    /// No response was received.
    Transport(TransportError),
    /// Local failure before or after the exchange (encoding, headers).
    Other(String),
}

impl RawFailure {
    /// Body text for logging, cut down so huge error pages don't flood logs.
    pub fn truncated_body(&self) -> Option<String> {
        match self {
            RawFailure::Status { body, .. } => Some(truncate_body(&String::from_utf8_lossy(body))),
            _ => None,
        }
    }
}

impl From<TransportError> for RawFailure {
    fn from(err: TransportError) -> Self {
        RawFailure::Transport(err)
    }
}

/// Whether a status means the credential was rejected.
pub fn is_auth_failure(status: StatusCode) -> bool {
    matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN)
}

/// Map a raw failure to exactly one category.
///
/// Auth statuses are normalized before the body is looked at, so a 401 with a
/// well-formed error body is still `AuthExpired`.
pub fn classify(failure: &RawFailure) -> ErrorCategory {
    match failure {
        RawFailure::Status { status, .. } if is_auth_failure(*status) => ErrorCategory::AuthExpired,
        RawFailure::Status { status, body } => {
            let message = match serde_json::from_slice::<ServerErrorBody>(body) {
                Ok(parsed) => parsed.message,
                Err(_) => status
                    .canonical_reason()
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("Status {}", status.as_u16())),
            };
            ErrorCategory::ServerRejected {
                code: status.as_u16(),
                message,
            }
        }
        RawFailure::EmptyBody | RawFailure::UndecodableBody(_) => {
            ErrorCategory::Unknown(EMPTY_RESPONSE.to_string())
        }
        RawFailure::Transport(err) if err.is_connectivity() => ErrorCategory::NetworkUnavailable,
        RawFailure::Transport(err) => ErrorCategory::Unknown(err.to_string()),
        RawFailure::Other(message) => ErrorCategory::Unknown(message.clone()),
    }
}

/// Truncate a response body to avoid logging excessive data
fn truncate_body(body: &str) -> String {
    if body.len() <= MAX_ERROR_BODY_LENGTH {
        return body.to_string();
    }
    let mut end = MAX_ERROR_BODY_LENGTH;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(code: u16, body: &str) -> RawFailure {
        RawFailure::Status {
            status: StatusCode::from_u16(code).expect("valid status"),
            body: body.as_bytes().to_vec(),
        }
    }

    #[test]
    fn test_auth_statuses_ignore_body() {
        let structured = r#"{"errorCode":"E9","message":"nope","cause":"x"}"#;
        for code in [401, 403] {
            assert_eq!(classify(&status(code, "")), ErrorCategory::AuthExpired);
            assert_eq!(classify(&status(code, "<html>")), ErrorCategory::AuthExpired);
            assert_eq!(classify(&status(code, structured)), ErrorCategory::AuthExpired);
        }
    }

    #[test]
    fn test_structured_rejection_uses_server_message() {
        let failure = status(
            400,
            r#"{"errorCode":"E1","message":"invalid phone number","cause":"..."}"#,
        );
        let category = classify(&failure);
        assert_eq!(
            category,
            ErrorCategory::ServerRejected {
                code: 400,
                message: "invalid phone number".to_string()
            }
        );
        assert_eq!(category.user_message(), "invalid phone number");
    }

    #[test]
    fn test_structured_rejection_without_cause() {
        let failure = status(409, r#"{"errorCode":"DUP","message":"already exists"}"#);
        assert_eq!(
            classify(&failure),
            ErrorCategory::ServerRejected {
                code: 409,
                message: "already exists".to_string()
            }
        );
    }

    #[test]
    fn test_unstructured_rejection_uses_reason_phrase() {
        assert_eq!(
            classify(&status(502, "<html>bad gateway</html>")),
            ErrorCategory::ServerRejected {
                code: 502,
                message: "Bad Gateway".to_string()
            }
        );
        assert_eq!(
            classify(&status(599, "")),
            ErrorCategory::ServerRejected {
                code: 599,
                message: "Status 599".to_string()
            }
        );
    }

    #[test]
    fn test_connectivity_failures_are_network_unavailable() {
        let failures = [
            TransportError::Timeout,
            TransportError::Connect("connection refused".to_string()),
            TransportError::Io("dns error".to_string()),
        ];
        for err in failures {
            let category = classify(&RawFailure::Transport(err));
            assert_eq!(category, ErrorCategory::NetworkUnavailable);
            assert_eq!(category.user_message(), CONNECTION_PROBLEM);
        }
    }

    #[test]
    fn test_other_failures_are_unknown() {
        assert_eq!(
            classify(&RawFailure::Transport(TransportError::Other("builder".to_string()))),
            ErrorCategory::Unknown("Transport error: builder".to_string())
        );
        assert_eq!(
            classify(&RawFailure::Other("bad header".to_string())),
            ErrorCategory::Unknown("bad header".to_string())
        );
        assert_eq!(
            classify(&RawFailure::EmptyBody),
            ErrorCategory::Unknown(EMPTY_RESPONSE.to_string())
        );
        assert_eq!(
            classify(&RawFailure::UndecodableBody("expected value".to_string())),
            ErrorCategory::Unknown(EMPTY_RESPONSE.to_string())
        );
    }

    #[test]
    fn test_classify_is_idempotent() {
        let failures = [
            status(401, "x"),
            status(400, r#"{"errorCode":"E1","message":"m","cause":"c"}"#),
            RawFailure::Transport(TransportError::Timeout),
            RawFailure::Other("boom".to_string()),
        ];
        for failure in &failures {
            assert_eq!(classify(failure), classify(failure));
        }
    }

    #[test]
    fn test_truncated_body() {
        let long = "x".repeat(MAX_ERROR_BODY_LENGTH + 10);
        let failure = status(500, &long);
        let truncated = failure.truncated_body().expect("status has a body");
        assert!(truncated.contains("truncated, 510 total bytes"));
        assert_eq!(status(500, "short").truncated_body().as_deref(), Some("short"));
        assert_eq!(RawFailure::EmptyBody.truncated_body(), None);
    }
}
