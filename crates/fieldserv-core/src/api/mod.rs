//! REST API client module for the field-service backend.
//!
//! Every remote call goes through `ApiClient`, which decorates the request
//! with the stored credential, renews it once on a 401/403, and returns a
//! `RemoteOutcome` instead of raw transport errors.
//!
//! The `Authorization` header carries the bare access token (no scheme
//! prefix) unless configured otherwise.

pub mod client;
pub mod error;
pub mod outcome;
pub mod request;
pub mod transport;

#[cfg(test)]
pub(crate) mod test_support;

pub use client::{ApiClient, ClientSettings, PendingCall, Subscription};
pub use error::{classify, ErrorCategory, RawFailure, ServerErrorBody};
pub use outcome::RemoteOutcome;
pub use request::{ApiRequest, RawResponse};
pub use transport::{ReqwestTransport, Transport, TransportError};
