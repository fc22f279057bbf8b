//! Core library for fieldserv.
//!
//! Networking for a field-service client: an API client whose every call
//! ends in a [`RemoteOutcome`], a process-wide [`CredentialStore`], token
//! renewal, and typed services for auth and records.

pub mod api;
pub mod auth;
pub mod config;
pub mod models;
pub mod services;

pub use api::{ApiClient, ErrorCategory, RemoteOutcome};
pub use auth::{Credential, CredentialStore};
pub use config::Config;
