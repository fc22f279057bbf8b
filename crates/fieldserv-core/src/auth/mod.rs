//! Authentication module for managing credentials and session renewal.
//!
//! This module provides:
//! - `CredentialStore`: the single owner of the access/refresh tokens
//! - `CredentialBackend`: durable storage (memory, OS keychain, sealed file)
//! - `RequestDecorator`: writes the access token into outgoing requests
//! - `UnauthorizedHandler`: single-flight token renewal on 401/403

pub mod credentials;
pub mod decorator;
pub mod persist;
pub mod renewal;
pub mod vault;

pub use credentials::{Credential, CredentialStore};
pub use decorator::RequestDecorator;
pub use persist::{CredentialBackend, FileBackend, KeyringBackend, MemoryBackend};
pub use renewal::UnauthorizedHandler;
