//! Typed endpoint layers on top of `ApiClient`.

pub mod auth;
pub mod records;

pub use auth::AuthService;
pub use records::RecordService;
