//! Data models for the field-service API.
//!
//! This module contains the request and response types exchanged with the
//! backend:
//! - `auth`: login/registration payloads and issued tokens
//! - `records`: companies, members, clients, businesses and tasks

pub mod auth;
pub mod records;

pub use auth::{AuthTokens, LoginRequest, RegisterRequest};
pub use records::{Business, Client, Company, Member, Resource, Task, TaskStatus};
