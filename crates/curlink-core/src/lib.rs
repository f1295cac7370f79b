//! curlink core - client library for the cu.rl URL shortener.
//!
//! - [`api`]: HTTP client with transparent token refresh
//! - [`auth`]: sessions, session storage and the auth coordinator
//! - [`models`]: users, links and analytics
//! - [`config`]: on-disk configuration and environment overrides

pub mod api;
pub mod auth;
pub mod config;
pub mod models;

pub use api::{ApiClient, ApiError};
pub use auth::{AuthCoordinator, AuthState, Navigation, Session, SessionStore};
pub use config::Config;
