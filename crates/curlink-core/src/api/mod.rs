//! REST API client module for the cu.rl service.
//!
//! This module provides the `ApiClient` for communicating with the cu.rl
//! API: account endpoints (guest bootstrap, login, registration, password
//! reset) and link endpoints (shorten, list, analytics, redirect lookup).
//!
//! The API uses JWT bearer tokens. Expired access tokens are refreshed
//! transparently, at most one refresh at a time.

pub mod client;
pub mod endpoints;
pub mod error;

pub use client::{ApiClient, ApiRequest, AuthFailed, DEFAULT_REQUEST_TIMEOUT_SECS};
pub use error::{first_field_error, ApiError};
