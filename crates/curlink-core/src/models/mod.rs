//! Data models for cu.rl entities.
//!
//! This module contains the structures exchanged with the cu.rl API:
//!
//! - `User`, `UserType`: identity snapshot embedded in every session
//! - `ShortUrl`, `UrlAnalytics`, `Redirect`: shortened links and their stats
//! - `Credentials`, `Registration`, `PasswordResetConfirm`: account form payloads

pub mod account;
pub mod url;
pub mod user;

pub use account::{Credentials, PasswordResetConfirm, Registration};
pub use url::{NewShortUrl, Redirect, ShortUrl, UrlAnalytics};
pub use user::{User, UserType};
