//! Authentication module for managing sessions and the current user.
//!
//! This module provides:
//! - `Session`: bearer access/refresh tokens plus the user they belong to
//! - `SessionStore`: durable session storage (`FileSessionStore`,
//!   `KeyringSessionStore`, `MemorySessionStore`)
//! - `AuthCoordinator`: the current-user state machine

pub mod coordinator;
pub mod credentials;
pub mod session;

pub use coordinator::{AuthCoordinator, AuthState, Navigation};
pub use credentials::KeyringSessionStore;
pub use session::{FileSessionStore, MemorySessionStore, Session, SessionStore, StoreError};
