//! Owner of the "current user".
//!
//! `AuthCoordinator` is the only writer of the user state. It bootstraps a
//! guest on startup, swaps identities on login and logout, and logs out on
//! its own when the `ApiClient` reports that a session could not be
//! refreshed.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use tokio::sync::{broadcast, watch};
use tracing::{debug, error, info, warn};

use crate::api::{ApiClient, ApiError, AuthFailed};
use crate::models::{Credentials, Registration, User};

/// Capacity of the navigation channel
const NAVIGATION_CAPACITY: usize = 8;

#[derive(Debug, Clone, PartialEq)]
pub enum AuthState {
    Initializing,
    /// Startup finished. `None` only if no guest could be obtained.
    Ready(Option<User>),
}

impl AuthState {
    pub fn user(&self) -> Option<&User> {
        match self {
            AuthState::Ready(user) => user.as_ref(),
            AuthState::Initializing => None,
        }
    }
}

/// Where the UI should go after an identity change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Navigation {
    Landing,
}

struct CoordinatorInner {
    api: ApiClient,
    state: watch::Sender<AuthState>,
    navigation: broadcast::Sender<Navigation>,
    initialized: AtomicBool,
    logging_out: AtomicBool,
}

/// Resets the logout latch when the logout future finishes or is dropped.
struct LogoutLatch<'a>(&'a AtomicBool);

impl Drop for LogoutLatch<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

#[derive(Clone)]
pub struct AuthCoordinator {
    inner: Arc<CoordinatorInner>,
}

impl AuthCoordinator {
    /// Create a coordinator around `api` and start listening for its
    /// auth-failure signal. Must be called within a tokio runtime.
    pub fn new(api: ApiClient) -> Self {
        let (state, _) = watch::channel(AuthState::Initializing);
        let (navigation, _) = broadcast::channel(NAVIGATION_CAPACITY);
        let failures = api.subscribe_auth_failures();

        let coordinator = Self {
            inner: Arc::new(CoordinatorInner {
                api,
                state,
                navigation,
                initialized: AtomicBool::new(false),
                logging_out: AtomicBool::new(false),
            }),
        };

        tokio::spawn(Self::listen_for_auth_failures(
            Arc::downgrade(&coordinator.inner),
            failures,
        ));
        coordinator
    }

    async fn listen_for_auth_failures(inner: Weak<CoordinatorInner>, mut failures: broadcast::Receiver<AuthFailed>) {
        loop {
            match failures.recv().await {
                Ok(AuthFailed) | Err(broadcast::error::RecvError::Lagged(_)) => {
                    let Some(strong) = inner.upgrade() else {
                        break;
                    };
                    let coordinator = AuthCoordinator { inner: strong };
                    if coordinator.handle_auth_failure().await {
                        Self::discard_pending(&mut failures);
                    }
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
        debug!("Auth failure listener stopped");
    }

    /// Log out unless a logout is already running. Returns whether this call
    /// performed the logout.
    async fn handle_auth_failure(&self) -> bool {
        if self.is_logging_out() {
            debug!("Auth failure during logout, ignoring");
            return false;
        }
        warn!("Session could not be refreshed, logging out");
        self.logout().await;
        true
    }

    /// Drop signals that queued up while the listener was busy logging out.
    fn discard_pending(failures: &mut broadcast::Receiver<AuthFailed>) {
        let mut discarded = 0usize;
        loop {
            match failures.try_recv() {
                Ok(AuthFailed) | Err(broadcast::error::TryRecvError::Lagged(_)) => discarded += 1,
                Err(_) => break,
            }
        }
        if discarded > 0 {
            debug!(discarded, "Ignored auth failures raised during logout");
        }
    }

    pub fn api(&self) -> &ApiClient {
        &self.inner.api
    }

    pub fn state(&self) -> AuthState {
        self.inner.state.borrow().clone()
    }

    pub fn current_user(&self) -> Option<User> {
        self.inner.state.borrow().user().cloned()
    }

    /// Watch the auth state; read-only for everyone but the coordinator.
    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.inner.state.subscribe()
    }

    pub fn navigation(&self) -> broadcast::Receiver<Navigation> {
        self.inner.navigation.subscribe()
    }

    pub fn is_logging_out(&self) -> bool {
        self.inner.logging_out.load(Ordering::SeqCst)
    }

    fn set_user(&self, user: Option<User>) {
        self.inner.state.send_replace(AuthState::Ready(user));
    }

    /// Load the persisted session, or bootstrap a guest if there is none.
    /// Runs once per coordinator; later calls return immediately.
    pub async fn initialize(&self) {
        if self.inner.initialized.swap(true, Ordering::SeqCst) {
            debug!("Already initialized");
            return;
        }

        match self.inner.api.stored_session() {
            Some(session) => {
                info!(username = %session.user.username, "Restored stored session");
                self.set_user(Some(session.user));
            }
            None => self.bootstrap_guest().await,
        }
    }

    /// Obtain and persist a guest session. On failure the user is left
    /// empty; the state still becomes `Ready`.
    async fn bootstrap_guest(&self) {
        match self.inner.api.guest_session().await {
            Ok(session) => {
                if let Err(e) = self.inner.api.store_session(&session) {
                    warn!(error = %e, "Failed to persist guest session");
                }
                self.set_user(Some(session.user));
            }
            Err(e) => {
                error!(error = %e, "Failed to initialize guest user");
                self.set_user(None);
            }
        }
    }

    /// Log in and make the returned user current. On failure the current
    /// user is left untouched and the server's message is returned.
    pub async fn login(&self, credentials: &Credentials) -> Result<User, ApiError> {
        let session = self.inner.api.login(credentials).await?;
        self.inner.api.store_session(&session)?;
        self.set_user(Some(session.user.clone()));
        Ok(session.user)
    }

    /// Log out, replace the user with a fresh guest and navigate to the
    /// landing page.
    ///
    /// Calls made while a logout is running return immediately without
    /// waiting for it. Remote failures are logged; local state is always
    /// cleared.
    pub async fn logout(&self) {
        if self
            .inner
            .logging_out
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("Logout already in progress");
            return;
        }
        let _latch = LogoutLatch(&self.inner.logging_out);

        if let Some(session) = self.inner.api.stored_session() {
            match self.inner.api.logout_remote(&session.refresh).await {
                Ok(()) => info!(username = %session.user.username, "Logged out"),
                Err(ApiError::SessionExpired) => debug!("Session already expired at logout"),
                Err(e) => warn!(error = %e, "Logout request failed, clearing local session anyway"),
            }
        }

        self.inner.api.clear_session();
        self.set_user(None);
        self.bootstrap_guest().await;

        // Err only means nobody is listening
        let _ = self.inner.navigation.send(Navigation::Landing);
    }

    /// Create an account. The caller logs in separately.
    pub async fn register(&self, registration: &Registration) -> Result<(), ApiError> {
        self.inner.api.register(registration).await
    }

    /// Delete the account on the server, then log out.
    pub async fn delete_account(&self) -> Result<(), ApiError> {
        self.inner.api.delete_account().await?;
        info!("Account deleted");
        self.logout().await;
        Ok(())
    }
}
