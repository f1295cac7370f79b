//! HTTP client for the cu.rl REST API.
//!
//! `ApiClient` attaches the stored bearer token to protected calls and, when
//! the server answers 401, refreshes the session and retries the call once.
//! Concurrent 401s share a single refresh; when that refresh fails every
//! waiter gets `ApiError::SessionExpired` and one `AuthFailed` signal is
//! broadcast to subscribers.

use std::sync::Arc;
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt, Shared};
use reqwest::{Client, Method, Response, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, error, info, warn};

use crate::auth::{Session, SessionStore, StoreError};

use super::ApiError;

// ============================================================================
// Constants
// ============================================================================

/// HTTP request timeout in seconds.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Endpoint exchanging a refresh token for a new access token
const TOKEN_REFRESH_PATH: &str = "/auth/token/refresh/";

/// Capacity of the auth-failure broadcast channel. Subscribers only care that
/// a failure happened, so lagging receivers lose nothing important.
const AUTH_EVENT_CAPACITY: usize = 16;

/// Broadcast when a session could not be refreshed and is gone for good.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthFailed;

/// A replayable API request: method, path below the API base and optional
/// JSON body.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    method: Method,
    path: String,
    body: Option<serde_json::Value>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    pub fn json<B: Serialize + ?Sized>(mut self, body: &B) -> Result<Self, ApiError> {
        let value = serde_json::to_value(body)
            .map_err(|e| ApiError::InvalidResponse(format!("Failed to encode request body: {}", e)))?;
        self.body = Some(value);
        Ok(self)
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

#[derive(Serialize)]
struct RefreshRequest<'a> {
    refresh: &'a str,
}

#[derive(Deserialize)]
struct RefreshResponse {
    access: String,
    #[serde(default)]
    refresh: Option<String>,
}

/// Outcome of one refresh cycle, shared by every caller waiting on it.
type PendingRefresh = Shared<BoxFuture<'static, Option<Session>>>;

struct ClientInner {
    http: Client,
    base_url: String,
    store: Arc<dyn SessionStore>,
    /// Refresh currently in flight, if any. Cleared by the refresh itself.
    refresh: Mutex<Option<PendingRefresh>>,
    auth_failed: broadcast::Sender<AuthFailed>,
}

/// API client for cu.rl.
/// Clone is cheap - clones share the connection pool, session store and
/// refresh state.
#[derive(Clone)]
pub struct ApiClient {
    inner: Arc<ClientInner>,
}

impl ApiClient {
    /// Create a client for the API rooted at `base_url` (e.g.
    /// `https://cu.rl/api/v1`) with the default request timeout.
    pub fn new(base_url: impl Into<String>, store: Arc<dyn SessionStore>) -> Result<Self, ApiError> {
        Self::with_timeout(base_url, store, Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS))
    }

    pub fn with_timeout(
        base_url: impl Into<String>,
        store: Arc<dyn SessionStore>,
        timeout: Duration,
    ) -> Result<Self, ApiError> {
        let http = Client::builder().timeout(timeout).build()?;
        let (auth_failed, _) = broadcast::channel(AUTH_EVENT_CAPACITY);
        let base_url = base_url.into().trim_end_matches('/').to_string();

        Ok(Self {
            inner: Arc::new(ClientInner {
                http,
                base_url,
                store,
                refresh: Mutex::new(None),
                auth_failed,
            }),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.inner.base_url
    }

    /// Receive an `AuthFailed` for every refresh that fails.
    pub fn subscribe_auth_failures(&self) -> broadcast::Receiver<AuthFailed> {
        self.inner.auth_failed.subscribe()
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.inner.base_url, path)
    }

    // ===== Session persistence =====

    /// The persisted session, if any. Unreadable or malformed entries are
    /// logged, discarded and reported as no session.
    pub fn stored_session(&self) -> Option<Session> {
        match self.inner.store.load() {
            Ok(session) => session,
            Err(StoreError::Malformed(e)) => {
                warn!(error = %e, "Discarding malformed stored session");
                self.clear_session();
                None
            }
            Err(e) => {
                warn!(error = %e, "Failed to read stored session");
                None
            }
        }
    }

    pub fn store_session(&self, session: &Session) -> Result<(), StoreError> {
        self.inner.store.save(session)
    }

    /// Forget the persisted session. Failures are logged, never returned.
    pub fn clear_session(&self) {
        if let Err(e) = self.inner.store.clear() {
            warn!(error = %e, "Failed to clear stored session");
        }
    }

    // ===== Requests =====

    async fn send(&self, request: &ApiRequest, access: Option<&str>) -> Result<Response, ApiError> {
        let mut builder = self
            .inner
            .http
            .request(request.method.clone(), self.url(&request.path));
        if let Some(token) = access {
            builder = builder.bearer_auth(token);
        }
        if let Some(ref body) = request.body {
            builder = builder.json(body);
        }

        debug!(method = %request.method, path = %request.path, authenticated = access.is_some(), "Sending request");
        Ok(builder.send().await?)
    }

    /// Issue a request without credentials. Never refreshes.
    pub async fn call_without_auth(&self, request: &ApiRequest) -> Result<Response, ApiError> {
        self.send(request, None).await
    }

    /// Issue a request with the stored access token.
    ///
    /// Any status other than 401 is returned as-is. On 401 the session is
    /// refreshed and the request replayed once with the new token; that
    /// second response is returned whatever its status. If the refresh fails
    /// the result is `ApiError::SessionExpired`.
    pub async fn call_with_auth(&self, request: &ApiRequest) -> Result<Response, ApiError> {
        let session = self.stored_session();
        let response = self
            .send(request, session.as_ref().map(|s| s.access.as_str()))
            .await?;

        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        debug!(path = %request.path, "Access token rejected, refreshing session");
        match self.refresh_session().await {
            Some(refreshed) => self.send(request, Some(&refreshed.access)).await,
            None => Err(ApiError::SessionExpired),
        }
    }

    // ===== Refresh =====

    /// Join the refresh in flight, or start one if none is running.
    async fn refresh_session(&self) -> Option<Session> {
        let pending = {
            let mut slot = self.inner.refresh.lock().await;
            match slot.as_ref() {
                Some(pending) => {
                    debug!("Refresh already in flight, waiting for it");
                    pending.clone()
                }
                None => {
                    let client = self.clone();
                    let pending = async move {
                        let outcome = client.run_refresh().await;
                        client.inner.refresh.lock().await.take();
                        outcome
                    }
                    .boxed()
                    .shared();
                    *slot = Some(pending.clone());
                    pending
                }
            }
        };
        pending.await
    }

    /// One refresh cycle. On failure the stored session is cleared and
    /// `AuthFailed` is broadcast exactly once. Without a stored session there
    /// is nothing to refresh and nothing to report.
    async fn run_refresh(&self) -> Option<Session> {
        let Some(stored) = self.stored_session() else {
            debug!("No stored session to refresh");
            return None;
        };

        match self.exchange_refresh_token(stored).await {
            Ok(session) => {
                if let Err(e) = self.store_session(&session) {
                    warn!(error = %e, "Failed to persist refreshed session");
                }
                info!(username = %session.user.username, "Session refreshed");
                Some(session)
            }
            Err(e) => {
                error!(error = %e, "Token refresh failed");
                self.clear_session();
                // Err only means there are no subscribers
                let _ = self.inner.auth_failed.send(AuthFailed);
                None
            }
        }
    }

    async fn exchange_refresh_token(&self, stored: Session) -> Result<Session, ApiError> {
        let response = self
            .inner
            .http
            .post(self.url(TOKEN_REFRESH_PATH))
            .json(&RefreshRequest {
                refresh: &stored.refresh,
            })
            .send()
            .await?;

        let response = Self::check_response(response).await?;
        let tokens: RefreshResponse = Self::parse_json(response).await?;
        Ok(stored.with_tokens(tokens.access, tokens.refresh))
    }

    // ===== Response helpers =====

    /// Check if response is successful, returning an error with body if not.
    pub(crate) async fn check_response(response: Response) -> Result<Response, ApiError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body))
        }
    }

    /// Read the body and decode it as `T`, reporting schema mismatches as
    /// `InvalidResponse`.
    pub(crate) async fn parse_json<T: DeserializeOwned>(response: Response) -> Result<T, ApiError> {
        let url = response.url().path().to_string();
        let text = response.text().await?;
        serde_json::from_str(&text)
            .map_err(|e| ApiError::InvalidResponse(format!("Failed to parse response from {}: {}", url, e)))
    }
}
