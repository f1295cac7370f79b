//! In-process stand-in for the cu.rl backend.
//!
//! Tokens are opaque strings tracked in maps; tests expire or revoke them to
//! drive the client through its refresh paths. Every handler records a hit
//! and the `Authorization` header it saw.

#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::{header::AUTHORIZATION, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde_json::{json, Value};

use curlink_core::auth::{Session, SessionStore};
use curlink_core::ApiClient;

pub const PASSWORD: &str = "correct horse battery staple";
pub const LOGIN_ERROR: &str = "Unable to log in with provided credentials.";
pub const USERNAME_TAKEN: &str = "A user with that username already exists.";
pub const EMAIL_TAKEN: &str = "A user is already registered with this e-mail address.";
pub const PASSWORDS_DIFFER: &str = "The two password fields didn't match.";
pub const INVALID_TOKEN: &str = "Invalid token for this user.";

#[derive(Default)]
pub struct MockState {
    hits: Mutex<HashMap<&'static str, usize>>,
    authorizations: Mutex<HashMap<&'static str, Vec<Option<String>>>>,
    /// access token -> user
    access_tokens: Mutex<HashMap<String, Value>>,
    /// refresh token -> user
    refresh_tokens: Mutex<HashMap<String, Value>>,
    issued: AtomicUsize,
    pub refresh_fails: AtomicBool,
    /// Refresh answers 200 with a body lacking `access`
    pub refresh_malformed: AtomicBool,
    /// Logout answers 401 whatever token is presented
    pub logout_rejects: AtomicBool,
    pub guest_fails: AtomicBool,
    refresh_delay_ms: AtomicU64,
}

impl MockState {
    fn hit(&self, name: &'static str, headers: &HeaderMap) -> Option<String> {
        *self.hits.lock().unwrap().entry(name).or_default() += 1;
        let authorization = headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        self.authorizations
            .lock()
            .unwrap()
            .entry(name)
            .or_default()
            .push(authorization.clone());
        authorization
            .as_deref()
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(str::to_string)
    }

    pub fn hits(&self, name: &str) -> usize {
        self.hits.lock().unwrap().get(name).copied().unwrap_or(0)
    }

    pub fn authorizations(&self, name: &str) -> Vec<Option<String>> {
        self.authorizations
            .lock()
            .unwrap()
            .get(name)
            .cloned()
            .unwrap_or_default()
    }

    pub fn set_refresh_delay(&self, delay: Duration) {
        self.refresh_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    /// Every access token issued so far now answers 401.
    pub fn expire_access_tokens(&self) {
        self.access_tokens.lock().unwrap().clear();
    }

    fn user_for(&self, access: Option<String>) -> Option<Value> {
        let access = access?;
        self.access_tokens.lock().unwrap().get(&access).cloned()
    }

    fn issue(&self, prefix: &str, user: Value) -> (String, String) {
        let n = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        let access = format!("{}-access-{}", prefix, n);
        let refresh = format!("{}-refresh-{}", prefix, n);
        self.access_tokens
            .lock()
            .unwrap()
            .insert(access.clone(), user.clone());
        self.refresh_tokens
            .lock()
            .unwrap()
            .insert(refresh.clone(), user);
        (access, refresh)
    }

    fn new_user(&self, user_type: &str, username: Option<&str>) -> Value {
        let n = self.issued.load(Ordering::SeqCst) + 1;
        let username = username
            .map(str::to_string)
            .unwrap_or_else(|| format!("guest_{}", n));
        json!({
            "uuid": format!("user-{}", n),
            "username": username,
            "email": null,
            "user_type": user_type,
            "is_superuser": false,
            "date_joined": "2024-03-14T10:00:00.123456Z",
        })
    }

    fn session_body(&self, prefix: &str, user: Value) -> Value {
        let (access, refresh) = self.issue(prefix, user.clone());
        json!({ "access": access, "refresh": refresh, "user": user })
    }
}

type Shared = Arc<MockState>;

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({ "detail": "Given token not valid for any token type", "code": "token_not_valid" })),
    )
        .into_response()
}

async fn guest_token(State(state): State<Shared>, headers: HeaderMap) -> Response {
    state.hit("guest", &headers);
    if state.guest_fails.load(Ordering::SeqCst) {
        return (StatusCode::SERVICE_UNAVAILABLE, "maintenance").into_response();
    }
    let user = state.new_user("guest", None);
    Json(state.session_body("guest", user)).into_response()
}

async fn me(State(state): State<Shared>, headers: HeaderMap) -> Response {
    let token = state.hit("me", &headers);
    match state.user_for(token) {
        Some(user) => Json(user).into_response(),
        None => unauthorized(),
    }
}

async fn login(State(state): State<Shared>, headers: HeaderMap, Json(body): Json<Value>) -> Response {
    state.hit("login", &headers);
    if body["password"] != PASSWORD {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "non_field_errors": [LOGIN_ERROR] })),
        )
            .into_response();
    }
    let user = state.new_user("free", body["username"].as_str());
    Json(state.session_body("user", user)).into_response()
}

async fn logout(State(state): State<Shared>, headers: HeaderMap) -> Response {
    let token = state.hit("logout", &headers);
    if state.logout_rejects.load(Ordering::SeqCst) {
        return unauthorized();
    }
    match state.user_for(token) {
        Some(_) => Json(json!({ "detail": "Successfully logged out." })).into_response(),
        None => unauthorized(),
    }
}

async fn refresh(State(state): State<Shared>, headers: HeaderMap, Json(body): Json<Value>) -> Response {
    state.hit("refresh", &headers);
    let delay = state.refresh_delay_ms.load(Ordering::SeqCst);
    if delay > 0 {
        tokio::time::sleep(Duration::from_millis(delay)).await;
    }
    if state.refresh_fails.load(Ordering::SeqCst) {
        return unauthorized();
    }
    if state.refresh_malformed.load(Ordering::SeqCst) {
        return Json(json!({ "token": "x" })).into_response();
    }
    let presented = body["refresh"].as_str().unwrap_or_default().to_string();
    let user = state.refresh_tokens.lock().unwrap().remove(&presented);
    match user {
        Some(user) => {
            let (access, refresh) = state.issue("refreshed", user);
            Json(json!({ "access": access, "refresh": refresh })).into_response()
        }
        None => unauthorized(),
    }
}

async fn registration(State(state): State<Shared>, headers: HeaderMap, Json(body): Json<Value>) -> Response {
    state.hit("register", &headers);
    if body["username"] == "taken" {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "email": [EMAIL_TAKEN], "username": [USERNAME_TAKEN] })),
        )
            .into_response();
    }
    (
        StatusCode::CREATED,
        Json(json!({ "detail": "Verification e-mail sent." })),
    )
        .into_response()
}

async fn password_reset(State(state): State<Shared>, headers: HeaderMap, Json(body): Json<Value>) -> Response {
    state.hit("password-reset", &headers);
    if body["email"].as_str().map_or(true, |email| !email.contains('@')) {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "email": ["Enter a valid email address."] })),
        )
            .into_response();
    }
    Json(json!({ "detail": "Password reset e-mail has been sent." })).into_response()
}

async fn password_reset_confirm(State(state): State<Shared>, headers: HeaderMap, Json(body): Json<Value>) -> Response {
    state.hit("password-reset-confirm", &headers);
    let mut errors = serde_json::Map::new();
    if body["token"] != "valid-token" {
        errors.insert("non_field_errors".into(), json!(["Reset link expired."]));
        errors.insert("uid".into(), json!(["Invalid value"]));
        errors.insert("token".into(), json!([INVALID_TOKEN]));
    }
    if body["new_password1"] != body["new_password2"] {
        errors.insert("new_password1".into(), json!(["This password is too common."]));
        errors.insert("new_password2".into(), json!([PASSWORDS_DIFFER]));
    }
    if errors.is_empty() {
        Json(json!({ "detail": "Password has been reset with the new password." })).into_response()
    } else {
        (StatusCode::BAD_REQUEST, Json(Value::Object(errors))).into_response()
    }
}

async fn delete_account(State(state): State<Shared>, headers: HeaderMap) -> Response {
    let token = state.hit("delete-account", &headers);
    match state.user_for(token) {
        Some(_) => StatusCode::NO_CONTENT.into_response(),
        None => unauthorized(),
    }
}

async fn list_urls(State(state): State<Shared>, headers: HeaderMap) -> Response {
    let token = state.hit("urls", &headers);
    match state.user_for(token) {
        Some(_) => Json(json!([{
            "uuid": "link-1",
            "original_url": "https://example.com/some/very/long/path",
            "shortened_slug": "abc123",
            "creation_date": "2024-03-15T09:30:00Z",
        }]))
        .into_response(),
        None => unauthorized(),
    }
}

async fn shorten(State(state): State<Shared>, headers: HeaderMap, Json(body): Json<Value>) -> Response {
    let token = state.hit("shorten", &headers);
    let Some(user) = state.user_for(token) else {
        return unauthorized();
    };
    let Some(original_url) = body["original_url"].as_str() else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "original_url is required" })),
        )
            .into_response();
    };
    if body.get("shortened_slug").is_some() && user["user_type"] == "guest" {
        return (
            StatusCode::FORBIDDEN,
            Json(json!({ "error": "Guests cannot create custom URLs" })),
        )
            .into_response();
    }
    let slug = body["shortened_slug"].as_str().unwrap_or("aB3xYz");
    (
        StatusCode::CREATED,
        Json(json!({
            "uuid": "link-2",
            "original_url": original_url,
            "shortened_slug": slug,
            "creation_date": "2024-03-16T12:00:00Z",
            "customized": body.get("shortened_slug").is_some(),
        })),
    )
        .into_response()
}

async fn resolve(State(state): State<Shared>, headers: HeaderMap, Path(slug): Path<String>) -> Response {
    state.hit("resolve", &headers);
    if slug == "abc123" {
        Json(json!({ "original_url": "https://example.com/some/very/long/path" })).into_response()
    } else {
        (StatusCode::NOT_FOUND, Json(json!({ "detail": "Not found." }))).into_response()
    }
}

async fn delete_url(State(state): State<Shared>, headers: HeaderMap, Path(id): Path<String>) -> Response {
    let token = state.hit("delete-url", &headers);
    if state.user_for(token).is_none() {
        return unauthorized();
    }
    if id == "link-1" {
        StatusCode::NO_CONTENT.into_response()
    } else {
        (StatusCode::NOT_FOUND, Json(json!({ "detail": "Not found." }))).into_response()
    }
}

async fn analytics(State(state): State<Shared>, headers: HeaderMap, Path(_id): Path<String>) -> Response {
    let token = state.hit("analytics", &headers);
    if state.user_for(token).is_none() {
        return unauthorized();
    }
    Json(json!({
        "total_clicks": 4,
        "successful_redirects": 3,
        "failed_redirects": 1,
        "countries": ["Kenya", null],
        "browsers": ["Firefox"],
        "platforms": ["Linux"],
        "devices": ["Desktop"],
    }))
    .into_response()
}

async fn health(State(state): State<Shared>, headers: HeaderMap) -> Response {
    state.hit("health", &headers);
    Json(json!({ "status": "ok" })).into_response()
}

pub struct MockBackend {
    pub state: Shared,
    addr: SocketAddr,
}

impl MockBackend {
    pub async fn start() -> Self {
        let state: Shared = Arc::new(MockState::default());

        let api = Router::new()
            .route("/auth/guest-token/", get(guest_token))
            .route("/auth/me/", get(me))
            .route("/auth/login/", post(login))
            .route("/auth/logout/", post(logout))
            .route("/auth/token/refresh/", post(refresh))
            .route("/auth/registration/", post(registration))
            .route("/auth/password/reset/", post(password_reset))
            .route("/auth/password/reset/confirm/", post(password_reset_confirm))
            .route("/auth/delete-account/", delete(delete_account))
            .route("/urls/", get(list_urls))
            .route("/urls/shorten/", post(shorten))
            .route("/urls/{slug}/", get(resolve).delete(delete_url))
            .route("/urls/{slug}/analytics/", get(analytics))
            .route("/health/", get(health))
            .with_state(state.clone());
        let app = Router::new().nest("/api/v1", api);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind mock backend");
        let addr = listener.local_addr().expect("mock backend address");
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("mock backend crashed");
        });

        Self { state, addr }
    }

    pub fn api_base_url(&self) -> String {
        format!("http://{}/api/v1", self.addr)
    }

    pub fn client(&self, store: Arc<dyn SessionStore>) -> ApiClient {
        ApiClient::new(self.api_base_url(), store).expect("build client")
    }

    pub fn client_with_timeout(&self, store: Arc<dyn SessionStore>, timeout: Duration) -> ApiClient {
        ApiClient::with_timeout(self.api_base_url(), store, timeout).expect("build client")
    }

    /// A session the backend currently accepts, for a registered user.
    pub fn registered_session(&self, username: &str) -> Session {
        let user = self.state.new_user("free", Some(username));
        serde_json::from_value(self.state.session_body("user", user)).expect("session shape")
    }
}
