//! Typed cu.rl endpoints built on `call_with_auth` / `call_without_auth`.

use reqwest::{Response, StatusCode};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::auth::Session;
use crate::models::{
    Credentials, NewShortUrl, PasswordResetConfirm, Redirect, Registration, ShortUrl, UrlAnalytics, User,
};

use super::error::{
    ErrorFields, DELETE_ACCOUNT_ERRORS, LOGIN_ERRORS, PASSWORD_RESET_CONFIRM_ERRORS, PASSWORD_RESET_ERRORS,
    REGISTRATION_ERRORS, SHORTEN_ERRORS,
};
use super::{ApiClient, ApiError, ApiRequest};

#[derive(Serialize)]
struct LogoutRequest<'a> {
    refresh: &'a str,
}

#[derive(Serialize)]
struct PasswordResetRequest<'a> {
    email: &'a str,
}

impl ApiClient {
    /// Turn a non-success form submission into a display error.
    async fn form_result(response: Response, errors: ErrorFields) -> Result<Response, ApiError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        debug!(%status, body = %body, "Form submission rejected");
        Err(ApiError::from_form_rejection(status, &body, errors))
    }

    // ===== Account =====

    /// Obtain a fresh guest session. The server creates the guest user.
    pub async fn guest_session(&self) -> Result<Session, ApiError> {
        let response = self.call_without_auth(&ApiRequest::get("/auth/guest-token/")).await?;
        let response = Self::check_response(response).await?;
        let session: Session = Self::parse_json(response).await?;
        info!(uuid = %session.user.uuid, "Guest session obtained");
        Ok(session)
    }

    /// Ask the server who the stored credentials belong to.
    ///
    /// Any failure, including transport errors, reads as "no session".
    pub async fn current_user(&self) -> Option<User> {
        let response = match self.call_with_auth(&ApiRequest::get("/auth/me/")).await {
            Ok(response) if response.status().is_success() => response,
            Ok(response) => {
                debug!(status = %response.status(), "No current user");
                return None;
            }
            Err(e) => {
                debug!(error = %e, "Current user lookup failed");
                return None;
            }
        };
        Self::parse_json(response).await.ok()
    }

    /// Exchange username and password for a registered session.
    ///
    /// Sent with the current (guest) credentials attached so the server can
    /// move the guest's links over to the account.
    pub async fn login(&self, credentials: &Credentials) -> Result<Session, ApiError> {
        let request = ApiRequest::post("/auth/login/").json(credentials)?;
        let response = self.call_with_auth(&request).await?;
        let response = Self::form_result(response, LOGIN_ERRORS).await?;
        let session: Session = Self::parse_json(response).await?;
        info!(username = %session.user.username, "Login successful");
        Ok(session)
    }

    /// Revoke `refresh` on the server. A 401 means the session is already
    /// gone and counts as success.
    pub async fn logout_remote(&self, refresh: &str) -> Result<(), ApiError> {
        let request = ApiRequest::post("/auth/logout/").json(&LogoutRequest { refresh })?;
        let response = self.call_with_auth(&request).await?;
        if response.status() == StatusCode::UNAUTHORIZED {
            debug!("Server reports session already logged out");
            return Ok(());
        }
        Self::check_response(response).await?;
        Ok(())
    }

    /// Create an account. Does not log in.
    pub async fn register(&self, registration: &Registration) -> Result<(), ApiError> {
        let request = ApiRequest::post("/auth/registration/").json(registration)?;
        let response = self.call_without_auth(&request).await?;
        if let Err(e) = Self::form_result(response, REGISTRATION_ERRORS).await {
            warn!(username = %registration.username, error = %e, "Registration rejected");
            return Err(e);
        }
        info!(username = %registration.username, "Registration successful");
        Ok(())
    }

    pub async fn forgot_password(&self, email: &str) -> Result<(), ApiError> {
        let request = ApiRequest::post("/auth/password/reset/").json(&PasswordResetRequest { email })?;
        let response = self.call_without_auth(&request).await?;
        Self::form_result(response, PASSWORD_RESET_ERRORS).await?;
        Ok(())
    }

    pub async fn reset_password_confirm(&self, reset: &PasswordResetConfirm) -> Result<(), ApiError> {
        let request = ApiRequest::post("/auth/password/reset/confirm/").json(reset)?;
        let response = self.call_without_auth(&request).await?;
        Self::form_result(response, PASSWORD_RESET_CONFIRM_ERRORS).await?;
        Ok(())
    }

    /// Permanently delete the logged-in account on the server.
    pub async fn delete_account(&self) -> Result<(), ApiError> {
        let response = self.call_with_auth(&ApiRequest::delete("/auth/delete-account/")).await?;
        Self::form_result(response, DELETE_ACCOUNT_ERRORS).await?;
        Ok(())
    }

    // ===== Links =====

    /// Shorten `original_url`, optionally under a custom slug. The server
    /// returns the existing link if this user already shortened the URL.
    pub async fn shorten(&self, original_url: &str, slug: Option<&str>) -> Result<ShortUrl, ApiError> {
        let body = NewShortUrl {
            original_url: original_url.to_string(),
            shortened_slug: slug.map(str::to_string),
        };
        let request = ApiRequest::post("/urls/shorten/").json(&body)?;
        let response = self.call_with_auth(&request).await?;
        let response = Self::form_result(response, SHORTEN_ERRORS).await?;
        Self::parse_json(response).await
    }

    pub async fn list_urls(&self) -> Result<Vec<ShortUrl>, ApiError> {
        let response = self.call_with_auth(&ApiRequest::get("/urls/")).await?;
        let response = Self::check_response(response).await?;
        Self::parse_json(response).await
    }

    pub async fn delete_url(&self, uuid: &str) -> Result<(), ApiError> {
        let response = self.call_with_auth(&ApiRequest::delete(format!("/urls/{}/", uuid))).await?;
        Self::check_response(response).await?;
        Ok(())
    }

    pub async fn url_analytics(&self, uuid: &str) -> Result<UrlAnalytics, ApiError> {
        let response = self
            .call_with_auth(&ApiRequest::get(format!("/urls/{}/analytics/", uuid)))
            .await?;
        let response = Self::check_response(response).await?;
        Self::parse_json(response).await
    }

    /// Look up where a slug points. Public; records a click server-side.
    pub async fn resolve(&self, slug: &str) -> Result<Redirect, ApiError> {
        let response = self
            .call_without_auth(&ApiRequest::get(format!("/urls/{}/", slug)))
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(ApiError::NotFound(format!("No link for slug {}", slug)));
        }
        let response = Self::check_response(response).await?;
        Self::parse_json(response).await
    }

    /// Whether the API answers its health check.
    pub async fn health(&self) -> Result<bool, ApiError> {
        let response = self.call_without_auth(&ApiRequest::get("/health/")).await?;
        Ok(response.status().is_success())
    }
}
