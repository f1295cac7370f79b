use serde_json::Value;
use thiserror::Error;

use crate::auth::StoreError;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Session expired. Please log in again.")]
    SessionExpired,

    /// The server rejected form input; the message is meant for direct display.
    #[error("{0}")]
    Validation(String),

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Rate limited - please wait before retrying")]
    RateLimited,

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Session storage error: {0}")]
    Storage(#[from] StoreError),
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

/// Field lookup order and fallback message for one form endpoint.
#[derive(Debug, Clone, Copy)]
pub struct ErrorFields {
    pub fields: &'static [&'static str],
    pub fallback: &'static str,
}

pub const LOGIN_ERRORS: ErrorFields = ErrorFields {
    fields: &["non_field_errors"],
    fallback: "Login failed",
};

pub const REGISTRATION_ERRORS: ErrorFields = ErrorFields {
    fields: &["non_field_errors", "username", "email", "password1", "password2"],
    fallback: "Registration failed",
};

pub const PASSWORD_RESET_ERRORS: ErrorFields = ErrorFields {
    fields: &["email"],
    fallback: "Failed to send password reset email",
};

pub const PASSWORD_RESET_CONFIRM_ERRORS: ErrorFields = ErrorFields {
    fields: &["new_password2", "new_password1", "token", "uid", "non_field_errors"],
    fallback: "Failed to reset password",
};

pub const SHORTEN_ERRORS: ErrorFields = ErrorFields {
    fields: &["error", "original_url", "shortened_slug"],
    fallback: "Failed to shorten URL",
};

pub const DELETE_ACCOUNT_ERRORS: ErrorFields = ErrorFields {
    fields: &["detail", "error"],
    fallback: "Failed to delete account",
};

impl ApiError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            return body.to_string();
        }
        let mut end = MAX_ERROR_BODY_LENGTH;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
    }

    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let truncated = Self::truncate_body(body);
        match status.as_u16() {
            401 => ApiError::Unauthorized,
            403 => ApiError::AccessDenied(truncated),
            404 => ApiError::NotFound(truncated),
            429 => ApiError::RateLimited,
            500..=599 => ApiError::ServerError(truncated),
            _ => ApiError::InvalidResponse(format!("Status {}: {}", status, truncated)),
        }
    }

    /// Build a display error from a rejected form submission.
    ///
    /// Server errors keep their status mapping; anything else becomes a
    /// `Validation` error carrying the first field message found in `body`.
    pub fn from_form_rejection(status: reqwest::StatusCode, body: &str, errors: ErrorFields) -> Self {
        if status.is_server_error() || status.as_u16() == 429 {
            return Self::from_status(status, body);
        }
        let message = serde_json::from_str::<Value>(body)
            .ok()
            .and_then(|value| first_field_error(&value, errors.fields))
            .unwrap_or_else(|| errors.fallback.to_string());
        ApiError::Validation(message)
    }
}

/// Pick the first non-empty message among `fields`, in order.
///
/// Field values may be a plain string or a list of strings; anything else is
/// skipped. Returns `None` when no listed field carries a message.
pub fn first_field_error(body: &Value, fields: &[&str]) -> Option<String> {
    fields.iter().find_map(|field| match body.get(*field)? {
        Value::String(message) if !message.is_empty() => Some(message.clone()),
        Value::Array(items) => items.iter().find_map(|item| match item {
            Value::String(message) if !message.is_empty() => Some(message.clone()),
            _ => None,
        }),
        _ => None,
    })
}
