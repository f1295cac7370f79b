use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Account tier reported by the server.
///
/// Registered accounts are tagged `"free"` on the wire; `"registered"` is
/// accepted too.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(rename_all = "lowercase")]
pub enum UserType {
    Guest,
    #[serde(rename = "free", alias = "registered")]
    Registered,
}

impl UserType {
    pub fn display_name(&self) -> &'static str {
        match self {
            UserType::Guest => "Guest",
            UserType::Registered => "Registered",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct User {
    pub uuid: String,
    pub username: String,
    #[serde(default)]
    pub email: Option<String>,
    pub user_type: UserType,
    #[serde(default)]
    pub is_superuser: bool,
    pub date_joined: DateTime<Utc>,
}

impl User {
    pub fn is_guest(&self) -> bool {
        self.user_type == UserType::Guest
    }

    /// Name to show in prompts; guests get a generic label instead of their
    /// server-generated username.
    pub fn display_name(&self) -> &str {
        if self.is_guest() {
            "guest"
        } else {
            &self.username
        }
    }
}
