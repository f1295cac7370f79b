use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A shortened link owned by the current user.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct ShortUrl {
    pub uuid: String,
    pub original_url: String,
    pub shortened_slug: String,
    pub creation_date: DateTime<Utc>,
    #[serde(default)]
    pub customized: bool,
    #[serde(default)]
    pub is_active: Option<bool>,
    #[serde(default)]
    pub expiration_date: Option<DateTime<Utc>>,
}

impl ShortUrl {
    /// Public link for this slug under `base` (e.g. `https://cu.rl`).
    pub fn short_link(&self, base: &str) -> String {
        format!("{}/{}", base.trim_end_matches('/'), self.shortened_slug)
    }

    pub fn is_expired(&self) -> bool {
        self.expiration_date
            .map(|expires| Utc::now() > expires)
            .unwrap_or(false)
    }

    /// Whether a visit to the short link would redirect.
    pub fn is_accessible(&self) -> bool {
        self.is_active.unwrap_or(true) && !self.is_expired()
    }
}

/// Request body for `POST /urls/shorten/`.
#[derive(Debug, Clone, Serialize)]
pub struct NewShortUrl {
    pub original_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shortened_slug: Option<String>,
}

/// Click statistics for a single link.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct UrlAnalytics {
    pub total_clicks: u64,
    pub successful_redirects: u64,
    pub failed_redirects: u64,
    #[serde(default)]
    pub countries: Vec<Option<String>>,
    #[serde(default)]
    pub browsers: Vec<Option<String>>,
    #[serde(default)]
    pub platforms: Vec<Option<String>>,
    #[serde(default)]
    pub devices: Vec<Option<String>>,
}

impl UrlAnalytics {
    /// Share of clicks that redirected, as a percentage.
    pub fn success_rate(&self) -> f64 {
        if self.total_clicks == 0 {
            0.0
        } else {
            self.successful_redirects as f64 * 100.0 / self.total_clicks as f64
        }
    }
}

/// Target of a slug, as returned by the public redirect endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct Redirect {
    pub original_url: String,
}
