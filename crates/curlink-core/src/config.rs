//! Application configuration management.
//!
//! This module handles loading and saving the configuration: backend URL,
//! request timeout, where the session is kept and the last used username.
//!
//! Configuration is stored at `~/.config/curlink/config.json`. The backend URL
//! and timeout can be overridden with `CURLINK_BACKEND_URL` and
//! `CURLINK_TIMEOUT_SECS`.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::api::{ApiClient, DEFAULT_REQUEST_TIMEOUT_SECS};
use crate::auth::{FileSessionStore, KeyringSessionStore, SessionStore};

/// Application name used for config/cache directory paths
const APP_NAME: &str = "curlink";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Backend used when neither the config file nor the environment names one
pub const DEFAULT_BACKEND_URL: &str = "http://127.0.0.1:8000";

/// API prefix below the backend URL
const API_PREFIX: &str = "/api/v1";

pub const BACKEND_URL_ENV: &str = "CURLINK_BACKEND_URL";
pub const TIMEOUT_ENV: &str = "CURLINK_TIMEOUT_SECS";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionBackend {
    /// `session.json` in the cache directory
    #[default]
    File,
    /// OS keychain
    Keyring,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    pub backend_url: Option<String>,
    pub request_timeout_secs: Option<u64>,
    /// Base for printed short links; defaults to the backend URL
    pub short_link_base: Option<String>,
    #[serde(default)]
    pub session_backend: SessionBackend,
    pub last_username: Option<String>,
}

impl Config {
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            serde_json::from_str(&contents).context("Failed to parse config file")
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    pub fn cache_dir(&self) -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }

    /// Backend URL: environment, then config file, then the default.
    pub fn backend_url(&self) -> String {
        std::env::var(BACKEND_URL_ENV)
            .ok()
            .filter(|url| !url.trim().is_empty())
            .or_else(|| self.backend_url.clone())
            .unwrap_or_else(|| DEFAULT_BACKEND_URL.to_string())
            .trim_end_matches('/')
            .to_string()
    }

    pub fn api_base_url(&self) -> String {
        format!("{}{}", self.backend_url(), API_PREFIX)
    }

    pub fn short_link_base(&self) -> String {
        self.short_link_base
            .clone()
            .unwrap_or_else(|| self.backend_url())
    }

    pub fn request_timeout(&self) -> Duration {
        let secs = std::env::var(TIMEOUT_ENV)
            .ok()
            .and_then(|value| value.trim().parse().ok())
            .or(self.request_timeout_secs)
            .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS);
        Duration::from_secs(secs)
    }

    pub fn session_store(&self) -> Result<Arc<dyn SessionStore>> {
        Ok(match self.session_backend {
            SessionBackend::File => Arc::new(FileSessionStore::new(self.cache_dir()?)),
            SessionBackend::Keyring => Arc::new(KeyringSessionStore::new()),
        })
    }

    /// Build an API client from this configuration.
    pub fn api_client(&self) -> Result<ApiClient> {
        let store = self.session_store()?;
        ApiClient::with_timeout(self.api_base_url(), store, self.request_timeout())
            .context("Failed to build HTTP client")
    }
}
