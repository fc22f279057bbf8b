//! Application configuration management.
//!
//! This module handles loading and saving the application configuration,
//! which includes the API server, timeouts, how credentials are stored, and
//! the last phone number used to sign in.
//!
//! Configuration is stored at `~/.config/fieldserv/config.json`. A few values
//! can be overridden from the environment (see `apply_env`).

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::api::transport::DEFAULT_REQUEST_TIMEOUT_SECS;
use crate::api::ClientSettings;
use crate::auth::renewal::DEFAULT_RENEWAL_PATH;
use crate::auth::{CredentialStore, FileBackend, KeyringBackend, MemoryBackend};

/// Application name used for config/cache directory paths
const APP_NAME: &str = "fieldserv";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Server used when nothing is configured
pub const DEFAULT_BASE_URL: &str = "http://localhost:8080/api";

/// Overrides `base_url`
pub const BASE_URL_ENV: &str = "FIELDSERV_BASE_URL";

/// Secret the file credential backend derives its key from
pub const STORE_SECRET_ENV: &str = "FIELDSERV_STORE_SECRET";

/// Where credentials are persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Keyring,
    File,
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    pub base_url: Option<String>,
    pub request_timeout_secs: Option<u64>,
    pub renewal_path: Option<String>,
    pub authorization_scheme: Option<String>,
    #[serde(default)]
    pub credential_backend: BackendKind,
    pub last_phone: Option<String>,
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path).context("Failed to read config file")?;
            Ok(serde_json::from_str(&contents).context("Failed to parse config file")?)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
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

    /// Apply overrides from the process environment.
    pub fn apply_env(&mut self) {
        if let Ok(url) = std::env::var(BASE_URL_ENV) {
            if !url.trim().is_empty() {
                self.base_url = Some(url);
            }
        }
    }

    pub fn base_url(&self) -> &str {
        self.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL)
    }

    pub fn request_timeout_secs(&self) -> u64 {
        self.request_timeout_secs
            .filter(|&secs| secs > 0)
            .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS)
    }

    pub fn client_settings(&self) -> ClientSettings {
        ClientSettings {
            renewal_path: self
                .renewal_path
                .clone()
                .unwrap_or_else(|| DEFAULT_RENEWAL_PATH.to_string()),
            authorization_scheme: self.authorization_scheme.clone(),
        }
    }

    /// Open the credential store on the configured backend.
    pub fn open_store(&self) -> Result<CredentialStore> {
        let store = match self.credential_backend {
            BackendKind::Keyring => CredentialStore::open(KeyringBackend::new()),
            BackendKind::Memory => CredentialStore::open(MemoryBackend::default()),
            BackendKind::File => {
                let secret = std::env::var(STORE_SECRET_ENV).with_context(|| {
                    format!("{} must be set to use the file credential backend", STORE_SECRET_ENV)
                })?;
                CredentialStore::open(FileBackend::new(self.cache_dir()?, secret))
            }
        };
        Ok(store)
    }
}
