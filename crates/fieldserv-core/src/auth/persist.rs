//! Durable storage behind the credential store.
//!
//! Every backend keeps two logical namespaces: the tokens
//! (`accessToken`, `refreshToken`) and the login flag (`isLoggedIn`). They are
//! written and erased together.

use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use keyring::Entry;
use serde::{Deserialize, Serialize};

use super::credentials::Credential;
use super::vault;

/// Keychain service name
const SERVICE_NAME: &str = "fieldserv";

const ACCESS_TOKEN_KEY: &str = "accessToken";
const REFRESH_TOKEN_KEY: &str = "refreshToken";
const LOGIN_FLAG_KEY: &str = "isLoggedIn";

/// Sealed token file name
const TOKENS_FILE: &str = "tokens.bin";

/// Login flag file name
const SESSION_FILE: &str = "session.json";

pub trait CredentialBackend: Send + Sync {
    /// Last persisted credential, or `None` if nothing was ever saved.
    fn load(&self) -> Result<Option<Credential>>;
    fn persist(&self, credential: &Credential) -> Result<()>;
    fn erase(&self) -> Result<()>;
}

// ============================================================================
// Memory
// ============================================================================

/// Keeps the credential for the lifetime of the process only.
#[derive(Default)]
pub struct MemoryBackend {
    slot: Mutex<Option<Credential>>,
}

impl MemoryBackend {
    fn slot(&self) -> std::sync::MutexGuard<'_, Option<Credential>> {
        self.slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl CredentialBackend for MemoryBackend {
    fn load(&self) -> Result<Option<Credential>> {
        Ok(self.slot().clone())
    }

    fn persist(&self, credential: &Credential) -> Result<()> {
        *self.slot() = Some(credential.clone());
        Ok(())
    }

    fn erase(&self) -> Result<()> {
        *self.slot() = None;
        Ok(())
    }
}

// ============================================================================
// OS keychain
// ============================================================================

/// Stores each key as its own keychain entry.
pub struct KeyringBackend {
    service: String,
}

impl KeyringBackend {
    pub fn new() -> Self {
        Self::with_service(SERVICE_NAME)
    }

    pub fn with_service(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    fn entry(&self, key: &str) -> Result<Entry> {
        Entry::new(&self.service, key).context("Failed to create keyring entry")
    }

    fn read(&self, key: &str) -> Result<Option<String>> {
        match self.entry(key)?.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e).context("Failed to retrieve value from keychain"),
        }
    }

    fn write(&self, key: &str, value: &str) -> Result<()> {
        self.entry(key)?
            .set_password(value)
            .context("Failed to store value in keychain")
    }

    fn remove(&self, key: &str) -> Result<()> {
        match self.entry(key)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e).context("Failed to delete value from keychain"),
        }
    }
}

impl Default for KeyringBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl CredentialBackend for KeyringBackend {
    fn load(&self) -> Result<Option<Credential>> {
        let Some(access_token) = self.read(ACCESS_TOKEN_KEY)? else {
            return Ok(None);
        };
        let refresh_token = self.read(REFRESH_TOKEN_KEY)?.unwrap_or_default();
        let is_logged_in = self.read(LOGIN_FLAG_KEY)?.as_deref() == Some("true");
        Ok(Some(Credential {
            is_logged_in: is_logged_in && !access_token.is_empty(),
            access_token,
            refresh_token,
        }))
    }

    fn persist(&self, credential: &Credential) -> Result<()> {
        self.write(ACCESS_TOKEN_KEY, &credential.access_token)?;
        self.write(REFRESH_TOKEN_KEY, &credential.refresh_token)?;
        self.write(LOGIN_FLAG_KEY, if credential.is_logged_in { "true" } else { "false" })
    }

    fn erase(&self) -> Result<()> {
        self.remove(ACCESS_TOKEN_KEY)?;
        self.remove(REFRESH_TOKEN_KEY)?;
        self.remove(LOGIN_FLAG_KEY)
    }
}

// ============================================================================
// Encrypted file
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredTokens {
    access_token: String,
    refresh_token: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoginFlag {
    is_logged_in: bool,
    updated_at: DateTime<Utc>,
}

/// Tokens sealed in one file, login flag in plain JSON next to it.
pub struct FileBackend {
    dir: PathBuf,
    secret: Vec<u8>,
}

impl FileBackend {
    pub fn new(dir: PathBuf, secret: impl Into<Vec<u8>>) -> Self {
        Self {
            dir,
            secret: secret.into(),
        }
    }

    fn tokens_path(&self) -> PathBuf {
        self.dir.join(TOKENS_FILE)
    }

    fn session_path(&self) -> PathBuf {
        self.dir.join(SESSION_FILE)
    }

    fn load_flag(&self) -> Result<Option<LoginFlag>> {
        let path = self.session_path();
        if !path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(&path).context("Failed to read session file")?;
        let flag = serde_json::from_str(&contents).context("Failed to parse session file")?;
        Ok(Some(flag))
    }
}

impl CredentialBackend for FileBackend {
    fn load(&self) -> Result<Option<Credential>> {
        let path = self.tokens_path();
        if !path.exists() {
            return Ok(None);
        }
        let sealed = std::fs::read(&path).context("Failed to read token file")?;
        let plain = vault::unseal(&self.secret, &sealed).context("Failed to unseal token file")?;
        let tokens: StoredTokens =
            serde_json::from_slice(&plain).context("Failed to parse token file")?;

        let is_logged_in = match self.load_flag()? {
            Some(flag) => flag.is_logged_in,
            None => !tokens.access_token.is_empty(),
        };
        Ok(Some(Credential {
            is_logged_in: is_logged_in && !tokens.access_token.is_empty(),
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
        }))
    }

    fn persist(&self, credential: &Credential) -> Result<()> {
        std::fs::create_dir_all(&self.dir)?;

        let tokens = StoredTokens {
            access_token: credential.access_token.clone(),
            refresh_token: credential.refresh_token.clone(),
        };
        let sealed = vault::seal(&self.secret, &serde_json::to_vec(&tokens)?)?;
        std::fs::write(self.tokens_path(), sealed).context("Failed to write token file")?;

        let flag = LoginFlag {
            is_logged_in: credential.is_logged_in,
            updated_at: Utc::now(),
        };
        let contents = serde_json::to_string_pretty(&flag)?;
        std::fs::write(self.session_path(), contents).context("Failed to write session file")?;
        Ok(())
    }

    fn erase(&self) -> Result<()> {
        for path in [self.tokens_path(), self.session_path()] {
            if path.exists() {
                std::fs::remove_file(&path)
                    .with_context(|| format!("Failed to remove {}", path.display()))?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::CredentialStore;

    #[test]
    fn test_memory_backend() {
        let backend = MemoryBackend::default();
        assert_eq!(backend.load().expect("load"), None);
        backend.persist(&Credential::new("a1", "r1")).expect("persist");
        assert_eq!(backend.load().expect("load"), Some(Credential::new("a1", "r1")));
        backend.erase().expect("erase");
        assert_eq!(backend.load().expect("load"), None);
    }

    #[test]
    fn test_file_backend_survives_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");

        let store = CredentialStore::open(FileBackend::new(dir.path().to_path_buf(), "secret"));
        store.save("a1", "r1").expect("save");
        drop(store);

        let reopened = CredentialStore::open(FileBackend::new(dir.path().to_path_buf(), "secret"));
        assert_eq!(reopened.get(), Credential::new("a1", "r1"));
    }

    #[test]
    fn test_file_backend_tokens_not_plaintext() {
        let dir = tempfile::tempdir().expect("tempdir");
        let backend = FileBackend::new(dir.path().to_path_buf(), "secret");
        backend
            .persist(&Credential::new("plain-access-token", "r1"))
            .expect("persist");

        let raw = std::fs::read(dir.path().join(TOKENS_FILE)).expect("token file");
        let needle = b"plain-access-token";
        assert!(!raw.windows(needle.len()).any(|w| w == needle));

        let flag = std::fs::read_to_string(dir.path().join(SESSION_FILE)).expect("session file");
        assert!(flag.contains("\"isLoggedIn\": true"));
    }

    #[test]
    fn test_file_backend_wrong_secret() {
        let dir = tempfile::tempdir().expect("tempdir");
        FileBackend::new(dir.path().to_path_buf(), "secret")
            .persist(&Credential::new("a1", "r1"))
            .expect("persist");

        let other = FileBackend::new(dir.path().to_path_buf(), "not-the-secret");
        assert!(other.load().is_err());

        // The store treats an unreadable backend as logged out.
        let store = CredentialStore::open(other);
        assert_eq!(store.get(), Credential::default());
    }

    #[test]
    fn test_file_backend_erase_clears_both_namespaces() {
        let dir = tempfile::tempdir().expect("tempdir");
        let backend = FileBackend::new(dir.path().to_path_buf(), "secret");
        backend.persist(&Credential::new("a1", "r1")).expect("persist");
        backend.erase().expect("erase");

        assert!(!dir.path().join(TOKENS_FILE).exists());
        assert!(!dir.path().join(SESSION_FILE).exists());
        assert_eq!(backend.load().expect("load"), None);
        // Erasing twice is fine.
        backend.erase().expect("erase again");
    }
}
