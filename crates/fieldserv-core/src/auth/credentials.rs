use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use futures::stream::{self, Stream};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{info, warn};

use super::persist::{CredentialBackend, MemoryBackend};

/// The tokens plus login flag representing an authenticated session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(rename_all = "camelCase")]
pub struct Credential {
    pub access_token: String,
    pub refresh_token: String,
    pub is_logged_in: bool,
}

impl Credential {
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        let access_token = access_token.into();
        Self {
            is_logged_in: !access_token.is_empty(),
            access_token,
            refresh_token: refresh_token.into(),
        }
    }
}

/// Process-wide owner of the current credential.
///
/// Cloning hands out another handle to the same store. Readers get a full
/// snapshot; writers replace the snapshot in one step, so a reader never sees
/// half of an update.
#[derive(Clone)]
pub struct CredentialStore {
    inner: Arc<Inner>,
}

struct Inner {
    backend: Box<dyn CredentialBackend>,
    state: watch::Sender<Credential>,
    write_lock: Mutex<()>,
}

impl CredentialStore {
    /// Open a store, loading whatever the backend persisted last.
    pub fn open(backend: impl CredentialBackend + 'static) -> Self {
        let initial = match backend.load() {
            Ok(Some(credential)) => credential,
            Ok(None) => Credential::default(),
            Err(e) => {
                warn!(error = %e, "Failed to load stored credential");
                Credential::default()
            }
        };
        let (state, _) = watch::channel(initial);
        Self {
            inner: Arc::new(Inner {
                backend: Box::new(backend),
                state,
                write_lock: Mutex::new(()),
            }),
        }
    }

    /// A store that forgets everything when the process exits.
    pub fn in_memory() -> Self {
        Self::open(MemoryBackend::default())
    }

    /// Current snapshot.
    pub fn get(&self) -> Credential {
        self.inner.state.borrow().clone()
    }

    /// Store both tokens. Logged in only if the access token is non-empty.
    pub fn save(&self, access_token: &str, refresh_token: &str) -> Result<()> {
        self.replace(Credential::new(access_token, refresh_token))
    }

    /// Replace the access token, keeping the refresh token.
    pub fn update_access_token(&self, access_token: &str) -> Result<()> {
        let _guard = self.lock_writes();
        let refresh_token = self.inner.state.borrow().refresh_token.clone();
        self.publish(Credential::new(access_token, refresh_token))
    }

    /// Erase both tokens and mark the session logged out.
    pub fn clear(&self) -> Result<()> {
        let _guard = self.lock_writes();
        let previous = self.inner.state.send_replace(Credential::default());
        if previous != Credential::default() {
            info!("Cleared stored credential");
        }
        self.inner.backend.erase()
    }

    /// Receiver that sees every published snapshot.
    pub fn subscribe(&self) -> watch::Receiver<Credential> {
        self.inner.state.subscribe()
    }

    /// Stream yielding the current credential, then each change.
    ///
    /// Changes that land faster than the consumer polls are collapsed to the
    /// latest one, so an observer is not guaranteed to see every intermediate
    /// state. A sign-out followed at once by a new sign-in may surface only as
    /// the new credential.
    pub fn observe(&self) -> impl Stream<Item = Credential> + Send + 'static {
        let mut rx = self.subscribe();
        rx.mark_changed();
        stream::unfold(rx, |mut rx| async move {
            rx.changed().await.ok()?;
            let credential = rx.borrow_and_update().clone();
            Some((credential, rx))
        })
    }

    /// Run a store write on the blocking pool.
    ///
    /// Backends may call into the OS keychain, touch the disk or derive an
    /// encryption key, none of which belongs on a runtime worker thread.
    pub async fn write_blocking<F>(&self, write: F) -> Result<()>
    where
        F: FnOnce(&CredentialStore) -> Result<()> + Send + 'static,
    {
        let store = self.clone();
        tokio::task::spawn_blocking(move || write(&store))
            .await
            .context("Credential write task failed")?
    }

    fn replace(&self, credential: Credential) -> Result<()> {
        let _guard = self.lock_writes();
        self.publish(credential)
    }

    /// The in-memory snapshot is replaced even if persisting fails.
    fn publish(&self, credential: Credential) -> Result<()> {
        self.inner.state.send_replace(credential.clone());
        self.inner.backend.persist(&credential)
    }

    fn lock_writes(&self) -> std::sync::MutexGuard<'_, ()> {
        // The guarded data is (), so a poisoned lock carries no broken state.
        self.inner
            .write_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl std::fmt::Debug for CredentialStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialStore")
            .field("is_logged_in", &self.inner.state.borrow().is_logged_in)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[test]
    fn test_save_marks_logged_in() {
        let store = CredentialStore::in_memory();
        assert!(!store.get().is_logged_in);

        store.save("a1", "r1").expect("memory backend");
        assert_eq!(store.get(), Credential::new("a1", "r1"));
        assert!(store.get().is_logged_in);
    }

    #[test]
    fn test_save_empty_access_token_not_logged_in() {
        let store = CredentialStore::in_memory();
        store.save("", "r1").expect("memory backend");
        let credential = store.get();
        assert!(!credential.is_logged_in);
        assert_eq!(credential.refresh_token, "r1");
    }

    #[test]
    fn test_update_access_token_keeps_refresh() {
        let store = CredentialStore::in_memory();
        store.save("a1", "r1").expect("memory backend");
        store.update_access_token("a2").expect("memory backend");
        assert_eq!(store.get(), Credential::new("a2", "r1"));
    }

    #[test]
    fn test_clear() {
        let store = CredentialStore::in_memory();
        store.save("a1", "r1").expect("memory backend");
        store.clear().expect("memory backend");
        assert_eq!(store.get(), Credential::default());
    }

    #[test]
    fn test_clones_share_state() {
        let store = CredentialStore::in_memory();
        let handle = store.clone();
        store.save("a1", "r1").expect("memory backend");
        assert_eq!(handle.get().access_token, "a1");
    }

    #[test]
    fn test_open_loads_persisted() {
        let backend = MemoryBackend::default();
        backend.persist(&Credential::new("a1", "r1")).expect("memory backend");
        let store = CredentialStore::open(backend);
        assert_eq!(store.get(), Credential::new("a1", "r1"));
    }

    #[tokio::test]
    async fn test_write_blocking_updates_snapshot() {
        let store = CredentialStore::in_memory();
        store
            .write_blocking(|s| s.save("a1", "r1"))
            .await
            .expect("memory backend");
        assert_eq!(store.get(), Credential::new("a1", "r1"));

        store
            .write_blocking(|s| s.clear())
            .await
            .expect("memory backend");
        assert!(!store.get().is_logged_in);
    }

    #[tokio::test]
    async fn test_observe_collapses_unread_changes() {
        let store = CredentialStore::in_memory();
        let mut changes = Box::pin(store.observe());
        assert_eq!(changes.next().await, Some(Credential::default()));

        store.save("a1", "r1").expect("memory backend");
        store.clear().expect("memory backend");
        store.save("a2", "r2").expect("memory backend");

        // Only the latest snapshot is delivered for writes the observer missed.
        assert_eq!(changes.next().await, Some(Credential::new("a2", "r2")));
    }

    #[tokio::test]
    async fn test_observe_pushes_changes() {
        let store = CredentialStore::in_memory();
        let mut changes = Box::pin(store.observe());

        assert_eq!(changes.next().await, Some(Credential::default()));

        store.save("a1", "r1").expect("memory backend");
        assert_eq!(changes.next().await, Some(Credential::new("a1", "r1")));

        store.clear().expect("memory backend");
        let after_clear = changes.next().await.expect("store still alive");
        assert!(!after_clear.is_logged_in);
    }
}
