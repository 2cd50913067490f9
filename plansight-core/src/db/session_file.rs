use std::path::{Path, PathBuf};

use crate::db::credentials::SecretVault;
use crate::error::CredentialError;
use crate::models::{SessionProfile, SessionStore};

/// Persists named connection profiles to a single JSON file.
///
/// Every write replaces the whole file, so callers sharing one file must serialize
/// `save`/`upsert`/`remove` (see [`crate::state::AppState`]).
pub struct CredentialStore {
    path: PathBuf,
    vault: Box<dyn SecretVault>,
}

impl CredentialStore {
    pub fn new(path: impl Into<PathBuf>, vault: Box<dyn SecretVault>) -> Self {
        CredentialStore {
            path: path.into(),
            vault,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the session file. Never fails: a missing file is created empty and an
    /// unreadable or malformed one yields an empty store.
    pub fn load(&self) -> SessionStore {
        if !self.path.exists() {
            if let Err(e) = self.save(&SessionStore::default()) {
                log::warn!(
                    "Failed to create session file {}: {}",
                    self.path.display(),
                    e
                );
            }
            return SessionStore::default();
        }

        let contents = match std::fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) => {
                log::warn!("Failed to read session file {}: {}", self.path.display(), e);
                return SessionStore::default();
            }
        };

        match serde_json::from_str::<SessionStore>(&contents) {
            Ok(mut store) => {
                store.repair_current();
                store
            }
            Err(e) => {
                log::warn!(
                    "Ignoring malformed session file {}: {}",
                    self.path.display(),
                    e
                );
                SessionStore::default()
            }
        }
    }

    /// Replace the session file with `store`.
    pub fn save(&self, store: &SessionStore) -> Result<(), CredentialError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let json = serde_json::to_string_pretty(store)?;
        let tmp_path = self.path.with_extension("json.tmp");
        std::fs::write(&tmp_path, json)?;
        std::fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }

    /// Insert or update the profile called `name` and make it current.
    ///
    /// `store` is only changed once the file has been written.
    pub fn upsert(
        &self,
        store: &mut SessionStore,
        name: &str,
        server: &str,
        username: &str,
        password: &str,
    ) -> Result<(), CredentialError> {
        let secret = self.vault.protect(password)?;
        let mut updated = store.clone();

        let replaced = match updated.sessions.iter_mut().find(|s| s.name == name) {
            Some(existing) => {
                existing.server = server.to_string();
                existing.username = username.to_string();
                Some(std::mem::replace(&mut existing.secret, secret.clone()))
            }
            None => {
                updated.sessions.push(SessionProfile {
                    name: name.to_string(),
                    server: server.to_string(),
                    username: username.to_string(),
                    secret: secret.clone(),
                });
                None
            }
        };
        updated.current_session_name = Some(name.to_string());

        if let Err(e) = self.save(&updated) {
            if let Err(forget_err) = self.vault.forget(&secret) {
                log::warn!(
                    "Failed to release unused secret for session {}: {}",
                    name,
                    forget_err
                );
            }
            return Err(e);
        }
        *store = updated;

        if let Some(old) = replaced.filter(|old| !old.is_empty()) {
            if let Err(e) = self.vault.forget(&old) {
                log::warn!("Failed to release previous secret for session {}: {}", name, e);
            }
        }
        log::info!("Saved session {}", name);
        Ok(())
    }

    /// Remove the profile called `name`. Blank or unknown names are ignored.
    pub fn remove(&self, store: &mut SessionStore, name: &str) -> Result<(), CredentialError> {
        if name.trim().is_empty() {
            return Ok(());
        }
        let Some(index) = store.sessions.iter().position(|s| s.name == name) else {
            return Ok(());
        };

        let mut updated = store.clone();
        let removed = updated.sessions.remove(index);
        if updated.current_session_name.as_deref() == Some(name) {
            updated.current_session_name = None;
        }

        self.save(&updated)?;
        *store = updated;

        if !removed.secret.is_empty() {
            if let Err(e) = self.vault.forget(&removed.secret) {
                log::warn!("Failed to release secret for session {}: {}", name, e);
            }
        }
        log::info!("Removed session {}", name);
        Ok(())
    }

    /// Recover the cleartext password of a stored profile.
    pub fn reveal(&self, profile: &SessionProfile) -> Result<String, CredentialError> {
        self.vault.reveal(&profile.secret)
    }
}
