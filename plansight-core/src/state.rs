use std::sync::{Mutex, MutexGuard};

use crate::db::mssql::ConnectionTarget;
use crate::db::session_file::CredentialStore;
use crate::error::CredentialError;
use crate::models::{AppSettings, SessionProfile, SessionStore};

/// Shared application state: the loaded sessions, the store that persists them and the
/// effective settings.
pub struct AppState {
    /// Saved sessions (cached from the session file)
    sessions: Mutex<SessionStore>,

    /// Persistence for `sessions`; all writes go through the lock above
    credentials: CredentialStore,

    pub settings: AppSettings,
}

impl AppState {
    pub fn new(credentials: CredentialStore, settings: AppSettings) -> Self {
        let sessions = credentials.load();
        log::info!(
            "Loaded {} saved sessions from {}",
            sessions.len(),
            credentials.path().display()
        );
        Self {
            sessions: Mutex::new(sessions),
            credentials,
            settings,
        }
    }

    fn lock_sessions(&self) -> MutexGuard<'_, SessionStore> {
        self.sessions.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Snapshot of the saved sessions
    pub fn sessions(&self) -> SessionStore {
        self.lock_sessions().clone()
    }

    /// Add or update a session and make it current
    pub fn upsert_session(
        &self,
        name: &str,
        server: &str,
        username: &str,
        password: &str,
    ) -> Result<(), CredentialError> {
        let mut sessions = self.lock_sessions();
        self.credentials
            .upsert(&mut sessions, name, server, username, password)
    }

    /// Remove a session
    pub fn remove_session(&self, name: &str) -> Result<(), CredentialError> {
        let mut sessions = self.lock_sessions();
        self.credentials.remove(&mut sessions, name)
    }

    /// The named session, or the current one when `name` is `None`
    pub fn resolve_session(&self, name: Option<&str>) -> Result<SessionProfile, CredentialError> {
        let sessions = self.lock_sessions();
        match name {
            Some(name) => sessions
                .find_by_name(name)
                .cloned()
                .ok_or_else(|| CredentialError::UnknownSession(name.to_string())),
            None => sessions
                .current()
                .cloned()
                .ok_or(CredentialError::NoCurrentSession),
        }
    }

    /// Build a connection target for a session, revealing its password
    pub fn target_for(
        &self,
        session: Option<&str>,
        database: &str,
    ) -> Result<ConnectionTarget, CredentialError> {
        let profile = self.resolve_session(session)?;
        let password = self.credentials.reveal(&profile)?;
        Ok(ConnectionTarget {
            server: profile.server,
            database: database.to_string(),
            username: profile.username,
            password,
            trust_server_certificate: self.settings.query.trust_server_certificate,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::credentials::memory::MemoryVault;

    fn state_in(dir: &tempfile::TempDir) -> AppState {
        let store = CredentialStore::new(
            dir.path().join("sessions.json"),
            Box::new(MemoryVault::default()),
        );
        AppState::new(store, AppSettings::default())
    }

    #[test]
    fn target_uses_current_session_by_default() {
        let dir = tempfile::tempdir().unwrap();
        let state = state_in(&dir);
        state.upsert_session("Prod", "sql01", "sa", "hunter2").unwrap();
        state.upsert_session("Dev", "sql02", "dev", "devpass").unwrap();

        let target = state.target_for(None, "Sales").unwrap();
        assert_eq!(target.server, "sql02");
        assert_eq!(target.password, "devpass");
        assert_eq!(target.database, "Sales");

        let named = state.target_for(Some("Prod"), "master").unwrap();
        assert_eq!(named.username, "sa");
        assert_eq!(named.password, "hunter2");
    }

    #[test]
    fn missing_sessions_are_reported() {
        let dir = tempfile::tempdir().unwrap();
        let state = state_in(&dir);

        assert!(matches!(
            state.target_for(None, "master"),
            Err(CredentialError::NoCurrentSession)
        ));
        assert!(matches!(
            state.target_for(Some("Nope"), "master"),
            Err(CredentialError::UnknownSession(_))
        ));
    }

    #[test]
    fn removing_the_current_session_clears_it() {
        let dir = tempfile::tempdir().unwrap();
        let state = state_in(&dir);
        state.upsert_session("Prod", "sql01", "sa", "pw").unwrap();

        state.remove_session("Prod").unwrap();

        let sessions = state.sessions();
        assert!(sessions.is_empty());
        assert_eq!(sessions.current_session_name, None);
    }
}
