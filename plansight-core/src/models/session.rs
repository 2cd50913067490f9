use serde::{Deserialize, Serialize};

/// Opaque handle to a secret held by a [`crate::db::credentials::SecretVault`].
/// The cleartext never lives in this value.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProtectedSecret(String);

impl ProtectedSecret {
    pub fn from_handle(handle: impl Into<String>) -> Self {
        ProtectedSecret(handle.into())
    }

    pub fn handle(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Debug for ProtectedSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ProtectedSecret(..)")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionProfile {
    pub name: String,
    pub server: String,
    pub username: String,
    #[serde(default)]
    pub secret: ProtectedSecret,
}

impl Default for ProtectedSecret {
    fn default() -> Self {
        ProtectedSecret(String::new())
    }
}

/// All saved profiles plus the name of the one last used.
///
/// Matches the on-disk layout of the session file:
/// `{ "lastSessionName": ..., "sessions": [...] }`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStore {
    #[serde(default, rename = "lastSessionName")]
    pub current_session_name: Option<String>,
    #[serde(default)]
    pub sessions: Vec<SessionProfile>,
}

impl SessionStore {
    pub fn find_by_name(&self, name: &str) -> Option<&SessionProfile> {
        self.sessions.iter().find(|s| s.name == name)
    }

    pub fn current(&self) -> Option<&SessionProfile> {
        self.current_session_name
            .as_deref()
            .and_then(|name| self.find_by_name(name))
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Clear a current-session pointer that names no stored profile.
    pub(crate) fn repair_current(&mut self) {
        let dangling = match self.current_session_name.as_deref() {
            Some(name) => self.find_by_name(name).is_none(),
            None => false,
        };
        if dangling {
            self.current_session_name = None;
        }
    }
}
