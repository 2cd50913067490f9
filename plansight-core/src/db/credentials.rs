use keyring::Entry;
use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::CredentialError;
use crate::models::ProtectedSecret;

const SERVICE_NAME: &str = "com.plansight.client";
const CREDENTIALS_KEY: &str = "session-secrets";
const HANDLE_PREFIX: &str = "keyring:";

/// Turns cleartext passwords into opaque handles and back.
///
/// Only the handle is ever written to the session file.
pub trait SecretVault: Send + Sync {
    fn protect(&self, cleartext: &str) -> Result<ProtectedSecret, CredentialError>;

    fn reveal(&self, secret: &ProtectedSecret) -> Result<String, CredentialError>;

    /// Release a handle that is no longer referenced.
    fn forget(&self, secret: &ProtectedSecret) -> Result<(), CredentialError>;
}

/// Secrets kept in a single OS keychain entry as a JSON map of handle to password.
///
/// The map is read from the keychain once and cached; every change writes the full map back.
pub struct KeyringVault {
    cache: Mutex<Option<HashMap<String, String>>>,
}

impl KeyringVault {
    pub fn new() -> Self {
        KeyringVault {
            cache: Mutex::new(None),
        }
    }

    fn with_secrets<T>(
        &self,
        f: impl FnOnce(&mut HashMap<String, String>) -> Result<T, CredentialError>,
    ) -> Result<T, CredentialError> {
        let mut guard = self
            .cache
            .lock()
            .map_err(|e| CredentialError::Vault(e.to_string()))?;
        if guard.is_none() {
            *guard = Some(load_all_secrets()?);
        }
        match guard.as_mut() {
            Some(secrets) => f(secrets),
            None => Err(CredentialError::Vault("secret cache unavailable".to_string())),
        }
    }
}

impl Default for KeyringVault {
    fn default() -> Self {
        Self::new()
    }
}

impl SecretVault for KeyringVault {
    fn protect(&self, cleartext: &str) -> Result<ProtectedSecret, CredentialError> {
        let handle = format!("{}{}", HANDLE_PREFIX, uuid::Uuid::new_v4());
        self.with_secrets(|secrets| {
            secrets.insert(handle.clone(), cleartext.to_string());
            save_all_secrets(secrets)
        })?;
        Ok(ProtectedSecret::from_handle(handle))
    }

    fn reveal(&self, secret: &ProtectedSecret) -> Result<String, CredentialError> {
        self.with_secrets(|secrets| {
            secrets
                .get(secret.handle())
                .cloned()
                .ok_or_else(|| CredentialError::UnknownSecret(secret.handle().to_string()))
        })
    }

    fn forget(&self, secret: &ProtectedSecret) -> Result<(), CredentialError> {
        self.with_secrets(|secrets| {
            if secrets.remove(secret.handle()).is_some() {
                save_all_secrets(secrets)
            } else {
                Ok(())
            }
        })
    }
}

fn get_credentials_entry() -> Result<Entry, CredentialError> {
    Entry::new(SERVICE_NAME, CREDENTIALS_KEY)
        .map_err(|e| CredentialError::Vault(format!("Failed to create keyring entry: {}", e)))
}

fn load_all_secrets() -> Result<HashMap<String, String>, CredentialError> {
    let entry = get_credentials_entry()?;

    match entry.get_password() {
        Ok(json) => serde_json::from_str(&json)
            .map_err(|e| CredentialError::Vault(format!("Failed to parse stored secrets: {}", e))),
        Err(keyring::Error::NoEntry) => Ok(HashMap::new()),
        Err(e) => Err(CredentialError::Vault(format!(
            "Failed to retrieve stored secrets: {}",
            e
        ))),
    }
}

fn save_all_secrets(secrets: &HashMap<String, String>) -> Result<(), CredentialError> {
    let entry = get_credentials_entry()?;

    if secrets.is_empty() {
        // Delete the entry if no secrets remain
        match entry.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(CredentialError::Vault(format!(
                "Failed to delete stored secrets: {}",
                e
            ))),
        }
    } else {
        let json = serde_json::to_string(secrets)?;
        entry
            .set_password(&json)
            .map_err(|e| CredentialError::Vault(format!("Failed to store secrets: {}", e)))
    }
}
