pub mod insights;
pub mod query;
pub mod sessions;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use plansight_core::db::credentials::KeyringVault;
use plansight_core::db::session_file::CredentialStore;
use plansight_core::paths;
use plansight_core::AppState;

use crate::error::CliError;

/// Resolve the data directory and load settings and saved sessions.
pub fn load_state() -> Result<AppState, CliError> {
    let paths = paths::resolve_paths()?;
    let settings = paths::load_settings(&paths.settings_path);
    let credentials = CredentialStore::new(paths.sessions_path, Box::new(KeyringVault::new()));
    Ok(AppState::new(credentials, settings))
}

/// Flag raised by Ctrl-C, checked by plan analysis between rows.
pub fn cancel_on_interrupt() -> Arc<AtomicBool> {
    let cancelled = Arc::new(AtomicBool::new(false));
    let flag = cancelled.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("Interrupted, stopping plan analysis");
            flag.store(true, Ordering::SeqCst);
        }
    });
    cancelled
}
