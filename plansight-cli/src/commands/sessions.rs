use plansight_core::AppState;

use crate::error::CliError;

pub fn list(state: &AppState) -> Result<(), CliError> {
    let store = state.sessions();
    if store.is_empty() {
        println!("No saved sessions.");
        return Ok(());
    }

    let current = store.current_session_name.as_deref();
    for session in &store.sessions {
        let marker = if Some(session.name.as_str()) == current { "*" } else { " " };
        println!(
            "{} {:<24} {:<32} {}",
            marker, session.name, session.server, session.username
        );
    }
    Ok(())
}

pub fn save(
    state: &AppState,
    name: &str,
    server: &str,
    username: &str,
    password: &str,
) -> Result<(), CliError> {
    state.upsert_session(name, server, username, password)?;
    println!("Saved session {}", name);
    Ok(())
}

pub fn remove(state: &AppState, name: &str) -> Result<(), CliError> {
    if state.sessions().find_by_name(name).is_none() {
        println!("No session named {}", name);
        return Ok(());
    }
    state.remove_session(name)?;
    println!("Removed session {}", name);
    Ok(())
}
