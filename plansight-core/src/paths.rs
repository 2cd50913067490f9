use std::path::{Path, PathBuf};

use directories::ProjectDirs;

use crate::error::ConfigError;
use crate::models::AppSettings;

pub const DATA_DIR_ENV: &str = "PLANSIGHT_DATA_DIR";

#[derive(Debug, Clone)]
pub struct DataPaths {
    pub data_dir: PathBuf,
    pub sessions_path: PathBuf,
    pub settings_path: PathBuf,
}

impl DataPaths {
    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        let data_dir = dir.into();
        DataPaths {
            sessions_path: data_dir.join("sessions.json"),
            settings_path: data_dir.join("settings.json"),
            data_dir,
        }
    }
}

/// Resolve and create the per-user data directory, honoring `PLANSIGHT_DATA_DIR`.
pub fn resolve_paths() -> Result<DataPaths, ConfigError> {
    if let Ok(value) = std::env::var(DATA_DIR_ENV) {
        let trimmed = value.trim();
        if !trimmed.is_empty() {
            let dir = PathBuf::from(trimmed);
            std::fs::create_dir_all(&dir)?;
            return Ok(DataPaths::in_dir(dir));
        }
    }

    let project_dirs =
        ProjectDirs::from("com", "plansight", "Plansight").ok_or(ConfigError::NoDataDir)?;
    let dir = project_dirs.data_local_dir().to_path_buf();
    std::fs::create_dir_all(&dir)?;

    Ok(DataPaths::in_dir(dir))
}

/// Load settings, falling back to defaults when the file is missing or malformed.
pub fn load_settings(path: &Path) -> AppSettings {
    let data = std::fs::read_to_string(path).unwrap_or_default();
    if data.trim().is_empty() {
        return AppSettings::default();
    }
    match serde_json::from_str(&data) {
        Ok(settings) => settings,
        Err(e) => {
            log::warn!("Ignoring malformed settings file {}: {}", path.display(), e);
            AppSettings::default()
        }
    }
}

pub fn save_settings(path: &Path, settings: &AppSettings) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let data = serde_json::to_string_pretty(settings)?;
    std::fs::write(path, data)?;
    Ok(())
}
