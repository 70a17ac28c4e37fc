mod config;
pub mod database;
pub mod migrations;

pub use config::{
    CatalogConfig, Config, SettingsSource, SoundConfig, TrackingConfig, WorkerConfig, ZonesConfig,
};
pub use database::{Promotion, UserDb, USER_DB_FILE};

use std::path::PathBuf;

use crate::error::ConfigError;

/// Returns the directory holding config and databases.
///
/// `AUTOSTIL_HOME` wins when set. Otherwise `~/.config/autostil[-dev]/`,
/// where `AUTOSTIL_ENV=dev` selects the development directory.
///
/// # Errors
/// Returns an error if creating the directory fails.
pub fn data_dir() -> Result<PathBuf, ConfigError> {
    let dir = match std::env::var_os("AUTOSTIL_HOME") {
        Some(home) => PathBuf::from(home),
        None => {
            let base_dir = dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".config");

            let env = std::env::var("AUTOSTIL_ENV").unwrap_or_else(|_| "production".to_string());
            if env == "dev" {
                base_dir.join("autostil-dev")
            } else {
                base_dir.join("autostil")
            }
        }
    };

    std::fs::create_dir_all(&dir)
        .map_err(|e| ConfigError::DataDir(format!("{}: {e}", dir.display())))?;
    Ok(dir)
}
