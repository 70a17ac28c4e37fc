//! TOML-based application configuration.
//!
//! Stores user preferences including:
//! - Zone radius, drift buffer and active categories
//! - Loitering delay for geofence dwell transitions
//! - Silent strength (priority-only or total silence)
//! - Manual override mode
//! - Catalog source and timeout
//!
//! Configuration is stored at `~/.config/autostil/config.toml`. The engine
//! only reads it; the CLI writes it.

use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

use serde::{Deserialize, Serialize};

use super::data_dir;
use crate::catalog::ZoneCategory;
use crate::device::SilentStrength;
use crate::error::ConfigError;
use crate::residency::OverrideMode;

/// Zone matching configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZonesConfig {
    /// Effective radius around every zone, in meters.
    #[serde(default = "default_radius_m")]
    pub radius_m: f64,
    /// Extra tolerance for GPS drift, in meters.
    #[serde(default = "default_drift_buffer_m")]
    pub drift_buffer_m: f64,
    #[serde(default = "default_active_categories")]
    pub active_categories: Vec<ZoneCategory>,
    /// 0 registers enter transitions; anything else registers dwell with
    /// this delay.
    #[serde(default)]
    pub loitering_delay_ms: u32,
}

/// Sound actuator configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SoundConfig {
    #[serde(default)]
    pub strength: SilentStrength,
}

/// Remote catalog configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

/// Live tracking configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackingConfig {
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
}

/// Background self-heal worker configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    #[serde(default = "default_period_minutes")]
    pub period_minutes: u64,
}

/// Application configuration.
///
/// Serialized to/from TOML at `~/.config/autostil/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub override_mode: OverrideMode,
    #[serde(default)]
    pub zones: ZonesConfig,
    #[serde(default)]
    pub sound: SoundConfig,
    #[serde(default)]
    pub catalog: CatalogConfig,
    #[serde(default)]
    pub tracking: TrackingConfig,
    #[serde(default)]
    pub worker: WorkerConfig,
}

// Default functions
fn default_radius_m() -> f64 {
    80.0
}
fn default_drift_buffer_m() -> f64 {
    10.0
}
fn default_active_categories() -> Vec<ZoneCategory> {
    vec![ZoneCategory::Church, ZoneCategory::Theater]
}
fn default_base_url() -> String {
    "https://agedeo.github.io/auto-silent".into()
}
fn default_timeout_secs() -> u64 {
    15
}
fn default_interval_ms() -> u64 {
    3000
}
fn default_period_minutes() -> u64 {
    15
}

impl Default for ZonesConfig {
    fn default() -> Self {
        Self {
            radius_m: default_radius_m(),
            drift_buffer_m: default_drift_buffer_m(),
            active_categories: default_active_categories(),
            loitering_delay_ms: 0,
        }
    }
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
        }
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            period_minutes: default_period_minutes(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            override_mode: OverrideMode::Auto,
            zones: ZonesConfig::default(),
            sound: SoundConfig::default(),
            catalog: CatalogConfig::default(),
            tracking: TrackingConfig::default(),
            worker: WorkerConfig::default(),
        }
    }
}

impl Config {
    fn get_json_value_by_path<'a>(
        root: &'a serde_json::Value,
        key: &str,
    ) -> Option<&'a serde_json::Value> {
        if key.is_empty() {
            return None;
        }

        let mut current = root;
        for part in key.split('.') {
            current = current.get(part)?;
        }
        Some(current)
    }

    fn set_json_value_by_path(
        root: &mut serde_json::Value,
        key: &str,
        value: &str,
    ) -> Result<(), ConfigError> {
        let unknown = || ConfigError::UnknownKey(key.to_string());
        let invalid = |message: String| ConfigError::InvalidValue {
            key: key.to_string(),
            message,
        };

        let mut parts = key.split('.').peekable();
        if parts.peek().map_or(true, |p| p.is_empty()) {
            return Err(unknown());
        }

        let mut current = root;
        while let Some(part) = parts.next() {
            let is_leaf = parts.peek().is_none();
            if is_leaf {
                let obj = current.as_object_mut().ok_or_else(unknown)?;
                let existing = obj.get(part).ok_or_else(unknown)?;

                let new_value = match existing {
                    serde_json::Value::Bool(_) => serde_json::Value::Bool(
                        value.parse::<bool>().map_err(|e| invalid(e.to_string()))?,
                    ),
                    serde_json::Value::Number(_) => {
                        if let Ok(n) = value.parse::<u64>() {
                            serde_json::Value::Number(n.into())
                        } else if let Ok(n) = value.parse::<f64>() {
                            serde_json::Number::from_f64(n)
                                .map(serde_json::Value::Number)
                                .ok_or_else(|| invalid(format!("cannot parse '{value}' as number")))?
                        } else {
                            return Err(invalid(format!("cannot parse '{value}' as number")));
                        }
                    }
                    // Lists accept JSON or a plain comma-separated form.
                    serde_json::Value::Array(_) => match serde_json::from_str(value) {
                        Ok(v @ serde_json::Value::Array(_)) => v,
                        _ => serde_json::Value::Array(
                            value
                                .split(',')
                                .map(str::trim)
                                .filter(|s| !s.is_empty())
                                .map(|s| serde_json::Value::String(s.to_string()))
                                .collect(),
                        ),
                    },
                    serde_json::Value::Object(_) => {
                        serde_json::from_str(value).map_err(|e| invalid(e.to_string()))?
                    }
                    _ => serde_json::Value::String(value.into()),
                };

                obj.insert(part.to_string(), new_value);
                return Ok(());
            }

            current = current.get_mut(part).ok_or_else(unknown)?;
        }

        Err(unknown())
    }

    /// Default location of the config file.
    pub fn path() -> Result<PathBuf, ConfigError> {
        Ok(data_dir()?.join("config.toml"))
    }

    /// Load from the default location, writing defaults when missing.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed,
    /// or if the default config cannot be written to disk.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::path()?)
    }

    /// Load from `path`, writing defaults when the file does not exist.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(|e| ConfigError::LoadFailed {
                path: path.to_path_buf(),
                message: e.to_string(),
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let cfg = Self::default();
                cfg.save_to(path)?;
                Ok(cfg)
            }
            Err(e) => Err(ConfigError::LoadFailed {
                path: path.to_path_buf(),
                message: e.to_string(),
            }),
        }
    }

    /// Persist to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let save_failed = |message: String| ConfigError::SaveFailed {
            path: path.to_path_buf(),
            message,
        };
        let content = toml::to_string_pretty(self).map_err(|e| save_failed(e.to_string()))?;
        std::fs::write(path, content).map_err(|e| save_failed(e.to_string()))
    }

    /// Get a config value as string by dot-separated key.
    pub fn get(&self, key: &str) -> Option<String> {
        let json = serde_json::to_value(self).ok()?;
        let val = Self::get_json_value_by_path(&json, key)?;
        match val {
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Set a value by dot-separated key without saving.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is unknown or the value does not fit the
    /// field (including unknown categories or modes).
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let mut json = serde_json::to_value(&*self).map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        Self::set_json_value_by_path(&mut json, key, value)?;
        let updated: Config =
            serde_json::from_value(json).map_err(|e| ConfigError::InvalidValue {
                key: key.to_string(),
                message: e.to_string(),
            })?;
        updated.validate()?;
        *self = updated;
        Ok(())
    }

    /// Reject values the engine cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let check = |key: &str, ok: bool, message: &str| {
            if ok {
                Ok(())
            } else {
                Err(ConfigError::InvalidValue {
                    key: key.to_string(),
                    message: message.to_string(),
                })
            }
        };
        check(
            "zones.radius_m",
            self.zones.radius_m.is_finite() && self.zones.radius_m > 0.0,
            "must be a positive number of meters",
        )?;
        check(
            "zones.drift_buffer_m",
            self.zones.drift_buffer_m.is_finite() && self.zones.drift_buffer_m >= 0.0,
            "must not be negative",
        )?;
        check(
            "catalog.timeout_secs",
            self.catalog.timeout_secs > 0,
            "must be at least one second",
        )?;
        Ok(())
    }
}

/// Read access to the current settings.
///
/// The engine takes a fresh snapshot at the start of every pass, so a
/// setting changed between passes applies from the next one on.
pub trait SettingsSource: Send + Sync {
    fn current(&self) -> Config;
}

impl SettingsSource for Config {
    fn current(&self) -> Config {
        self.clone()
    }
}

impl SettingsSource for RwLock<Config> {
    fn current(&self) -> Config {
        self.read().unwrap_or_else(PoisonError::into_inner).clone()
    }
}
