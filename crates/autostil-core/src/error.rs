//! Core error types for autostil-core.
//!
//! Every failure in the engine degrades to "leave state as-is and retry on
//! the next trigger"; these types describe what went wrong so callers can
//! log it or surface a status flag. None of them is fatal.

use std::path::PathBuf;
use thiserror::Error;

/// Core error type for autostil-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Zone catalog refresh errors
    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    /// Position fix could not be obtained
    #[error("Position error: {0}")]
    Position(#[from] PositionError),

    /// Sound actuator errors
    #[error("Actuator error: {0}")]
    Actuator(#[from] ActuatorError),

    /// Geofence registration errors
    #[error("Geofence error: {0}")]
    Geofence(#[from] GeofenceError),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Database-specific errors.
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// Failed to open database connection
    #[error("Failed to open database at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// Query execution failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Migration failed
    #[error("Database migration failed: {0}")]
    MigrationFailed(String),

    /// Database is locked
    #[error("Database is locked")]
    Locked,
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Unknown dot-path key
    #[error("Unknown configuration key: {0}")]
    UnknownKey(String),

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Data directory could not be determined or created
    #[error("Data directory unavailable: {0}")]
    DataDir(String),
}

/// Errors raised while refreshing the zone catalog from its remote source.
#[derive(Error, Debug)]
pub enum CatalogError {
    /// Transport-level failure (DNS, TLS, connection reset, timeout)
    #[error("Request to {url} failed: {source}")]
    Fetch {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The HTTP client could not be built
    #[error("HTTP client setup failed: {0}")]
    Client(#[source] reqwest::Error),

    /// Non-success HTTP status
    #[error("{url} answered with HTTP {status}")]
    Status { url: String, status: u16 },

    /// Metadata document could not be decoded
    #[error("Malformed catalog metadata: {0}")]
    Parse(String),

    /// Metadata lists no downloadable region
    #[error("Catalog metadata lists no regions")]
    NoRegion,

    /// Invalid base url
    #[error("Invalid catalog url: {0}")]
    Url(#[from] url::ParseError),

    /// The downloaded file is not a usable catalog
    #[error("Downloaded catalog snapshot is invalid: {0}")]
    InvalidSnapshot(String),

    /// Writing the snapshot failed
    #[error("Failed to write catalog snapshot: {0}")]
    Io(#[from] std::io::Error),

    /// Bookkeeping in the local store failed
    #[error("Failed to record catalog version: {0}")]
    Store(#[from] DatabaseError),
}

/// Position fix failures. Treated as "unknown", never as "no zone".
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PositionError {
    /// The provider returned no fix
    #[error("No position fix available")]
    Unavailable,

    /// Location permission is missing
    #[error("Location permission denied")]
    PermissionDenied,

    /// Provider-specific failure
    #[error("Position provider failed: {0}")]
    Provider(String),
}

/// Sound actuator failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ActuatorError {
    /// Notification-policy access has not been granted
    #[error("Notification policy access not granted")]
    PermissionDenied,

    /// The platform rejected the interruption-filter change
    #[error("Interruption filter change failed: {0}")]
    Failed(String),
}

/// OS geofence registration failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GeofenceError {
    /// Background location permission is missing
    #[error("Geofence registration not permitted")]
    PermissionDenied,

    /// Too many fences in one request
    #[error("Geofence limit exceeded: {count} > {limit}")]
    LimitExceeded { count: usize, limit: usize },

    /// Platform-specific failure
    #[error("Geofence registration failed: {0}")]
    Failed(String),
}

/// Validation errors.
#[derive(Error, Debug)]
pub enum ValidationError {
    /// Coordinates out of WGS84 range
    #[error("Invalid coordinates: lat {lat}, lon {lon}")]
    InvalidCoordinates { lat: f64, lon: f64 },

    /// Unknown zone category
    #[error("Unknown zone category: {0}")]
    UnknownCategory(String),

    /// Invalid value
    #[error("Invalid value for '{field}': {message}")]
    InvalidValue { field: String, message: String },
}

impl From<rusqlite::Error> for DatabaseError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(e, _msg) => {
                if e.code == rusqlite::ErrorCode::DatabaseLocked
                    || e.code == rusqlite::ErrorCode::DatabaseBusy
                {
                    DatabaseError::Locked
                } else {
                    DatabaseError::QueryFailed(err.to_string())
                }
            }
            _ => DatabaseError::QueryFailed(err.to_string()),
        }
    }
}

impl From<rusqlite::Error> for CoreError {
    fn from(err: rusqlite::Error) -> Self {
        CoreError::Database(err.into())
    }
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locked_sqlite_maps_to_locked() {
        let err = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
            None,
        );
        assert!(matches!(DatabaseError::from(err), DatabaseError::Locked));
    }

    #[test]
    fn other_sqlite_errors_map_to_query_failed() {
        let err = rusqlite::Error::QueryReturnedNoRows;
        assert!(matches!(
            DatabaseError::from(err),
            DatabaseError::QueryFailed(_)
        ));
    }

    #[test]
    fn core_error_wraps_position_error() {
        let err: CoreError = PositionError::Unavailable.into();
        assert_eq!(err.to_string(), "Position error: No position fix available");
    }
}
