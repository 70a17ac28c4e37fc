//! # AutoStil Core Library
//!
//! This library provides the engine behind AutoStil, which silences the
//! device near places of worship, theaters, libraries and similar venues and
//! restores sound when the user leaves. It follows a CLI-first philosophy:
//! every operation is available through the standalone `autostil` binary,
//! with the platform layer (geofencing, location, interruption filter) plugged
//! in through traits.
//!
//! ## Architecture
//!
//! - **Catalog**: SQLite snapshot of candidate zones, refreshed from a remote
//!   source
//! - **Reconciler**: the single authority over the residency state and the
//!   sound actuator; geofence callbacks, the self-heal worker and the live
//!   tracker all feed it
//! - **Storage**: TOML configuration and a SQLite store for user data (ignore
//!   list, promotions, residency)
//! - **Device**: traits for the sound actuator, status notification and
//!   haptics, with a simulated device for the CLI and tests
//!
//! ## Key Components
//!
//! - [`Reconciler`]: zone-residency reconciliation
//! - [`Automation`]: wiring of all trigger entry points
//! - [`CatalogDb`]: zone catalog queries
//! - [`Config`]: application configuration management

pub mod automation;
pub mod catalog;
pub mod device;
pub mod error;
pub mod geo;
pub mod geofence;
pub mod position;
pub mod proximity;
pub mod reconciler;
pub mod residency;
pub mod storage;
pub mod tracking;

pub use automation::{Automation, AutomationStatus, EventOutcome, WorkOutcome};
pub use catalog::{CatalogDb, CatalogUpdater, RefreshOutcome, Zone, ZoneCategory, ZoneId};
pub use device::{
    HapticCue, Haptics, SilentStrength, SimulatedDevice, SoundActuator, StatusNotifier,
    StatusUpdate,
};
pub use error::{
    ActuatorError, CatalogError, ConfigError, CoreError, DatabaseError, GeofenceError,
    PositionError, ValidationError,
};
pub use geo::Position;
pub use geofence::{GeofenceEvent, GeofencePlanner, GeofenceRegistrar, GeofenceSpec, TransitionKind};
pub use position::{FixedPosition, PositionSource, ScriptedPositions};
pub use reconciler::{Outcome, ProposedZone, Reconciler, Trigger, TriggerSource};
pub use residency::{OverrideMode, ResidencyState, ResidencyStore, SourceOfTruth};
pub use storage::{Config, UserDb};
pub use tracking::{LiveTracker, TrackerStats};
