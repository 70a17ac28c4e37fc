//! Device-side effects: the sound actuator, status publishing and haptics.
//!
//! The platform owns the real implementations; the engine only sees these
//! traits. [`SimulatedDevice`] stands in for the platform in the CLI and
//! in tests.

mod simulated;

pub use simulated::{DeviceCall, DeviceSnapshot, SimulatedDevice};

use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};

use crate::catalog::{Zone, ZoneCategory, ZoneId};
use crate::error::ActuatorError;
use crate::storage::Promotion;

/// Which interruption filter silencing applies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SilentStrength {
    /// Priority-only interruptions.
    #[default]
    Priority,
    /// No interruptions at all.
    Total,
}

/// Controls the device's interruption filter.
///
/// Both setters are no-ops when the notification policy permission is
/// missing; callers check [`has_permission`](SoundActuator::has_permission)
/// first to report the reason.
pub trait SoundActuator: Send + Sync {
    /// Whether the app may change the interruption filter.
    fn has_permission(&self) -> bool;

    fn set_silent(&self, strength: SilentStrength) -> Result<(), ActuatorError>;

    fn set_normal(&self) -> Result<(), ActuatorError>;

    /// Live device state. Always false without permission.
    fn is_silent_active(&self) -> bool;
}

/// Snapshot of what the user should be told about the sound state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatusUpdate {
    pub silent: bool,
    pub zone_id: Option<ZoneId>,
    pub zone_name: Option<String>,
    pub category: Option<ZoneCategory>,
    pub promotion: Option<Promotion>,
    /// Set by the user through an override rather than by automation.
    pub manual: bool,
    pub permission_granted: bool,
}

impl StatusUpdate {
    pub fn silenced(zone: &Zone, promotion: Option<Promotion>) -> Self {
        Self {
            silent: true,
            zone_id: Some(zone.id),
            zone_name: Some(zone.display_name().to_string()),
            category: Some(zone.category),
            promotion,
            manual: false,
            permission_granted: true,
        }
    }

    pub fn normal() -> Self {
        Self {
            permission_granted: true,
            ..Self::default()
        }
    }

    pub fn manual(silent: bool) -> Self {
        Self {
            silent,
            manual: true,
            permission_granted: true,
            ..Self::default()
        }
    }

    pub fn permission_missing() -> Self {
        Self::default()
    }
}

/// Publishes the ongoing status notification.
pub trait StatusNotifier: Send + Sync {
    fn publish(&self, update: &StatusUpdate);
}

/// Vibration feedback on zone changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HapticCue {
    Enter,
    Exit,
}

impl HapticCue {
    /// Waveform as alternating off/on durations in milliseconds.
    pub fn pattern(&self) -> &'static [u64] {
        match self {
            HapticCue::Enter => &[0, 200, 100, 200],
            HapticCue::Exit => &[0, 500],
        }
    }
}

pub trait Haptics: Send + Sync {
    fn cue(&self, cue: HapticCue);
}

/// Drops every status update.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullNotifier;

impl StatusNotifier for NullNotifier {
    fn publish(&self, _update: &StatusUpdate) {}
}

/// No vibration motor.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullHaptics;

impl Haptics for NullHaptics {
    fn cue(&self, _cue: HapticCue) {}
}

/// Keeps every published update; the last one is the current status.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    updates: Mutex<Vec<StatusUpdate>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn updates(&self) -> Vec<StatusUpdate> {
        self.updates
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn last(&self) -> Option<StatusUpdate> {
        self.updates
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last()
            .cloned()
    }
}

impl StatusNotifier for RecordingNotifier {
    fn publish(&self, update: &StatusUpdate) {
        self.updates
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(update.clone());
    }
}

/// Keeps every cue in order.
#[derive(Debug, Default)]
pub struct RecordingHaptics {
    cues: Mutex<Vec<HapticCue>>,
}

impl RecordingHaptics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cues(&self) -> Vec<HapticCue> {
        self.cues
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Haptics for RecordingHaptics {
    fn cue(&self, cue: HapticCue) {
        self.cues
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(cue);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn haptic_patterns() {
        assert_eq!(HapticCue::Enter.pattern(), &[0, 200, 100, 200]);
        assert_eq!(HapticCue::Exit.pattern(), &[0, 500]);
    }

    #[test]
    fn silenced_status_carries_zone_details() {
        let zone = Zone {
            id: 3,
            name: Some("Stadsschouwburg".to_string()),
            category: ZoneCategory::Theater,
            lat: 52.0,
            lon: 5.0,
            address: None,
        };
        let update = StatusUpdate::silenced(&zone, None);
        assert!(update.silent);
        assert!(!update.manual);
        assert_eq!(update.zone_name.as_deref(), Some("Stadsschouwburg"));
        assert_eq!(update.category, Some(ZoneCategory::Theater));
    }

    #[test]
    fn permission_missing_status() {
        let update = StatusUpdate::permission_missing();
        assert!(!update.permission_granted);
        assert!(!update.silent);
    }

    #[test]
    fn recording_notifier_keeps_order() {
        let notifier = RecordingNotifier::new();
        notifier.publish(&StatusUpdate::manual(true));
        notifier.publish(&StatusUpdate::normal());
        assert_eq!(notifier.updates().len(), 2);
        assert_eq!(notifier.last(), Some(StatusUpdate::normal()));
    }

    #[test]
    fn strength_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&SilentStrength::Total).unwrap(),
            "\"total\""
        );
        assert_eq!(SilentStrength::default(), SilentStrength::Priority);
    }
}
