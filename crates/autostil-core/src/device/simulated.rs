//! In-process stand-in for the platform sound controls.

use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{SilentStrength, SoundActuator};
use crate::error::{ActuatorError, DatabaseError};
use crate::storage::UserDb;

const KEY_DEVICE: &str = "simulated_device";

/// A call that reached the interruption filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceCall {
    SetSilent(SilentStrength),
    SetNormal,
}

/// Persistable part of the simulated device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceSnapshot {
    pub permission: bool,
    pub silent: Option<SilentStrength>,
    /// Effective calls since the last reset, oldest first.
    #[serde(default)]
    pub calls: Vec<DeviceCall>,
}

impl Default for DeviceSnapshot {
    fn default() -> Self {
        Self {
            permission: true,
            silent: None,
            calls: Vec::new(),
        }
    }
}

/// Simulated interruption filter.
///
/// Records every effective call, and can deny permission or fail calls on
/// demand.
#[derive(Debug, Default)]
pub struct SimulatedDevice {
    inner: Mutex<SimState>,
}

#[derive(Debug, Default)]
struct SimState {
    snapshot: DeviceSnapshot,
    failing: bool,
}

impl SimulatedDevice {
    /// A device with permission granted and sound on.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: DeviceSnapshot) -> Self {
        Self {
            inner: Mutex::new(SimState {
                snapshot,
                ..SimState::default()
            }),
        }
    }

    /// Restore the device saved by [`save`](Self::save), or a fresh one.
    pub fn load(db: &UserDb) -> Result<Self, DatabaseError> {
        let snapshot = match db.kv_get(KEY_DEVICE)? {
            Some(json) => serde_json::from_str(&json)
                .map_err(|e| DatabaseError::QueryFailed(format!("corrupt device state: {e}")))?,
            None => DeviceSnapshot::default(),
        };
        Ok(Self::from_snapshot(snapshot))
    }

    pub fn save(&self, db: &UserDb) -> Result<(), DatabaseError> {
        let json = serde_json::to_string(&self.snapshot())
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;
        db.kv_set(KEY_DEVICE, &json)
    }

    pub fn snapshot(&self) -> DeviceSnapshot {
        self.lock().snapshot.clone()
    }

    pub fn set_permission(&self, granted: bool) {
        self.lock().snapshot.permission = granted;
    }

    /// Make subsequent setter calls fail.
    pub fn set_failing(&self, failing: bool) {
        self.lock().failing = failing;
    }

    /// Change the filter the way the user would from system settings.
    /// Not recorded as a call.
    pub fn set_manual_silent(&self, strength: Option<SilentStrength>) {
        self.lock().snapshot.silent = strength;
    }

    /// Current filter, regardless of permission.
    pub fn silent_strength(&self) -> Option<SilentStrength> {
        self.lock().snapshot.silent
    }

    pub fn calls(&self) -> Vec<DeviceCall> {
        self.lock().snapshot.calls.clone()
    }

    pub fn clear_calls(&self) {
        self.lock().snapshot.calls.clear();
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn apply(&self, call: DeviceCall) -> Result<(), ActuatorError> {
        let mut state = self.lock();
        if !state.snapshot.permission {
            debug!(?call, "no notification policy access, ignoring");
            return Ok(());
        }
        if state.failing {
            return Err(ActuatorError::Failed(format!("{call:?} rejected")));
        }
        state.snapshot.silent = match call {
            DeviceCall::SetSilent(strength) => Some(strength),
            DeviceCall::SetNormal => None,
        };
        state.snapshot.calls.push(call);
        Ok(())
    }
}

impl SoundActuator for SimulatedDevice {
    fn has_permission(&self) -> bool {
        self.lock().snapshot.permission
    }

    fn set_silent(&self, strength: SilentStrength) -> Result<(), ActuatorError> {
        self.apply(DeviceCall::SetSilent(strength))
    }

    fn set_normal(&self) -> Result<(), ActuatorError> {
        self.apply(DeviceCall::SetNormal)
    }

    fn is_silent_active(&self) -> bool {
        let state = self.lock();
        state.snapshot.permission && state.snapshot.silent.is_some()
    }
}
