//! The reconciled belief about whether the device is inside a zone.
//!
//! [`ResidencyState`] is owned by the reconciler and written through a
//! [`ResidencyStore`] so it survives process death.

use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::catalog::ZoneId;
use crate::error::DatabaseError;

/// User-controlled manual sound mode.
///
/// Anything other than `Auto` suspends automatic reconciliation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverrideMode {
    #[default]
    Auto,
    ForceSound,
    ForceSilent,
}

impl OverrideMode {
    pub fn is_auto(&self) -> bool {
        matches!(self, OverrideMode::Auto)
    }
}

/// Who owns the current sound state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceOfTruth {
    /// The app silenced the device, or is about to.
    App,
    /// Nobody; whatever the device does is the user's business.
    #[default]
    None,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResidencyState {
    pub active: bool,
    pub zone_id: Option<ZoneId>,
    pub source: SourceOfTruth,
    pub updated_at: DateTime<Utc>,
}

impl Default for ResidencyState {
    fn default() -> Self {
        Self::idle(DateTime::<Utc>::UNIX_EPOCH)
    }
}

impl ResidencyState {
    /// Not in a zone, and the app has no claim on the sound state.
    pub fn idle(at: DateTime<Utc>) -> Self {
        Self {
            active: false,
            zone_id: None,
            source: SourceOfTruth::None,
            updated_at: at,
        }
    }

    /// Write-ahead marker persisted before the app touches the sound state.
    pub fn claim(at: DateTime<Utc>) -> Self {
        Self {
            active: false,
            zone_id: None,
            source: SourceOfTruth::App,
            updated_at: at,
        }
    }

    /// Silenced by the app because the device is inside `zone_id`.
    pub fn resident(zone_id: ZoneId, at: DateTime<Utc>) -> Self {
        Self {
            active: true,
            zone_id: Some(zone_id),
            source: SourceOfTruth::App,
            updated_at: at,
        }
    }

    /// An app claim with no recorded outcome: the app may have silenced
    /// the device and then lost track of it.
    pub fn is_orphaned_claim(&self) -> bool {
        !self.active && self.source == SourceOfTruth::App
    }

    /// `zone_id` is set only when active, and active implies an app claim.
    pub fn is_consistent(&self) -> bool {
        if self.active {
            self.zone_id.is_some() && self.source == SourceOfTruth::App
        } else {
            self.zone_id.is_none()
        }
    }

    /// The zone the device is resident in, if any.
    pub fn resident_zone(&self) -> Option<ZoneId> {
        if self.active {
            self.zone_id
        } else {
            None
        }
    }
}

/// Durable home of the residency state.
pub trait ResidencyStore: Send {
    /// Load the last saved state, or the idle default when none exists.
    fn load(&self) -> Result<ResidencyState, DatabaseError>;

    fn save(&mut self, state: &ResidencyState) -> Result<(), DatabaseError>;
}

/// A store shared with other users of the same handle (e.g. the user-data
/// database also serving the ignore list).
impl<S: ResidencyStore> ResidencyStore for Arc<Mutex<S>> {
    fn load(&self) -> Result<ResidencyState, DatabaseError> {
        self.lock().map_err(|_| DatabaseError::Locked)?.load()
    }

    fn save(&mut self, state: &ResidencyState) -> Result<(), DatabaseError> {
        self.lock().map_err(|_| DatabaseError::Locked)?.save(state)
    }
}

/// In-memory store. Clones share the same contents, so a test can keep a
/// handle to inspect writes or inject failures after moving the store
/// into a reconciler.
#[derive(Debug, Clone, Default)]
pub struct MemoryResidencyStore {
    inner: Arc<Mutex<MemoryInner>>,
}

#[derive(Debug, Default)]
struct MemoryInner {
    state: Option<ResidencyState>,
    history: Vec<ResidencyState>,
    fail_saves: bool,
}

impl MemoryResidencyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_state(state: ResidencyState) -> Self {
        let store = Self::new();
        store.lock().state = Some(state);
        store
    }

    /// Make every subsequent `save` fail.
    pub fn fail_saves(&self, fail: bool) {
        self.lock().fail_saves = fail;
    }

    /// Every successfully saved state, oldest first.
    pub fn history(&self) -> Vec<ResidencyState> {
        self.lock().history.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ResidencyStore for MemoryResidencyStore {
    fn load(&self) -> Result<ResidencyState, DatabaseError> {
        Ok(self.lock().state.clone().unwrap_or_default())
    }

    fn save(&mut self, state: &ResidencyState) -> Result<(), DatabaseError> {
        let mut inner = self.lock();
        if inner.fail_saves {
            return Err(DatabaseError::QueryFailed(
                "residency store rejected write".to_string(),
            ));
        }
        inner.state = Some(state.clone());
        inner.history.push(state.clone());
        Ok(())
    }
}
