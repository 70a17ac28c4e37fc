//! Zone-residency reconciliation.
//!
//! The [`Reconciler`] is the only writer of [`ResidencyState`] and the only
//! caller of the sound actuator. Geofence callbacks, the self-heal worker
//! and the live tracker all funnel through [`Reconciler::reconcile`].
//!
//! Passes are serialized by a mutex around the state and its store. The
//! decision and the actuator calls run under that lock; position fetches
//! and catalog I/O happen before a pass starts.

mod trigger;

pub use trigger::{Outcome, ProposedZone, Trigger, TriggerSource};

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::catalog::ZoneId;
use crate::device::{
    HapticCue, Haptics, NullHaptics, NullNotifier, SilentStrength, SoundActuator, StatusNotifier,
    StatusUpdate,
};
use crate::error::DatabaseError;
use crate::residency::{OverrideMode, ResidencyState, ResidencyStore};
use crate::storage::SettingsSource;

struct Inner {
    state: ResidencyState,
    store: Box<dyn ResidencyStore>,
}

impl Inner {
    /// Write through to the store; the in-memory copy only follows a
    /// successful save.
    fn persist(&mut self, state: ResidencyState) -> Result<(), DatabaseError> {
        self.store.save(&state)?;
        self.state = state;
        Ok(())
    }
}

/// How a deactivation treats the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Restore {
    /// Call `set_normal`.
    Sound,
    /// Only clear the state; the device is already normal.
    StateOnly,
}

pub struct Reconciler {
    inner: Mutex<Inner>,
    actuator: Arc<dyn SoundActuator>,
    notifier: Arc<dyn StatusNotifier>,
    haptics: Arc<dyn Haptics>,
    settings: Arc<dyn SettingsSource>,
}

impl Reconciler {
    /// Create a reconciler, loading the last persisted state from `store`.
    pub fn new(
        store: impl ResidencyStore + 'static,
        actuator: Arc<dyn SoundActuator>,
        settings: Arc<dyn SettingsSource>,
    ) -> Result<Self, DatabaseError> {
        let state = store.load()?;
        if !state.is_consistent() {
            warn!(?state, "persisted residency state is inconsistent");
        }
        debug!(?state, "residency state loaded");
        Ok(Self {
            inner: Mutex::new(Inner {
                state,
                store: Box::new(store),
            }),
            actuator,
            notifier: Arc::new(NullNotifier),
            haptics: Arc::new(NullHaptics),
            settings,
        })
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn StatusNotifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_haptics(mut self, haptics: Arc<dyn Haptics>) -> Self {
        self.haptics = haptics;
        self
    }

    /// Current residency state.
    pub fn state(&self) -> ResidencyState {
        self.lock().state.clone()
    }

    /// Whether the actuator currently reports silence.
    pub fn device_silent(&self) -> bool {
        self.actuator.is_silent_active()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run one reconciliation pass.
    pub fn reconcile(&self, trigger: Trigger) -> Outcome {
        let config = self.settings.current();
        let mut inner = self.lock();

        if !config.override_mode.is_auto() {
            debug!(mode = ?config.override_mode, source = ?trigger.source, "override active, pass suppressed");
            return Outcome::Suppressed;
        }

        if trigger.observed_at < inner.state.updated_at {
            debug!(
                observed_at = %trigger.observed_at,
                updated_at = %inner.state.updated_at,
                "observation predates last decision, pass discarded"
            );
            return Outcome::Stale;
        }

        let strength = config.sound.strength;
        match trigger.source {
            TriggerSource::SelfHeal => self.heal(&mut inner, trigger, strength),
            TriggerSource::Geofence { .. } | TriggerSource::Live => {
                self.decide(&mut inner, trigger, strength)
            }
        }
    }

    /// The rule shared by every source.
    fn decide(&self, inner: &mut Inner, trigger: Trigger, strength: SilentStrength) -> Outcome {
        let at = trigger.observed_at;
        let current = inner.state.resident_zone();
        match trigger.proposal {
            Some(proposal) if current != Some(proposal.zone.id) => {
                self.activate(inner, proposal, strength, at, true)
            }
            None if current.is_some() => self.deactivate(inner, Restore::Sound, at, true),
            _ => {
                debug!(source = ?trigger.source, zone_id = ?current, "residency unchanged");
                Outcome::Unchanged
            }
        }
    }

    /// Self-heal compares against the live device state as well.
    ///
    /// Without permission the live device state cannot be read, so nothing
    /// is decided and the app's claim stays on record.
    fn heal(&self, inner: &mut Inner, trigger: Trigger, strength: SilentStrength) -> Outcome {
        if !self.actuator.has_permission() {
            warn!("notification policy access missing, self-heal deferred");
            return self.permission_denied();
        }
        let at = trigger.observed_at;
        let silent = self.actuator.is_silent_active();
        let current = inner.state.resident_zone();

        match trigger.proposal {
            Some(proposal) => {
                let same_zone = current == Some(proposal.zone.id);
                if !silent {
                    if same_zone {
                        info!(zone_id = proposal.zone.id, "device lost silence inside zone, restoring");
                    }
                    self.activate(inner, proposal, strength, at, !same_zone)
                } else if same_zone {
                    debug!(zone_id = proposal.zone.id, "self-heal: state and device agree");
                    Outcome::Unchanged
                } else {
                    self.activate(inner, proposal, strength, at, true)
                }
            }
            None if inner.state.active => {
                // Only touch the device if it is actually silent.
                let restore = if silent { Restore::Sound } else { Restore::StateOnly };
                self.deactivate(inner, restore, at, true)
            }
            None if inner.state.is_orphaned_claim() => {
                if silent {
                    info!("orphaned silence found, restoring sound");
                    self.deactivate(inner, Restore::Sound, at, false)
                } else {
                    debug!("clearing orphaned claim");
                    self.deactivate(inner, Restore::StateOnly, at, false)
                }
            }
            None => {
                debug!(device_silent = silent, "self-heal: nothing owned by the app");
                Outcome::Unchanged
            }
        }
    }

    fn permission_denied(&self) -> Outcome {
        self.notifier.publish(&StatusUpdate::permission_missing());
        Outcome::PermissionDenied
    }

    fn activate(
        &self,
        inner: &mut Inner,
        proposal: ProposedZone,
        strength: SilentStrength,
        at: DateTime<Utc>,
        cue: bool,
    ) -> Outcome {
        if !self.actuator.has_permission() {
            warn!("notification policy access missing, cannot silence");
            return self.permission_denied();
        }

        let zone_id = proposal.zone.id;
        let previous = inner.state.clone();

        // Write-ahead: record the claim before touching the device.
        let claimed = !previous.active;
        if claimed {
            if let Err(e) = inner.persist(ResidencyState::claim(at)) {
                warn!(error = %e, zone_id, "could not persist claim, device left alone");
                return Outcome::StoreFailed {
                    reason: e.to_string(),
                };
            }
        }

        if let Err(e) = self.actuator.set_silent(strength) {
            warn!(error = %e, zone_id, "failed to silence device");
            if claimed {
                if let Err(e) = inner.persist(previous) {
                    warn!(error = %e, "could not roll back claim");
                }
            }
            return Outcome::ActuatorFailed {
                reason: e.to_string(),
            };
        }

        if let Err(e) = inner.persist(ResidencyState::resident(zone_id, at)) {
            // The device is silent and the claim is on record; the next
            // self-heal pass reconciles.
            warn!(error = %e, zone_id, "device silenced but residency not recorded");
            return Outcome::StoreFailed {
                reason: e.to_string(),
            };
        }

        info!(
            zone_id,
            zone = proposal.zone.display_name(),
            category = %proposal.zone.category,
            ?strength,
            "silenced"
        );
        self.notifier
            .publish(&StatusUpdate::silenced(&proposal.zone, proposal.promotion));
        if cue {
            self.haptics.cue(HapticCue::Enter);
        }
        Outcome::Activated { zone_id }
    }

    fn deactivate(&self, inner: &mut Inner, restore: Restore, at: DateTime<Utc>, cue: bool) -> Outcome {
        let zone_id = inner.state.zone_id;

        if restore == Restore::Sound {
            if !self.actuator.has_permission() {
                warn!("notification policy access missing, cannot restore sound");
                return self.permission_denied();
            }
            if let Err(e) = self.actuator.set_normal() {
                warn!(error = %e, ?zone_id, "failed to restore sound");
                return Outcome::ActuatorFailed {
                    reason: e.to_string(),
                };
            }
        }

        if let Err(e) = inner.persist(ResidencyState::idle(at)) {
            warn!(error = %e, ?zone_id, "could not record residency end");
            return Outcome::StoreFailed {
                reason: e.to_string(),
            };
        }

        info!(?zone_id, ?restore, "residency ended");
        self.notifier.publish(&StatusUpdate::normal());
        if cue {
            self.haptics.cue(HapticCue::Exit);
        }
        Outcome::Deactivated { zone_id }
    }

    /// Apply a user override to the device.
    ///
    /// The override mode itself lives in the settings; callers store it
    /// before calling this. Leaving `Auto` hands the sound state to the
    /// user, so the residency is cleared and the next automatic pass
    /// starts from scratch.
    pub fn apply_override(&self, mode: OverrideMode) -> Outcome {
        let mut inner = self.lock();
        let now = Utc::now();

        let silent = match mode {
            OverrideMode::Auto => {
                let update = match inner.state.resident_zone() {
                    Some(_) => StatusUpdate {
                        silent: true,
                        zone_id: inner.state.zone_id,
                        permission_granted: self.actuator.has_permission(),
                        ..StatusUpdate::default()
                    },
                    None => StatusUpdate {
                        silent: self.actuator.is_silent_active(),
                        permission_granted: self.actuator.has_permission(),
                        ..StatusUpdate::default()
                    },
                };
                self.notifier.publish(&update);
                info!("automatic mode restored");
                return Outcome::Unchanged;
            }
            OverrideMode::ForceSound => false,
            OverrideMode::ForceSilent => true,
        };

        if !self.actuator.has_permission() {
            warn!(?mode, "notification policy access missing, override not applied");
            return self.permission_denied();
        }

        let result = if silent {
            self.actuator
                .set_silent(self.settings.current().sound.strength)
        } else {
            self.actuator.set_normal()
        };
        if let Err(e) = result {
            warn!(error = %e, ?mode, "failed to apply override");
            return Outcome::ActuatorFailed {
                reason: e.to_string(),
            };
        }

        if let Err(e) = inner.persist(ResidencyState::idle(now)) {
            warn!(error = %e, "could not clear residency for override");
            return Outcome::StoreFailed {
                reason: e.to_string(),
            };
        }

        info!(?mode, "override applied");
        self.notifier.publish(&StatusUpdate::manual(silent));
        Outcome::Manual { silent }
    }

    /// Drop residency in `zone_id` after the user ignored it.
    pub fn forget_zone(&self, zone_id: ZoneId) -> Outcome {
        let mut inner = self.lock();
        if inner.state.resident_zone() != Some(zone_id) {
            return Outcome::Unchanged;
        }
        if !self.actuator.has_permission() {
            warn!(zone_id, "notification policy access missing, residency kept");
            return self.permission_denied();
        }
        let restore = if self.actuator.is_silent_active() {
            Restore::Sound
        } else {
            Restore::StateOnly
        };
        self.deactivate(&mut inner, restore, Utc::now(), false)
    }
}
