//! Wiring of catalog, user data, settings and the reconciler into the
//! entry points the platform calls.
//!
//! Every trigger gathers its inputs (position, candidates, promotions)
//! without holding the reconciler lock, then hands a [`Trigger`] to the
//! [`Reconciler`].

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::catalog::{CatalogDb, CatalogUpdater, RefreshOutcome, ZoneCategory, ZoneId};
use crate::device::{Haptics, SoundActuator, StatusNotifier};
use crate::error::{CoreError, Result};
use crate::geo::Position;
use crate::geofence::{
    GeofenceEvent, GeofencePlanner, GeofenceRegistrar, GeofenceSignal, TransitionKind,
};
use crate::position::PositionSource;
use crate::proximity::{
    self, ZoneMatch, LIVE_WINDOW_DEG, SAFE_ZONE_RADIUS_M, SAFE_ZONE_WINDOW_DEG, WIDE_WINDOW_DEG,
};
use crate::reconciler::{Outcome, ProposedZone, Reconciler, Trigger};
use crate::residency::{OverrideMode, ResidencyState};
use crate::storage::{Config, SettingsSource, UserDb};

/// Result of a background work run, in the platform scheduler's terms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkOutcome {
    Success,
    /// Try again later; nothing was changed.
    Retry,
    /// Automation is overridden by the user.
    Skipped,
}

/// What handling a geofence event led to.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum EventOutcome {
    Reconciled { outcome: Outcome },
    /// The update fence was left and fences were re-planned.
    Replanned { fences: usize },
    Ignored { reason: String },
}

/// Summary for status displays.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AutomationStatus {
    pub override_mode: OverrideMode,
    pub residency: ResidencyState,
    pub device_silent: bool,
    pub catalog_zones: u64,
    pub catalog_timestamp: i64,
    pub ignored_zones: usize,
}

pub struct Automation {
    catalog: Mutex<CatalogDb>,
    user_db: Arc<Mutex<UserDb>>,
    settings: Arc<RwLock<Config>>,
    config_path: Option<PathBuf>,
    reconciler: Reconciler,
    registrar: Arc<dyn GeofenceRegistrar>,
    positions: Arc<dyn PositionSource>,
    updater: Option<CatalogUpdater>,
}

impl Automation {
    /// Assemble the service. The residency state is restored from `user_db`.
    pub fn new(
        catalog: CatalogDb,
        user_db: UserDb,
        config: Config,
        actuator: Arc<dyn SoundActuator>,
        registrar: Arc<dyn GeofenceRegistrar>,
        positions: Arc<dyn PositionSource>,
    ) -> Result<Self> {
        config.validate()?;
        let user_db = Arc::new(Mutex::new(user_db));
        let settings = Arc::new(RwLock::new(config));
        let reconciler = Reconciler::new(user_db.clone(), actuator, settings.clone())?;
        Ok(Self {
            catalog: Mutex::new(catalog),
            user_db,
            settings,
            config_path: None,
            reconciler,
            registrar,
            positions,
            updater: None,
        })
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn StatusNotifier>) -> Self {
        self.reconciler = self.reconciler.with_notifier(notifier);
        self
    }

    pub fn with_haptics(mut self, haptics: Arc<dyn Haptics>) -> Self {
        self.reconciler = self.reconciler.with_haptics(haptics);
        self
    }

    /// Enable catalog refreshes. The updater must write the snapshot the
    /// catalog was opened from.
    pub fn with_updater(mut self, updater: CatalogUpdater) -> Self {
        self.updater = Some(updater);
        self
    }

    /// Persist settings changes (override mode) to `path`.
    pub fn with_config_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_path = Some(path.into());
        self
    }

    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    pub fn settings(&self) -> Config {
        self.settings.current()
    }

    pub fn override_mode(&self) -> OverrideMode {
        self.settings.current().override_mode
    }

    pub fn positions(&self) -> Arc<dyn PositionSource> {
        self.positions.clone()
    }

    fn catalog(&self) -> MutexGuard<'_, CatalogDb> {
        self.catalog.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn user_db(&self) -> MutexGuard<'_, UserDb> {
        self.user_db.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The nearest eligible zone around `position`, with its promotion.
    fn propose(&self, position: &Position, window_deg: f64) -> Result<Option<ProposedZone>> {
        let config = self.settings.current();
        let ignored = self.user_db().ignored_ids()?;
        let candidates = proximity::candidates(
            &self.catalog(),
            &ignored,
            &config.zones.active_categories,
            position,
            window_deg,
        )?;

        let Some(found) = proximity::nearest_zone(
            position,
            &candidates,
            config.zones.radius_m,
            config.zones.drift_buffer_m,
        ) else {
            return Ok(None);
        };

        debug!(
            zone_id = found.zone.id,
            distance_m = found.distance_m,
            "nearest qualifying zone"
        );
        let promotion = self.user_db().promotion(found.zone.id)?;
        Ok(Some(ProposedZone::new(found.zone).with_promotion(promotion)))
    }

    // ── Triggers ─────────────────────────────────────────────────────

    /// Handle a platform geofence transition.
    pub fn on_geofence_event(&self, event: &GeofenceEvent) -> Result<EventOutcome> {
        let planner = GeofencePlanner::from_config(&self.settings.current());
        let observed_at = Utc::now();

        let (zone_id, kind) = match planner.route_transition(event) {
            GeofenceSignal::ZoneTransition { zone_id, kind, .. } => (zone_id, kind),
            GeofenceSignal::RefreshRequested => {
                info!("left update fence, re-planning geofences");
                let fences = self.restore_geofences()?;
                return Ok(EventOutcome::Replanned { fences });
            }
            GeofenceSignal::Ignored { reason } => return Ok(EventOutcome::Ignored { reason }),
        };

        let proposal = match kind {
            TransitionKind::Enter | TransitionKind::Dwell => {
                match self.zone_for_transition(zone_id)? {
                    Ok(proposal) => Some(proposal),
                    Err(reason) => return Ok(EventOutcome::Ignored { reason }),
                }
            }
            TransitionKind::Exit => {
                // Leaving a fence we are not resident in says nothing about
                // the zone we are in.
                if self.reconciler.state().resident_zone() != Some(zone_id) {
                    debug!(zone_id, "exit from non-resident zone");
                    return Ok(EventOutcome::Reconciled {
                        outcome: Outcome::Unchanged,
                    });
                }
                None
            }
        };

        let outcome = self
            .reconciler
            .reconcile(Trigger::geofence(zone_id, kind, proposal, observed_at));
        Ok(EventOutcome::Reconciled { outcome })
    }

    /// Look up an entered zone; the inner `Err` is the reason to ignore it.
    fn zone_for_transition(
        &self,
        zone_id: ZoneId,
    ) -> Result<std::result::Result<ProposedZone, String>> {
        let Some(zone) = self.catalog().by_id(zone_id)? else {
            return Ok(Err(format!("zone {zone_id} is not in the catalog")));
        };
        if !zone.is_named() {
            return Ok(Err(format!("zone {zone_id} is unnamed")));
        }
        if self.user_db().is_ignored(zone_id)? {
            return Ok(Err(format!("zone {zone_id} is ignored")));
        }
        if !self
            .settings
            .current()
            .zones
            .active_categories
            .contains(&zone.category)
        {
            return Ok(Err(format!("category {} is not active", zone.category)));
        }
        let promotion = self.user_db().promotion(zone_id)?;
        Ok(Ok(ProposedZone::new(zone).with_promotion(promotion)))
    }

    /// Run one live pass for a foreground fix.
    pub fn process_fix(&self, position: &Position) -> Result<Outcome> {
        position.validate()?;
        if !self.override_mode().is_auto() {
            return Ok(Outcome::Suppressed);
        }
        let proposal = self.propose(position, LIVE_WINDOW_DEG)?;
        Ok(self
            .reconciler
            .reconcile(Trigger::live(proposal, position.observed_at)))
    }

    /// Periodic background pass: refresh the catalog, reconcile against the
    /// current position and the live device state, then re-plan fences.
    pub async fn run_self_heal(&self) -> WorkOutcome {
        if !self.override_mode().is_auto() {
            debug!("override active, self-heal skipped");
            return WorkOutcome::Skipped;
        }

        if let RefreshOutcome::Failed { reason } = self.refresh_catalog(false).await {
            debug!(%reason, "continuing self-heal with existing catalog");
        }

        let position = match self.positions.current_position() {
            Ok(position) => position,
            Err(e) => {
                warn!(error = %e, "no position for self-heal, will retry");
                return WorkOutcome::Retry;
            }
        };

        let proposal = match self.propose(&position, WIDE_WINDOW_DEG) {
            Ok(proposal) => proposal,
            Err(e) => {
                warn!(error = %e, "candidate lookup failed, will retry");
                return WorkOutcome::Retry;
            }
        };

        let outcome = self
            .reconciler
            .reconcile(Trigger::self_heal(proposal, position.observed_at));
        info!(?outcome, "self-heal pass complete");

        if let Err(e) = self.register_fences(&position) {
            warn!(error = %e, "geofence re-registration failed");
        }
        WorkOutcome::Success
    }

    /// Run [`run_self_heal`](Self::run_self_heal) every `period`, `cycles`
    /// times or forever.
    pub async fn run_worker(&self, period: Duration, cycles: Option<usize>) -> Vec<WorkOutcome> {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut outcomes = Vec::new();
        loop {
            if cycles.is_some_and(|n| outcomes.len() >= n) {
                break;
            }
            interval.tick().await;
            outcomes.push(self.run_self_heal().await);
        }
        outcomes
    }

    // ── Catalog ──────────────────────────────────────────────────────

    /// Refresh the catalog snapshot. Failure leaves the current catalog in
    /// place.
    pub async fn refresh_catalog(&self, force: bool) -> RefreshOutcome {
        let Some(updater) = &self.updater else {
            debug!("no catalog source configured");
            return RefreshOutcome::Unchanged;
        };

        let local_timestamp = match self.user_db().catalog_timestamp() {
            Ok(ts) => ts,
            Err(e) => {
                warn!(error = %e, "catalog version unreadable, assuming none");
                0
            }
        };

        let outcome = updater.refresh(force, local_timestamp).await;
        if let RefreshOutcome::Updated { timestamp, .. } = &outcome {
            // The version is only recorded once the new snapshot is in use,
            // so a failed reopen is retried on the next refresh.
            if let Err(e) = self.catalog().reopen() {
                warn!(error = %e, "could not reopen refreshed catalog");
                return RefreshOutcome::Failed {
                    reason: e.to_string(),
                };
            }
            if let Err(e) = self.user_db().set_catalog_timestamp(*timestamp) {
                warn!(error = %e, "could not record catalog version");
            }
        }
        outcome
    }

    // ── Geofences ────────────────────────────────────────────────────

    /// Re-register fences around the current position (e.g. after boot).
    pub fn restore_geofences(&self) -> Result<usize> {
        let position = self.positions.current_position()?;
        self.register_fences(&position)
    }

    fn register_fences(&self, position: &Position) -> Result<usize> {
        let config = self.settings.current();
        let ignored = self.user_db().ignored_ids()?;
        let candidates = proximity::candidates(
            &self.catalog(),
            &ignored,
            &config.zones.active_categories,
            position,
            WIDE_WINDOW_DEG,
        )?;
        let fences = GeofencePlanner::from_config(&config).plan(position, &candidates);
        self.registrar.register(&fences)?;
        info!(count = fences.len(), "geofences registered");
        Ok(fences.len())
    }

    // ── Ignore list ──────────────────────────────────────────────────

    /// Every zone of any category within 150 m, nearest first, that is not
    /// already ignored.
    pub fn scan_safe_zone(&self, position: &Position) -> Result<Vec<ZoneMatch>> {
        position.validate()?;
        let ignored = self.user_db().ignored_ids()?;
        let candidates = proximity::candidates(
            &self.catalog(),
            &ignored,
            &ZoneCategory::ALL,
            position,
            SAFE_ZONE_WINDOW_DEG,
        )?;
        Ok(proximity::zones_within(position, &candidates, SAFE_ZONE_RADIUS_M))
    }

    /// Ignore `ids`; if the device is resident in one of them, end that
    /// residency.
    pub fn ignore_all(&self, ids: &[ZoneId]) -> Result<Outcome> {
        self.user_db().ignore_all(ids)?;
        info!(count = ids.len(), "zones ignored");
        match self.reconciler.state().resident_zone() {
            Some(current) if ids.contains(&current) => Ok(self.reconciler.forget_zone(current)),
            _ => Ok(Outcome::Unchanged),
        }
    }

    /// Ignore the zone the device is resident in. Returns its id.
    pub fn ignore_current_zone(&self) -> Result<Option<ZoneId>> {
        let Some(current) = self.reconciler.state().resident_zone() else {
            return Ok(None);
        };
        self.ignore_all(&[current])?;
        Ok(Some(current))
    }

    pub fn unignore(&self, id: ZoneId) -> Result<bool> {
        Ok(self.user_db().unignore(id)?)
    }

    pub fn clear_ignored(&self) -> Result<usize> {
        Ok(self.user_db().clear_ignored()?)
    }

    pub fn ignored_zones(&self) -> Result<BTreeSet<ZoneId>> {
        Ok(self.user_db().ignored_ids()?)
    }

    // ── Override ─────────────────────────────────────────────────────

    /// Store the override mode and apply it to the device.
    pub fn set_override_mode(&self, mode: OverrideMode) -> Result<Outcome> {
        let updated = {
            let mut config = self.settings.write().unwrap_or_else(PoisonError::into_inner);
            config.override_mode = mode;
            config.clone()
        };
        if let Some(path) = &self.config_path {
            updated.save_to(path).map_err(CoreError::from)?;
        }
        info!(?mode, "override mode set");
        Ok(self.reconciler.apply_override(mode))
    }

    pub fn status(&self) -> Result<AutomationStatus> {
        let (catalog_timestamp, ignored_zones) = {
            let db = self.user_db();
            (db.catalog_timestamp()?, db.ignored_ids()?.len())
        };
        Ok(AutomationStatus {
            override_mode: self.override_mode(),
            residency: self.reconciler.state(),
            device_silent: self.reconciler.device_silent(),
            catalog_zones: self.catalog().count()?,
            catalog_timestamp,
            ignored_zones,
        })
    }
}
