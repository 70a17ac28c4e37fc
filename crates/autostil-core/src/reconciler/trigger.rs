//! Inputs and results of a reconciliation pass.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::catalog::{Zone, ZoneId};
use crate::geofence::TransitionKind;
use crate::storage::Promotion;

/// What caused a reconciliation pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TriggerSource {
    /// A platform geofence transition.
    Geofence {
        zone_id: ZoneId,
        transition: TransitionKind,
    },
    /// The periodic background pass, which also checks the live device state.
    SelfHeal,
    /// A fix from the foreground position stream.
    Live,
}

/// The zone a trigger believes the device is in.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProposedZone {
    pub zone: Zone,
    pub promotion: Option<Promotion>,
}

impl ProposedZone {
    pub fn new(zone: Zone) -> Self {
        Self {
            zone,
            promotion: None,
        }
    }

    pub fn with_promotion(mut self, promotion: Option<Promotion>) -> Self {
        self.promotion = promotion;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Trigger {
    pub source: TriggerSource,
    /// `None` means "not in any qualifying zone".
    pub proposal: Option<ProposedZone>,
    /// When the underlying observation was made.
    pub observed_at: DateTime<Utc>,
}

impl Trigger {
    pub fn live(proposal: Option<ProposedZone>, observed_at: DateTime<Utc>) -> Self {
        Self {
            source: TriggerSource::Live,
            proposal,
            observed_at,
        }
    }

    pub fn self_heal(proposal: Option<ProposedZone>, observed_at: DateTime<Utc>) -> Self {
        Self {
            source: TriggerSource::SelfHeal,
            proposal,
            observed_at,
        }
    }

    pub fn geofence(
        zone_id: ZoneId,
        transition: TransitionKind,
        proposal: Option<ProposedZone>,
        observed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            source: TriggerSource::Geofence {
                zone_id,
                transition,
            },
            proposal,
            observed_at,
        }
    }

    pub fn proposed_zone_id(&self) -> Option<ZoneId> {
        self.proposal.as_ref().map(|p| p.zone.id)
    }
}

/// Result of a pass. Outcomes are values; nothing here is fatal.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    /// The device was silenced for `zone_id`.
    Activated { zone_id: ZoneId },
    /// Residency ended; `zone_id` is the zone that was left, if any.
    Deactivated { zone_id: Option<ZoneId> },
    Unchanged,
    /// An override mode is active.
    Suppressed,
    /// The observation predates the last committed decision.
    Stale,
    PermissionDenied,
    ActuatorFailed { reason: String },
    StoreFailed { reason: String },
    /// A user override was applied to the device.
    Manual { silent: bool },
}

impl Outcome {
    /// Whether the pass changed the residency state.
    pub fn is_change(&self) -> bool {
        matches!(
            self,
            Outcome::Activated { .. } | Outcome::Deactivated { .. } | Outcome::Manual { .. }
        )
    }
}
