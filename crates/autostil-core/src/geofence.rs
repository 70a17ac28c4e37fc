//! Geofence planning and transition routing.
//!
//! The platform can only watch a limited number of fences, so the planner
//! registers the nearest zones around the last known position plus one
//! large exit-only "update fence". Leaving the update fence asks for a new
//! plan around the new position.

use std::fmt;
use std::str::FromStr;
use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::catalog::{is_real_name, Zone, ZoneId};
use crate::error::{GeofenceError, ValidationError};
use crate::geo::Position;
use crate::storage::Config;

/// Request id of the update fence.
pub const UPDATE_FENCE_ID: &str = "MAGIC_UPDATE_FENCE";

/// Radius of the update fence around the planning position.
pub const UPDATE_FENCE_RADIUS_M: f64 = 1500.0;

/// Zone fences per plan; one slot of the platform's 100 is the update fence.
pub const MAX_ZONE_FENCES: usize = 99;

/// Platform-wide fence limit.
pub const PLATFORM_FENCE_LIMIT: usize = MAX_ZONE_FENCES + 1;

/// Name used when a request id carries none.
const PLACEHOLDER_NAME: &str = "Locatie";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransitionKind {
    Enter,
    Exit,
    Dwell,
}

impl TransitionKind {
    /// Map a platform transition code (1 enter, 2 exit, 4 dwell).
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            1 => Some(TransitionKind::Enter),
            2 => Some(TransitionKind::Exit),
            4 => Some(TransitionKind::Dwell),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TransitionKind::Enter => "enter",
            TransitionKind::Exit => "exit",
            TransitionKind::Dwell => "dwell",
        }
    }
}

impl fmt::Display for TransitionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransitionKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "enter" => Ok(TransitionKind::Enter),
            "exit" => Ok(TransitionKind::Exit),
            "dwell" => Ok(TransitionKind::Dwell),
            other => Err(ValidationError::InvalidValue {
                field: "transition".to_string(),
                message: format!("unknown transition '{other}'"),
            }),
        }
    }
}

/// One fence to register with the platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeofenceSpec {
    pub request_id: String,
    pub lat: f64,
    pub lon: f64,
    pub radius_m: f64,
    pub transitions: Vec<TransitionKind>,
    /// Milliseconds inside before a dwell fires; 0 when not dwelling.
    pub loitering_delay_ms: u32,
}

impl GeofenceSpec {
    pub fn is_update_fence(&self) -> bool {
        self.request_id == UPDATE_FENCE_ID
    }
}

/// A transition reported by the platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeofenceEvent {
    pub request_id: String,
    pub transition: TransitionKind,
}

/// What a geofence event means to the engine.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "signal", rename_all = "snake_case")]
pub enum GeofenceSignal {
    ZoneTransition {
        zone_id: ZoneId,
        name: String,
        kind: TransitionKind,
    },
    /// The device left the update fence; fences need re-planning.
    RefreshRequested,
    Ignored { reason: String },
}

/// Encode a zone as `"<id>|<name>"`.
pub fn encode_request_id(zone: &Zone) -> String {
    format!("{}|{}", zone.id, zone.display_name())
}

/// Decode a request id. A missing name decodes to the placeholder.
pub fn decode_request_id(request_id: &str) -> Option<(ZoneId, String)> {
    let (id, name) = match request_id.split_once('|') {
        Some((id, name)) => (id, name),
        None => (request_id, PLACEHOLDER_NAME),
    };
    let id = id.trim().parse().ok()?;
    Some((id, name.to_string()))
}

/// Registers fences with the platform.
pub trait GeofenceRegistrar: Send + Sync {
    /// Replace every previously registered fence with `fences`.
    fn register(&self, fences: &[GeofenceSpec]) -> Result<(), GeofenceError>;
}

/// Builds fence plans from candidate zones.
#[derive(Debug, Clone, PartialEq)]
pub struct GeofencePlanner {
    radius_m: f64,
    loitering_delay_ms: u32,
}

impl Default for GeofencePlanner {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl GeofencePlanner {
    pub fn from_config(config: &Config) -> Self {
        Self {
            radius_m: config.zones.radius_m,
            loitering_delay_ms: config.zones.loitering_delay_ms,
        }
    }

    /// Transitions requested for zone fences.
    pub fn zone_transitions(&self) -> Vec<TransitionKind> {
        if self.loitering_delay_ms > 0 {
            vec![TransitionKind::Dwell, TransitionKind::Exit]
        } else {
            vec![TransitionKind::Enter, TransitionKind::Exit]
        }
    }

    /// Fences for the nearest named `candidates` around `position`, plus
    /// the update fence.
    ///
    /// `candidates` are expected to be pre-filtered for category and the
    /// ignore list.
    pub fn plan(&self, position: &Position, candidates: &[Zone]) -> Vec<GeofenceSpec> {
        let mut named: Vec<(f64, &Zone)> = candidates
            .iter()
            .filter(|z| z.is_named())
            .map(|z| (position.distance_to(z.lat, z.lon), z))
            .collect();
        named.sort_by(|a, b| a.0.total_cmp(&b.0));

        let transitions = self.zone_transitions();
        let mut fences: Vec<GeofenceSpec> = named
            .into_iter()
            .take(MAX_ZONE_FENCES)
            .map(|(_, zone)| GeofenceSpec {
                request_id: encode_request_id(zone),
                lat: zone.lat,
                lon: zone.lon,
                radius_m: self.radius_m,
                transitions: transitions.clone(),
                loitering_delay_ms: self.loitering_delay_ms,
            })
            .collect();

        fences.push(GeofenceSpec {
            request_id: UPDATE_FENCE_ID.to_string(),
            lat: position.lat,
            lon: position.lon,
            radius_m: UPDATE_FENCE_RADIUS_M,
            transitions: vec![TransitionKind::Exit],
            loitering_delay_ms: 0,
        });

        debug!(zone_fences = fences.len() - 1, "geofence plan built");
        fences
    }

    /// Classify a platform transition.
    pub fn route_transition(&self, event: &GeofenceEvent) -> GeofenceSignal {
        if event.request_id == UPDATE_FENCE_ID {
            return if event.transition == TransitionKind::Exit {
                GeofenceSignal::RefreshRequested
            } else {
                ignored(format!("update fence {}", event.transition))
            };
        }

        let Some((zone_id, name)) = decode_request_id(&event.request_id) else {
            return ignored(format!("malformed request id '{}'", event.request_id));
        };
        if !is_real_name(&name) {
            return ignored(format!("zone {zone_id} is unnamed"));
        }
        if !self.zone_transitions().contains(&event.transition) {
            return ignored(format!("{} is not registered", event.transition));
        }

        GeofenceSignal::ZoneTransition {
            zone_id,
            name,
            kind: event.transition,
        }
    }
}

fn ignored(reason: String) -> GeofenceSignal {
    debug!(%reason, "geofence event ignored");
    GeofenceSignal::Ignored { reason }
}

/// Keeps the last registered set in memory.
#[derive(Debug, Default)]
pub struct RecordingRegistrar {
    inner: Mutex<RecordedFences>,
}

#[derive(Debug, Default)]
struct RecordedFences {
    fences: Vec<GeofenceSpec>,
    registrations: usize,
    denied: bool,
}

impl RecordingRegistrar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate missing background location permission.
    pub fn set_denied(&self, denied: bool) {
        self.lock().denied = denied;
    }

    pub fn fences(&self) -> Vec<GeofenceSpec> {
        self.lock().fences.clone()
    }

    /// How many times a set was registered successfully.
    pub fn registrations(&self) -> usize {
        self.lock().registrations
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, RecordedFences> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl GeofenceRegistrar for RecordingRegistrar {
    fn register(&self, fences: &[GeofenceSpec]) -> Result<(), GeofenceError> {
        let mut inner = self.lock();
        if inner.denied {
            return Err(GeofenceError::PermissionDenied);
        }
        if fences.len() > PLATFORM_FENCE_LIMIT {
            return Err(GeofenceError::LimitExceeded {
                count: fences.len(),
                limit: PLATFORM_FENCE_LIMIT,
            });
        }
        inner.fences = fences.to_vec();
        inner.registrations += 1;
        Ok(())
    }
}
