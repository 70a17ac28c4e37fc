//! Nearest-zone evaluation.
//!
//! Candidate zones come from a bounding-box query on the catalog around the
//! position; the evaluator then does a linear haversine scan.

use std::collections::BTreeSet;

use serde::Serialize;

use crate::catalog::{CatalogDb, Zone, ZoneCategory, ZoneId};
use crate::error::DatabaseError;
use crate::geo::Position;

/// Candidate window for live tracking passes.
pub const LIVE_WINDOW_DEG: f64 = 0.005;

/// Candidate window for self-heal passes and geofence planning.
pub const WIDE_WINDOW_DEG: f64 = 0.1;

/// Candidate window for the safe-zone scan.
pub const SAFE_ZONE_WINDOW_DEG: f64 = 0.0015;

/// Radius of the safe-zone scan, across all categories.
pub const SAFE_ZONE_RADIUS_M: f64 = 150.0;

/// A zone and how far the position is from its center.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ZoneMatch {
    pub zone: Zone,
    pub distance_m: f64,
}

/// The nearest candidate within `radius_m + buffer_m`, if any.
///
/// Only a strictly smaller distance replaces the current best, so equal
/// distances resolve to the first-seen candidate. [`candidates`] returns
/// zones ordered by id, so a tie between catalog zones picks the lowest id.
pub fn nearest_zone(
    position: &Position,
    candidates: &[Zone],
    radius_m: f64,
    buffer_m: f64,
) -> Option<ZoneMatch> {
    let limit = radius_m + buffer_m;
    let mut best: Option<ZoneMatch> = None;

    for zone in candidates {
        let distance_m = position.distance_to(zone.lat, zone.lon);
        if distance_m > limit {
            continue;
        }
        if best.as_ref().map_or(true, |b| distance_m < b.distance_m) {
            best = Some(ZoneMatch {
                zone: zone.clone(),
                distance_m,
            });
        }
    }

    best
}

/// Every candidate within `radius_m`, nearest first.
pub fn zones_within(position: &Position, candidates: &[Zone], radius_m: f64) -> Vec<ZoneMatch> {
    let mut matches: Vec<ZoneMatch> = candidates
        .iter()
        .map(|zone| ZoneMatch {
            distance_m: position.distance_to(zone.lat, zone.lon),
            zone: zone.clone(),
        })
        .filter(|m| m.distance_m <= radius_m)
        .collect();
    matches.sort_by(|a, b| a.distance_m.total_cmp(&b.distance_m));
    matches
}

/// Zones eligible for silencing around `position`: inside the window, in
/// one of `categories`, named, and not ignored.
pub fn candidates(
    catalog: &CatalogDb,
    ignored: &BTreeSet<ZoneId>,
    categories: &[ZoneCategory],
    position: &Position,
    window_deg: f64,
) -> Result<Vec<Zone>, DatabaseError> {
    let zones = catalog.nearby(&position.window(window_deg), categories)?;
    Ok(zones
        .into_iter()
        .filter(|z| z.is_named() && !ignored.contains(&z.id))
        .collect())
}
