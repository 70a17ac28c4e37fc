//! Zone catalog: the read-only set of candidate points of interest.
//!
//! The catalog is a SQLite snapshot that is bulk-replaced on every refresh
//! from the remote source. Zones are never mutated individually; user
//! opt-outs live in the separate user-data store so they survive refreshes.

mod db;
pub mod remote;

pub use db::{CatalogDb, CATALOG_FILE};
pub use remote::{CatalogUpdater, RefreshOutcome, RegionInfo, RemoteMetadata};

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Stable catalog identifier of a zone.
pub type ZoneId = i64;

/// Placeholder names the catalog uses for venues without a real name.
const PLACEHOLDER_NAMES: [&str; 2] = ["Locatie", "Naamloos"];

/// Venue category. The set is fixed; rows with any other category are
/// skipped when reading the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ZoneCategory {
    Church,
    Theater,
    Library,
    Cinema,
    Museum,
    Cemetery,
    Hospital,
    Government,
    Community,
}

impl ZoneCategory {
    pub const ALL: [ZoneCategory; 9] = [
        ZoneCategory::Church,
        ZoneCategory::Theater,
        ZoneCategory::Library,
        ZoneCategory::Cinema,
        ZoneCategory::Museum,
        ZoneCategory::Cemetery,
        ZoneCategory::Hospital,
        ZoneCategory::Government,
        ZoneCategory::Community,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ZoneCategory::Church => "church",
            ZoneCategory::Theater => "theater",
            ZoneCategory::Library => "library",
            ZoneCategory::Cinema => "cinema",
            ZoneCategory::Museum => "museum",
            ZoneCategory::Cemetery => "cemetery",
            ZoneCategory::Hospital => "hospital",
            ZoneCategory::Government => "government",
            ZoneCategory::Community => "community",
        }
    }
}

impl fmt::Display for ZoneCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for ZoneCategory {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ZoneCategory::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ValidationError::UnknownCategory(s.to_string()))
    }
}

/// A point of interest from the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Zone {
    pub id: ZoneId,
    #[serde(default)]
    pub name: Option<String>,
    pub category: ZoneCategory,
    pub lat: f64,
    pub lon: f64,
    #[serde(default)]
    pub address: Option<String>,
}

impl Zone {
    /// Whether the zone has a usable display name.
    ///
    /// Unnamed zones never qualify for silencing.
    pub fn is_named(&self) -> bool {
        self.name.as_deref().is_some_and(is_real_name)
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(PLACEHOLDER_NAMES[0])
    }
}

/// False for blank names and the catalog's placeholders.
pub fn is_real_name(name: &str) -> bool {
    let trimmed = name.trim();
    !trimmed.is_empty()
        && !PLACEHOLDER_NAMES
            .iter()
            .any(|p| p.eq_ignore_ascii_case(trimmed))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn zone(name: Option<&str>) -> Zone {
        Zone {
            id: 1,
            name: name.map(str::to_string),
            category: ZoneCategory::Church,
            lat: 52.0,
            lon: 5.0,
            address: None,
        }
    }

    #[test]
    fn category_parses_case_insensitively() {
        assert_eq!("Church".parse::<ZoneCategory>().unwrap(), ZoneCategory::Church);
        assert_eq!(" cinema ".parse::<ZoneCategory>().unwrap(), ZoneCategory::Cinema);
        assert!("bar".parse::<ZoneCategory>().is_err());
    }

    #[test]
    fn category_roundtrips_through_str() {
        for cat in ZoneCategory::ALL {
            assert_eq!(cat.as_str().parse::<ZoneCategory>().unwrap(), cat);
        }
    }

    #[test]
    fn placeholder_and_blank_names_are_unnamed() {
        assert!(!zone(None).is_named());
        assert!(!zone(Some("   ")).is_named());
        assert!(!zone(Some("locatie")).is_named());
        assert!(!zone(Some("NAAMLOOS")).is_named());
        assert!(zone(Some("Sint-Janskerk")).is_named());
    }

    #[test]
    fn category_serializes_lowercase() {
        let json = serde_json::to_string(&ZoneCategory::Theater).unwrap();
        assert_eq!(json, "\"theater\"");
    }
}
