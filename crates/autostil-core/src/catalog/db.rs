//! SQLite-backed zone catalog snapshot.

use std::path::{Path, PathBuf};

use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use tracing::{debug, warn};

use super::{Zone, ZoneCategory, ZoneId};
use crate::error::DatabaseError;
use crate::geo::BoundingBox;

/// File name of the catalog snapshot inside the data directory.
pub const CATALOG_FILE: &str = "silent_locations.db";

/// Read-mostly store of catalog zones.
///
/// The remote snapshot is a complete SQLite file with a `locations` table;
/// opening it only ensures that table exists so an empty install still
/// answers queries.
pub struct CatalogDb {
    conn: Connection,
    path: Option<PathBuf>,
}

impl CatalogDb {
    /// Open (or create) the catalog at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, DatabaseError> {
        let path = path.as_ref();
        let conn = Connection::open(path).map_err(|source| DatabaseError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        let db = Self {
            conn,
            path: Some(path.to_path_buf()),
        };
        db.ensure_schema()?;
        Ok(db)
    }

    /// Open an in-memory catalog (tests and dry runs).
    pub fn open_memory() -> Result<Self, DatabaseError> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn, path: None };
        db.ensure_schema()?;
        Ok(db)
    }

    /// Location of the backing file, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Re-open the backing file after a snapshot was swapped in underneath.
    pub fn reopen(&mut self) -> Result<(), DatabaseError> {
        if let Some(path) = self.path.clone() {
            *self = Self::open(path)?;
        }
        Ok(())
    }

    fn ensure_schema(&self) -> Result<(), DatabaseError> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS locations (
                id       INTEGER PRIMARY KEY,
                name     TEXT,
                lat      REAL NOT NULL,
                lon      REAL NOT NULL,
                category TEXT,
                address  TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_locations_lat_lon ON locations(lat, lon);",
        )?;
        Ok(())
    }

    /// Replace the whole catalog in one transaction.
    pub fn replace_all(&self, zones: &[Zone]) -> Result<usize, DatabaseError> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute("DELETE FROM locations", [])?;
        {
            let mut stmt = tx.prepare(
                "INSERT OR REPLACE INTO locations (id, name, lat, lon, category, address)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            for zone in zones {
                stmt.execute(params![
                    zone.id,
                    zone.name,
                    zone.lat,
                    zone.lon,
                    zone.category.as_str(),
                    zone.address,
                ])?;
            }
        }
        tx.commit()?;
        debug!(count = zones.len(), "catalog replaced");
        Ok(zones.len())
    }

    /// Bulk-replace from a JSON array of zones.
    pub fn import_json(&self, json: &str) -> Result<usize, crate::error::CoreError> {
        let zones: Vec<Zone> = serde_json::from_str(json)?;
        Ok(self.replace_all(&zones)?)
    }

    /// Zones inside `bbox` whose category is one of `categories`.
    ///
    /// An empty category list matches nothing.
    pub fn nearby(
        &self,
        bbox: &BoundingBox,
        categories: &[ZoneCategory],
    ) -> Result<Vec<Zone>, DatabaseError> {
        if categories.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = (0..categories.len())
            .map(|i| format!("?{}", i + 5))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "SELECT id, name, lat, lon, category, address FROM locations
             WHERE lat BETWEEN ?1 AND ?2 AND lon BETWEEN ?3 AND ?4
               AND category IN ({placeholders})
             ORDER BY id"
        );

        let mut values: Vec<rusqlite::types::Value> = vec![
            bbox.min_lat.into(),
            bbox.max_lat.into(),
            bbox.min_lon.into(),
            bbox.max_lon.into(),
        ];
        values.extend(categories.iter().map(|c| c.as_str().to_string().into()));

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(values), row_to_raw)?;
        collect_zones(rows)
    }

    pub fn by_id(&self, id: ZoneId) -> Result<Option<Zone>, DatabaseError> {
        let raw = self
            .conn
            .query_row(
                "SELECT id, name, lat, lon, category, address FROM locations WHERE id = ?1",
                params![id],
                row_to_raw,
            )
            .optional()?;
        Ok(raw.and_then(RawZone::into_zone))
    }

    pub fn count(&self) -> Result<u64, DatabaseError> {
        let n = self
            .conn
            .query_row("SELECT COUNT(*) FROM locations", [], |row| row.get::<_, u64>(0))?;
        Ok(n)
    }

    pub fn all(&self) -> Result<Vec<Zone>, DatabaseError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, lat, lon, category, address FROM locations ORDER BY id",
        )?;
        let rows = stmt.query_map([], row_to_raw)?;
        collect_zones(rows)
    }
}

/// A row as stored; the category may be one this build does not know.
struct RawZone {
    id: ZoneId,
    name: Option<String>,
    lat: f64,
    lon: f64,
    category: Option<String>,
    address: Option<String>,
}

impl RawZone {
    fn into_zone(self) -> Option<Zone> {
        let category = match self.category.as_deref().map(str::parse::<ZoneCategory>) {
            Some(Ok(c)) => c,
            _ => {
                warn!(id = self.id, category = ?self.category, "skipping zone with unknown category");
                return None;
            }
        };
        Some(Zone {
            id: self.id,
            name: self.name,
            category,
            lat: self.lat,
            lon: self.lon,
            address: self.address,
        })
    }
}

fn row_to_raw(row: &Row<'_>) -> rusqlite::Result<RawZone> {
    Ok(RawZone {
        id: row.get(0)?,
        name: row.get(1)?,
        lat: row.get(2)?,
        lon: row.get(3)?,
        category: row.get(4)?,
        address: row.get(5)?,
    })
}

fn collect_zones(
    rows: impl Iterator<Item = rusqlite::Result<RawZone>>,
) -> Result<Vec<Zone>, DatabaseError> {
    let mut zones = Vec::new();
    for raw in rows {
        if let Some(zone) = raw?.into_zone() {
            zones.push(zone);
        }
    }
    Ok(zones)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::Position;

    fn zone(id: ZoneId, category: ZoneCategory, lat: f64, lon: f64) -> Zone {
        Zone {
            id,
            name: Some(format!("Zone {id}")),
            category,
            lat,
            lon,
            address: None,
        }
    }

    #[test]
    fn replace_all_swaps_contents() {
        let db = CatalogDb::open_memory().unwrap();
        db.replace_all(&[zone(1, ZoneCategory::Church, 52.0, 5.0)])
            .unwrap();
        db.replace_all(&[
            zone(2, ZoneCategory::Theater, 52.0, 5.0),
            zone(3, ZoneCategory::Library, 52.1, 5.1),
        ])
        .unwrap();

        assert_eq!(db.count().unwrap(), 2);
        assert!(db.by_id(1).unwrap().is_none());
        assert_eq!(db.by_id(3).unwrap().unwrap().category, ZoneCategory::Library);
    }

    #[test]
    fn nearby_filters_by_window_and_category() {
        let db = CatalogDb::open_memory().unwrap();
        db.replace_all(&[
            zone(1, ZoneCategory::Church, 52.0, 5.0),
            zone(2, ZoneCategory::Theater, 52.001, 5.001),
            zone(3, ZoneCategory::Church, 52.5, 5.0),
        ])
        .unwrap();

        let bbox = Position::new(52.0, 5.0).window(0.005);
        let found = db.nearby(&bbox, &[ZoneCategory::Church]).unwrap();
        assert_eq!(found.iter().map(|z| z.id).collect::<Vec<_>>(), vec![1]);

        let found = db
            .nearby(&bbox, &[ZoneCategory::Church, ZoneCategory::Theater])
            .unwrap();
        assert_eq!(found.len(), 2);

        assert!(db.nearby(&bbox, &[]).unwrap().is_empty());
    }

    #[test]
    fn unknown_categories_are_skipped() {
        let db = CatalogDb::open_memory().unwrap();
        db.conn
            .execute(
                "INSERT INTO locations (id, name, lat, lon, category) VALUES (9, 'Bar', 52.0, 5.0, 'pub')",
                [],
            )
            .unwrap();
        assert_eq!(db.count().unwrap(), 1);
        assert!(db.all().unwrap().is_empty());
        assert!(db.by_id(9).unwrap().is_none());
    }

    #[test]
    fn import_json_replaces_catalog() {
        let db = CatalogDb::open_memory().unwrap();
        let json = r#"[
            {"id": 10, "name": "Grote Kerk", "category": "church", "lat": 52.0, "lon": 5.0},
            {"id": 11, "category": "cinema", "lat": 52.01, "lon": 5.01, "address": "Plein 1"}
        ]"#;
        assert_eq!(db.import_json(json).unwrap(), 2);
        let z = db.by_id(11).unwrap().unwrap();
        assert_eq!(z.name, None);
        assert_eq!(z.address.as_deref(), Some("Plein 1"));
    }

    #[test]
    fn open_on_disk_creates_schema() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CATALOG_FILE);
        let db = CatalogDb::open(&path).unwrap();
        assert_eq!(db.count().unwrap(), 0);
        assert_eq!(db.path(), Some(path.as_path()));
    }
}
