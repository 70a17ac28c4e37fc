//! SQLite store for user data that must survive catalog refreshes.
//!
//! Provides persistent storage for:
//! - The ignore list (zones the user opted out of)
//! - Per-zone promotions
//! - Key-value application state (residency, catalog version)
//!
//! This store is deliberately separate from the catalog snapshot, which
//! is replaced wholesale on every refresh.

use std::collections::BTreeSet;
use std::path::Path;

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use super::{data_dir, migrations};
use crate::catalog::ZoneId;
use crate::error::{CoreError, DatabaseError};
use crate::residency::{ResidencyState, ResidencyStore};

/// File name of the user-data store inside the data directory.
pub const USER_DB_FILE: &str = "local_user_data.db";

const KEY_RESIDENCY: &str = "residency_state";
const KEY_CATALOG_TIMESTAMP: &str = "catalog_version_timestamp";

/// A promotional message attached to a zone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Promotion {
    pub zone_id: ZoneId,
    pub text: String,
    #[serde(default)]
    pub url: Option<String>,
}

/// Local user-data database.
pub struct UserDb {
    conn: Connection,
}

impl UserDb {
    /// Open the store at `~/.config/autostil/local_user_data.db`.
    pub fn open_default() -> Result<Self, CoreError> {
        let path = data_dir()?.join(USER_DB_FILE);
        Ok(Self::open(path)?)
    }

    /// Open (or create) the store at `path` and migrate it.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, DatabaseError> {
        let path = path.as_ref();
        let conn = Connection::open(path).map_err(|source| DatabaseError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_connection(conn)
    }

    /// Open an in-memory store.
    pub fn open_memory() -> Result<Self, DatabaseError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, DatabaseError> {
        migrations::migrate(&conn).map_err(|e| DatabaseError::MigrationFailed(e.to_string()))?;
        Ok(Self { conn })
    }

    // ── Ignore list ──────────────────────────────────────────────────

    pub fn ignore(&self, id: ZoneId) -> Result<(), DatabaseError> {
        self.conn.execute(
            "INSERT OR REPLACE INTO ignored_zones (id, ignored_at) VALUES (?1, ?2)",
            params![id, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    /// Ignore many zones in one transaction.
    pub fn ignore_all(&self, ids: &[ZoneId]) -> Result<(), DatabaseError> {
        let tx = self.conn.unchecked_transaction()?;
        let now = Utc::now().to_rfc3339();
        {
            let mut stmt = tx.prepare(
                "INSERT OR REPLACE INTO ignored_zones (id, ignored_at) VALUES (?1, ?2)",
            )?;
            for id in ids {
                stmt.execute(params![id, now])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Returns whether the zone was on the list.
    pub fn unignore(&self, id: ZoneId) -> Result<bool, DatabaseError> {
        let n = self
            .conn
            .execute("DELETE FROM ignored_zones WHERE id = ?1", params![id])?;
        Ok(n > 0)
    }

    pub fn is_ignored(&self, id: ZoneId) -> Result<bool, DatabaseError> {
        let found = self
            .conn
            .query_row(
                "SELECT 1 FROM ignored_zones WHERE id = ?1",
                params![id],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    pub fn ignored_ids(&self) -> Result<BTreeSet<ZoneId>, DatabaseError> {
        let mut stmt = self.conn.prepare("SELECT id FROM ignored_zones")?;
        let rows = stmt.query_map([], |row| row.get::<_, ZoneId>(0))?;
        let mut ids = BTreeSet::new();
        for id in rows {
            ids.insert(id?);
        }
        Ok(ids)
    }

    pub fn clear_ignored(&self) -> Result<usize, DatabaseError> {
        Ok(self.conn.execute("DELETE FROM ignored_zones", [])?)
    }

    // ── Promotions ───────────────────────────────────────────────────

    pub fn promotion(&self, zone_id: ZoneId) -> Result<Option<Promotion>, DatabaseError> {
        let promo = self
            .conn
            .query_row(
                "SELECT zone_id, text, url FROM promotions WHERE zone_id = ?1",
                params![zone_id],
                |row| {
                    Ok(Promotion {
                        zone_id: row.get(0)?,
                        text: row.get(1)?,
                        url: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(promo)
    }

    pub fn set_promotion(&self, promo: &Promotion) -> Result<(), DatabaseError> {
        self.conn.execute(
            "INSERT OR REPLACE INTO promotions (zone_id, text, url) VALUES (?1, ?2, ?3)",
            params![promo.zone_id, promo.text, promo.url],
        )?;
        Ok(())
    }

    pub fn remove_promotion(&self, zone_id: ZoneId) -> Result<bool, DatabaseError> {
        let n = self
            .conn
            .execute("DELETE FROM promotions WHERE zone_id = ?1", params![zone_id])?;
        Ok(n > 0)
    }

    // ── Key-value state ──────────────────────────────────────────────

    /// Get a value from the kv store.
    pub fn kv_get(&self, key: &str) -> Result<Option<String>, DatabaseError> {
        let value = self
            .conn
            .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
                row.get::<_, String>(0)
            })
            .optional()?;
        Ok(value)
    }

    /// Set a value in the kv store.
    pub fn kv_set(&self, key: &str, value: &str) -> Result<(), DatabaseError> {
        self.conn.execute(
            "INSERT OR REPLACE INTO kv (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    }

    /// Publication timestamp of the installed catalog snapshot; 0 if none.
    pub fn catalog_timestamp(&self) -> Result<i64, DatabaseError> {
        Ok(self
            .kv_get(KEY_CATALOG_TIMESTAMP)?
            .and_then(|v| v.parse().ok())
            .unwrap_or(0))
    }

    pub fn set_catalog_timestamp(&self, timestamp: i64) -> Result<(), DatabaseError> {
        self.kv_set(KEY_CATALOG_TIMESTAMP, &timestamp.to_string())
    }
}

impl ResidencyStore for UserDb {
    fn load(&self) -> Result<ResidencyState, DatabaseError> {
        match self.kv_get(KEY_RESIDENCY)? {
            Some(json) => serde_json::from_str(&json)
                .map_err(|e| DatabaseError::QueryFailed(format!("corrupt residency state: {e}"))),
            None => Ok(ResidencyState::default()),
        }
    }

    fn save(&mut self, state: &ResidencyState) -> Result<(), DatabaseError> {
        let json = serde_json::to_string(state)
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;
        self.kv_set(KEY_RESIDENCY, &json)
    }
}
