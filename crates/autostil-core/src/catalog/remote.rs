//! Periodic refresh of the catalog snapshot from its remote source.
//!
//! The remote side publishes a small `version.json` metadata document and
//! one SQLite snapshot file per region. A refresh downloads the first
//! region's snapshot when forced, when no local snapshot exists, or when
//! the published timestamp is newer than the one recorded locally.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Utc;
use reqwest::header::CACHE_CONTROL;
use reqwest::Client;
use rusqlite::{Connection, OpenFlags};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use url::Url;

use crate::error::CatalogError;

/// Remote metadata document (`version.json`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RemoteMetadata {
    /// Publication time of the snapshots; larger means newer.
    #[serde(default)]
    pub timestamp: i64,
    #[serde(default)]
    pub regions: Vec<RegionInfo>,
}

/// One downloadable regional snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RegionInfo {
    pub id: String,
    pub file: String,
    #[serde(default)]
    pub count: u64,
}

/// Result of a refresh attempt.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RefreshOutcome {
    /// A new snapshot was written; `timestamp` must be recorded locally.
    Updated { timestamp: i64, region: String },
    /// Local snapshot is current.
    Unchanged,
    /// Refresh failed; the existing catalog stays in use.
    Failed { reason: String },
}

/// Downloads catalog snapshots.
pub struct CatalogUpdater {
    base_url: Url,
    snapshot_path: PathBuf,
    http_client: Client,
}

impl CatalogUpdater {
    /// Create an updater writing to `snapshot_path`.
    ///
    /// Every request (connect and read) is bounded by `timeout`.
    pub fn new(
        base_url: &str,
        snapshot_path: impl Into<PathBuf>,
        timeout: Duration,
    ) -> Result<Self, CatalogError> {
        let mut base_url = Url::parse(base_url)?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        let http_client = Client::builder()
            .connect_timeout(timeout)
            .timeout(timeout)
            .build()
            .map_err(CatalogError::Client)?;
        Ok(Self {
            base_url,
            snapshot_path: snapshot_path.into(),
            http_client,
        })
    }

    pub fn snapshot_path(&self) -> &Path {
        &self.snapshot_path
    }

    /// Refresh the snapshot. Never fails: errors become
    /// [`RefreshOutcome::Failed`] and leave the existing file untouched.
    pub async fn refresh(&self, force: bool, local_timestamp: i64) -> RefreshOutcome {
        match self.try_refresh(force, local_timestamp).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(error = %e, "catalog refresh failed, keeping existing catalog");
                RefreshOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        }
    }

    /// Refresh the snapshot, reporting the cause of any failure.
    pub async fn try_refresh(
        &self,
        force: bool,
        local_timestamp: i64,
    ) -> Result<RefreshOutcome, CatalogError> {
        debug!("checking catalog metadata");
        let metadata = self.fetch_metadata().await?;

        let missing = !self.snapshot_path.exists();
        let newer = metadata.timestamp > local_timestamp;
        if !(force || missing || newer) {
            debug!(local_timestamp, "catalog is up to date");
            return Ok(RefreshOutcome::Unchanged);
        }

        info!(force, missing, newer, "catalog update required");
        let region = metadata.regions.first().ok_or(CatalogError::NoRegion)?;
        let bytes = self.fetch_bytes(&region.file).await?;
        self.write_snapshot(&bytes)?;

        info!(
            region = %region.id,
            bytes = bytes.len(),
            timestamp = metadata.timestamp,
            "catalog snapshot replaced"
        );
        Ok(RefreshOutcome::Updated {
            timestamp: metadata.timestamp,
            region: region.id.clone(),
        })
    }

    async fn fetch_metadata(&self) -> Result<RemoteMetadata, CatalogError> {
        let url = self.endpoint("version.json")?;
        let body = self.get(url).await?;
        serde_json::from_slice(&body).map_err(|e| CatalogError::Parse(e.to_string()))
    }

    async fn fetch_bytes(&self, file: &str) -> Result<Vec<u8>, CatalogError> {
        let url = self.endpoint(file)?;
        self.get(url).await
    }

    async fn get(&self, url: Url) -> Result<Vec<u8>, CatalogError> {
        let url_str = url.to_string();
        let resp = self
            .http_client
            .get(url)
            .header(CACHE_CONTROL, "no-cache")
            .send()
            .await
            .map_err(|source| CatalogError::Fetch {
                url: url_str.clone(),
                source,
            })?;

        let status = resp.status();
        if !status.is_success() {
            return Err(CatalogError::Status {
                url: url_str,
                status: status.as_u16(),
            });
        }

        let bytes = resp.bytes().await.map_err(|source| CatalogError::Fetch {
            url: url_str,
            source,
        })?;
        Ok(bytes.to_vec())
    }

    /// `<base>/<file>?t=<millis>`; the query defeats intermediate caches.
    fn endpoint(&self, file: &str) -> Result<Url, CatalogError> {
        let mut url = self.base_url.join(file)?;
        url.query_pairs_mut()
            .append_pair("t", &Utc::now().timestamp_millis().to_string());
        Ok(url)
    }

    fn write_snapshot(&self, bytes: &[u8]) -> Result<(), CatalogError> {
        if let Some(parent) = self.snapshot_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = self.snapshot_path.with_extension("db.part");
        std::fs::write(&tmp, bytes)?;
        if let Err(e) = verify_snapshot(&tmp) {
            if let Err(rm) = std::fs::remove_file(&tmp) {
                warn!(error = %rm, path = %tmp.display(), "could not remove rejected snapshot");
            }
            return Err(e);
        }
        std::fs::rename(&tmp, &self.snapshot_path)?;
        Ok(())
    }
}

/// A snapshot must be a SQLite file with a readable `locations` table.
fn verify_snapshot(path: &Path) -> Result<(), CatalogError> {
    let invalid = |e: rusqlite::Error| CatalogError::InvalidSnapshot(e.to_string());
    let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY).map_err(invalid)?;
    let rows: i64 = conn
        .query_row("SELECT COUNT(*) FROM locations", [], |row| row.get(0))
        .map_err(invalid)?;
    debug!(rows, "downloaded snapshot verified");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{CatalogDb, Zone, ZoneCategory};
    use mockito::Matcher;

    const METADATA: &str = r#"{
        "timestamp": 1700000000,
        "regions": [{"id": "nl", "file": "silent_locations_nl.db", "count": 2}]
    }"#;

    /// A minimal published snapshot with one zone.
    fn snapshot(dir: &Path) -> Vec<u8> {
        let path = dir.join("published.db");
        {
            let db = CatalogDb::open(&path).unwrap();
            db.replace_all(&[Zone {
                id: 7,
                name: Some("Sint-Janskathedraal".to_string()),
                category: ZoneCategory::Church,
                lat: 51.6889,
                lon: 5.3094,
                address: None,
            }])
            .unwrap();
        }
        std::fs::read(path).unwrap()
    }

    fn updater(server: &mockito::Server, dir: &Path) -> CatalogUpdater {
        CatalogUpdater::new(
            &server.url(),
            dir.join("silent_locations.db"),
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn downloads_when_snapshot_missing() {
        let publish = tempfile::tempdir().unwrap();
        let bytes = snapshot(publish.path());
        let mut server = mockito::Server::new_async().await;
        let meta = server
            .mock("GET", "/version.json")
            .match_query(Matcher::Any)
            .with_body(METADATA)
            .create_async()
            .await;
        let snapshot = server
            .mock("GET", "/silent_locations_nl.db")
            .match_query(Matcher::Any)
            .with_body(bytes.clone())
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let updater = updater(&server, dir.path());
        let outcome = updater.refresh(false, 1700000000).await;

        assert_eq!(
            outcome,
            RefreshOutcome::Updated {
                timestamp: 1700000000,
                region: "nl".to_string()
            }
        );
        assert_eq!(std::fs::read(updater.snapshot_path()).unwrap(), bytes);
        meta.assert_async().await;
        snapshot.assert_async().await;
    }

    #[tokio::test]
    async fn unchanged_when_local_is_current() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/version.json")
            .match_query(Matcher::Any)
            .with_body(METADATA)
            .create_async()
            .await;
        let snapshot = server
            .mock("GET", "/silent_locations_nl.db")
            .match_query(Matcher::Any)
            .expect(0)
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let updater = updater(&server, dir.path());
        std::fs::write(updater.snapshot_path(), b"OLD").unwrap();

        assert_eq!(updater.refresh(false, 1700000000).await, RefreshOutcome::Unchanged);
        assert_eq!(std::fs::read(updater.snapshot_path()).unwrap(), b"OLD");
        snapshot.assert_async().await;
    }

    #[tokio::test]
    async fn force_downloads_even_when_current() {
        let publish = tempfile::tempdir().unwrap();
        let bytes = snapshot(publish.path());
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/version.json")
            .match_query(Matcher::Any)
            .with_body(METADATA)
            .create_async()
            .await;
        server
            .mock("GET", "/silent_locations_nl.db")
            .match_query(Matcher::Any)
            .with_body(bytes.clone())
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let updater = updater(&server, dir.path());
        std::fs::write(updater.snapshot_path(), b"OLD").unwrap();

        let outcome = updater.refresh(true, 1700000000).await;
        assert!(matches!(outcome, RefreshOutcome::Updated { .. }));
        assert_eq!(std::fs::read(updater.snapshot_path()).unwrap(), bytes);
    }

    #[tokio::test]
    async fn server_error_keeps_existing_snapshot() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/version.json")
            .match_query(Matcher::Any)
            .with_body(METADATA)
            .create_async()
            .await;
        server
            .mock("GET", "/silent_locations_nl.db")
            .match_query(Matcher::Any)
            .with_status(500)
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let updater = updater(&server, dir.path());
        std::fs::write(updater.snapshot_path(), b"OLD").unwrap();

        let outcome = updater.refresh(false, 0).await;
        assert!(matches!(outcome, RefreshOutcome::Failed { .. }));
        assert_eq!(std::fs::read(updater.snapshot_path()).unwrap(), b"OLD");
    }

    #[tokio::test]
    async fn non_sqlite_body_is_rejected() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/version.json")
            .match_query(Matcher::Any)
            .with_body(METADATA)
            .create_async()
            .await;
        server
            .mock("GET", "/silent_locations_nl.db")
            .match_query(Matcher::Any)
            .with_body("<html><body>Please log in to the Wi-Fi</body></html>")
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let updater = updater(&server, dir.path());
        std::fs::write(updater.snapshot_path(), b"OLD").unwrap();

        let err = updater.try_refresh(true, 0).await.unwrap_err();
        assert!(matches!(err, CatalogError::InvalidSnapshot(_)));
        assert_eq!(std::fs::read(updater.snapshot_path()).unwrap(), b"OLD");
        assert!(!updater.snapshot_path().with_extension("db.part").exists());
    }

    #[tokio::test]
    async fn metadata_without_regions_fails() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/version.json")
            .match_query(Matcher::Any)
            .with_body(r#"{"timestamp": 5, "regions": []}"#)
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let updater = updater(&server, dir.path());
        let err = updater.try_refresh(false, 0).await.unwrap_err();
        assert!(matches!(err, CatalogError::NoRegion));
    }

    #[tokio::test]
    async fn malformed_metadata_is_a_parse_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/version.json")
            .match_query(Matcher::Any)
            .with_body("<html>not json</html>")
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let updater = updater(&server, dir.path());
        let err = updater.try_refresh(false, 0).await.unwrap_err();
        assert!(matches!(err, CatalogError::Parse(_)));
    }

    #[test]
    fn endpoint_keeps_base_path() {
        let dir = tempfile::tempdir().unwrap();
        let updater = CatalogUpdater::new(
            "https://example.org/auto-silent",
            dir.path().join("x.db"),
            Duration::from_secs(1),
        )
        .unwrap();
        let url = updater.endpoint("version.json").unwrap();
        assert_eq!(url.path(), "/auto-silent/version.json");
        assert!(url.query().unwrap().starts_with("t="));
    }
}
