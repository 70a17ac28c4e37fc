//! Basic CLI E2E tests.
//!
//! Each test runs the built binary against its own data directory.

use std::path::Path;
use std::process::Command;

use tempfile::TempDir;

const CATALOG: &str = r#"[
    {"id": 1, "name": "Grote Kerk", "category": "church", "lat": 52.0, "lon": 5.0},
    {"id": 2, "name": "Bibliotheek", "category": "library", "lat": 52.0003, "lon": 5.0},
    {"id": 3, "name": "Schouwburg", "category": "theater", "lat": 52.0004, "lon": 5.0}
]"#;

/// Run a CLI command and return (stdout, stderr, exit code).
fn run_cli(home: &Path, args: &[&str]) -> (String, String, i32) {
    let output = Command::new(env!("CARGO_BIN_EXE_autostil"))
        .args(args)
        .env("AUTOSTIL_HOME", home)
        .env("RUST_LOG", "warn")
        .output()
        .expect("Failed to execute CLI command");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let code = output.status.code().unwrap_or(-1);

    (stdout, stderr, code)
}

fn ok(home: &Path, args: &[&str]) -> String {
    let (stdout, stderr, code) = run_cli(home, args);
    assert_eq!(code, 0, "{args:?} failed: {stderr}");
    stdout
}

fn json(home: &Path, args: &[&str]) -> serde_json::Value {
    let stdout = ok(home, args);
    let line = stdout.lines().next().unwrap_or_default();
    serde_json::from_str(line).unwrap_or_else(|e| panic!("{args:?} printed {stdout:?}: {e}"))
}

/// A data directory with the fixture catalog and no network catalog source.
fn seeded_home() -> TempDir {
    let home = TempDir::new().unwrap();
    let catalog = home.path().join("zones.json");
    std::fs::write(&catalog, CATALOG).unwrap();
    let out = ok(home.path(), &["catalog", "import", catalog.to_str().unwrap()]);
    assert!(out.contains("imported 3 zones"));
    ok(home.path(), &["config", "set", "catalog.base_url", "http://127.0.0.1:9"]);
    ok(home.path(), &["config", "set", "catalog.timeout_secs", "2"]);
    home
}

#[test]
fn test_config_defaults() {
    let home = TempDir::new().unwrap();
    assert_eq!(ok(home.path(), &["config", "get", "zones.radius_m"]).trim(), "80.0");
    assert_eq!(ok(home.path(), &["config", "get", "override_mode"]).trim(), "auto");
    assert!(home.path().join("config.toml").exists());
}

#[test]
fn test_config_set_and_get() {
    let home = TempDir::new().unwrap();
    ok(home.path(), &["config", "set", "zones.radius_m", "120"]);
    assert_eq!(ok(home.path(), &["config", "get", "zones.radius_m"]).trim(), "120.0");

    ok(home.path(), &["config", "set", "zones.active_categories", "church,library"]);
    let list = ok(home.path(), &["config", "list"]);
    assert!(list.contains("library"));
}

#[test]
fn test_config_rejects_bad_values() {
    let home = TempDir::new().unwrap();
    let (_, stderr, code) = run_cli(home.path(), &["config", "set", "zones.radius_m", "0"]);
    assert_eq!(code, 1);
    assert!(stderr.contains("error"));

    let (_, _, code) = run_cli(home.path(), &["config", "set", "zones.unknown", "1"]);
    assert_eq!(code, 1);

    let (_, _, code) = run_cli(home.path(), &["config", "get", "nope"]);
    assert_eq!(code, 1);
}

#[test]
fn test_catalog_stats() {
    let home = seeded_home();
    let stats = ok(home.path(), &["catalog", "stats"]);
    assert!(stats.contains("zones:   3"));
    assert!(stats.contains("version: 0"));
}

#[test]
fn test_catalog_nearby_filters_categories() {
    let home = seeded_home();
    let found = json(home.path(), &["catalog", "nearby", "--lat", "52.0", "--lon", "5.0", "--json"]);
    let ids: Vec<i64> = found
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["zone"]["id"].as_i64().unwrap())
        .collect();
    assert_eq!(ids, vec![1, 3]);

    let all = json(
        home.path(),
        &["catalog", "nearby", "--lat", "52.0", "--lon", "5.0", "--all", "--json"],
    );
    assert_eq!(all.as_array().unwrap().len(), 3);
}

#[test]
fn test_catalog_refresh_failure_is_not_fatal() {
    let home = seeded_home();
    let out = ok(home.path(), &["catalog", "refresh"]);
    assert!(out.contains("catalog refresh failed"));
    assert!(ok(home.path(), &["catalog", "stats"]).contains("zones:   3"));
}

#[test]
fn test_live_pass_enters_and_leaves() {
    let home = seeded_home();

    let entered = json(home.path(), &["pass", "live", "--lat", "52.0", "--lon", "5.0"]);
    assert_eq!(entered["outcome"], "activated");
    assert_eq!(entered["zone_id"], 1);

    let status = json(home.path(), &["status", "--json"]);
    assert_eq!(status["device_silent"], true);
    assert_eq!(status["residency"]["zone_id"], 1);

    let left = json(home.path(), &["pass", "live", "--lat", "52.005", "--lon", "5.0"]);
    assert_eq!(left["outcome"], "deactivated");

    let status = json(home.path(), &["status", "--json"]);
    assert_eq!(status["device_silent"], false);
    assert_eq!(status["residency"]["active"], false);
}

#[test]
fn test_force_sound_suppresses_passes() {
    let home = seeded_home();
    ok(home.path(), &["pass", "live", "--lat", "52.0", "--lon", "5.0"]);

    let manual = json(home.path(), &["mode", "force_sound"]);
    assert_eq!(manual["outcome"], "manual");
    assert_eq!(manual["silent"], false);
    assert_eq!(ok(home.path(), &["config", "get", "override_mode"]).trim(), "force_sound");

    let suppressed = json(home.path(), &["pass", "live", "--lat", "52.0", "--lon", "5.0"]);
    assert_eq!(suppressed["outcome"], "suppressed");
    assert_eq!(json(home.path(), &["status", "--json"])["device_silent"], false);

    let (_, _, code) = run_cli(home.path(), &["mode", "louder"]);
    assert_eq!(code, 1);
}

#[test]
fn test_ignored_zone_is_never_silenced() {
    let home = seeded_home();
    ok(home.path(), &["ignore", "add", "1", "3"]);
    let listed = ok(home.path(), &["ignore", "list"]);
    assert_eq!(listed.lines().collect::<Vec<_>>(), vec!["1", "3"]);

    let outcome = json(home.path(), &["pass", "live", "--lat", "52.0", "--lon", "5.0"]);
    assert_eq!(outcome["outcome"], "unchanged");

    ok(home.path(), &["ignore", "clear"]);
    let outcome = json(home.path(), &["pass", "live", "--lat", "52.0", "--lon", "5.0"]);
    assert_eq!(outcome["outcome"], "activated");
}

#[test]
fn test_ignore_current_restores_sound() {
    let home = seeded_home();
    ok(home.path(), &["pass", "live", "--lat", "52.0", "--lon", "5.0"]);
    let out = ok(home.path(), &["ignore", "current"]);
    assert!(out.contains("zone 1 ignored"));
    assert_eq!(json(home.path(), &["status", "--json"])["device_silent"], false);
}

#[test]
fn test_geofence_plan_includes_update_fence() {
    let home = seeded_home();
    let fences = json(home.path(), &["geofence", "plan", "--lat", "52.0", "--lon", "5.0", "--json"]);
    let ids: Vec<&str> = fences
        .as_array()
        .unwrap()
        .iter()
        .map(|f| f["request_id"].as_str().unwrap())
        .collect();
    assert!(ids.contains(&"MAGIC_UPDATE_FENCE"));
    assert!(ids.contains(&"1|Grote Kerk"));
    assert!(!ids.iter().any(|id| id.starts_with("2|")));
}

#[test]
fn test_geofence_enter_event_silences() {
    let home = seeded_home();
    let outcome = json(home.path(), &["geofence", "event", "3|Schouwburg", "enter"]);
    assert_eq!(outcome["result"], "reconciled");
    assert_eq!(outcome["outcome"]["outcome"], "activated");
    assert_eq!(outcome["outcome"]["zone_id"], 3);

    let ignored = json(home.path(), &["geofence", "event", "2|Bibliotheek", "enter"]);
    assert_eq!(ignored["result"], "ignored");
}

#[test]
fn test_heal_leaves_user_silence_alone() {
    let home = seeded_home();
    ok(home.path(), &["device", "silence", "priority"]);

    let outcome = json(home.path(), &["pass", "heal", "--lat", "52.005", "--lon", "5.0"]);
    assert_eq!(outcome, "success");

    let device = ok(home.path(), &["device", "show"]);
    assert!(device.contains("filter:     priority"));
    assert!(!device.contains("normal"));
    assert_eq!(json(home.path(), &["status", "--json"])["device_silent"], true);
}

#[test]
fn test_call_log_survives_invocations() {
    let home = seeded_home();
    ok(home.path(), &["pass", "live", "--lat", "52.0", "--lon", "5.0"]);
    ok(home.path(), &["pass", "live", "--lat", "52.005", "--lon", "5.0"]);

    let device = ok(home.path(), &["device", "show"]);
    assert!(device.contains("filter:     off"));
    assert!(device.contains("calls:      silent(priority), normal\n"));

    ok(home.path(), &["device", "reset-calls"]);
    let device = ok(home.path(), &["device", "show"]);
    assert!(device.contains("calls:      \n"));
}

#[test]
fn test_missing_permission_blocks_silencing() {
    let home = seeded_home();
    ok(home.path(), &["device", "permission", "off"]);
    let outcome = json(home.path(), &["pass", "live", "--lat", "52.0", "--lon", "5.0"]);
    assert_eq!(outcome["outcome"], "permission_denied");
    assert_eq!(json(home.path(), &["status", "--json"])["residency"]["active"], false);
}
