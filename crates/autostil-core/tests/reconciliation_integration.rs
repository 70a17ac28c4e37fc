//! Integration tests for residency reconciliation across triggers,
//! restarts and concurrent passes.

use std::path::Path;
use std::sync::Arc;
use std::thread;

use autostil_core::catalog::CATALOG_FILE;
use autostil_core::device::{DeviceCall, RecordingHaptics, SimulatedDevice};
use autostil_core::geofence::RecordingRegistrar;
use autostil_core::storage::USER_DB_FILE;
use autostil_core::{
    Automation, CatalogDb, Config, FixedPosition, GeofenceEvent, HapticCue, Outcome, Position,
    PositionSource, ResidencyStore, SourceOfTruth, TransitionKind, UserDb, WorkOutcome, Zone,
    SoundActuator, ZoneCategory,
};

fn seed_catalog(dir: &Path) {
    let catalog = CatalogDb::open(dir.join(CATALOG_FILE)).unwrap();
    catalog
        .replace_all(&[
            Zone {
                id: 100,
                name: Some("Sint-Janskathedraal".to_string()),
                category: ZoneCategory::Church,
                lat: 51.6889,
                lon: 5.3094,
                address: Some("Torenstraat 16".to_string()),
            },
            Zone {
                id: 200,
                name: Some("Theater aan de Parade".to_string()),
                category: ZoneCategory::Theater,
                lat: 51.6880,
                lon: 5.3030,
                address: None,
            },
        ])
        .unwrap();
}

fn open_automation(
    dir: &Path,
    device: Arc<SimulatedDevice>,
    positions: Arc<dyn PositionSource>,
) -> Automation {
    Automation::new(
        CatalogDb::open(dir.join(CATALOG_FILE)).unwrap(),
        UserDb::open(dir.join(USER_DB_FILE)).unwrap(),
        Config::default(),
        device,
        Arc::new(RecordingRegistrar::new()),
        positions,
    )
    .unwrap()
}

#[test]
fn test_triggers_share_one_residency() {
    let dir = tempfile::tempdir().unwrap();
    seed_catalog(dir.path());
    let device = Arc::new(SimulatedDevice::new());
    let haptics = Arc::new(RecordingHaptics::new());
    let automation = open_automation(
        dir.path(),
        device.clone(),
        Arc::new(FixedPosition::new(51.6889, 5.3094)),
    )
    .with_haptics(haptics.clone());

    // Geofence enter silences.
    let enter = GeofenceEvent {
        request_id: "100|Sint-Janskathedraal".to_string(),
        transition: TransitionKind::Enter,
    };
    automation.on_geofence_event(&enter).unwrap();

    // A live fix at the same place agrees: no second toggle.
    let outcome = automation
        .process_fix(&Position::new(51.6889, 5.3094))
        .unwrap();
    assert_eq!(outcome, Outcome::Unchanged);

    // Walking to the theater switches zones.
    let outcome = automation
        .process_fix(&Position::new(51.6880, 5.3030))
        .unwrap();
    assert_eq!(outcome, Outcome::Activated { zone_id: 200 });

    // Leaving everything restores sound.
    let outcome = automation
        .process_fix(&Position::new(51.70, 5.33))
        .unwrap();
    assert_eq!(outcome, Outcome::Deactivated { zone_id: Some(200) });

    assert_eq!(
        device.calls(),
        vec![
            DeviceCall::SetSilent(Default::default()),
            DeviceCall::SetSilent(Default::default()),
            DeviceCall::SetNormal,
        ]
    );
    assert_eq!(
        haptics.cues(),
        vec![HapticCue::Enter, HapticCue::Enter, HapticCue::Exit]
    );
}

#[test]
fn test_residency_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    seed_catalog(dir.path());
    let device = Arc::new(SimulatedDevice::new());

    {
        let automation = open_automation(
            dir.path(),
            device.clone(),
            Arc::new(FixedPosition::new(51.6889, 5.3094)),
        );
        automation
            .process_fix(&Position::new(51.6889, 5.3094))
            .unwrap();
    }

    let state = UserDb::open(dir.path().join(USER_DB_FILE))
        .unwrap()
        .load()
        .unwrap();
    assert!(state.active);
    assert_eq!(state.zone_id, Some(100));

    // After restart the leave is still detected.
    let automation = open_automation(
        dir.path(),
        device.clone(),
        Arc::new(FixedPosition::new(51.70, 5.33)),
    );
    let outcome = automation
        .process_fix(&Position::new(51.70, 5.33))
        .unwrap();
    assert_eq!(outcome, Outcome::Deactivated { zone_id: Some(100) });
    assert!(!device.is_silent_active());
}

#[tokio::test]
async fn test_self_heal_recovers_orphaned_claim() {
    let dir = tempfile::tempdir().unwrap();
    seed_catalog(dir.path());

    // The process died after claiming and silencing, before recording
    // residency.
    {
        let mut db = UserDb::open(dir.path().join(USER_DB_FILE)).unwrap();
        db.save(&autostil_core::ResidencyState::claim(chrono::Utc::now()))
            .unwrap();
    }
    let device = Arc::new(SimulatedDevice::new());
    device.set_manual_silent(Some(Default::default()));

    let automation = open_automation(
        dir.path(),
        device.clone(),
        Arc::new(FixedPosition::new(51.70, 5.33)),
    );
    assert_eq!(automation.run_self_heal().await, WorkOutcome::Success);

    assert!(!device.is_silent_active());
    assert_eq!(device.calls(), vec![DeviceCall::SetNormal]);
    let state = automation.reconciler().state();
    assert_eq!(state.source, SourceOfTruth::None);
}

#[tokio::test]
async fn test_self_heal_respects_user_silence() {
    let dir = tempfile::tempdir().unwrap();
    seed_catalog(dir.path());
    let device = Arc::new(SimulatedDevice::new());
    device.set_manual_silent(Some(Default::default()));

    let automation = open_automation(
        dir.path(),
        device.clone(),
        Arc::new(FixedPosition::new(51.70, 5.33)),
    );
    assert_eq!(automation.run_self_heal().await, WorkOutcome::Success);
    assert!(device.is_silent_active());
    assert!(device.calls().is_empty());
}

#[test]
fn test_concurrent_passes_are_serialized() {
    let dir = tempfile::tempdir().unwrap();
    seed_catalog(dir.path());
    let device = Arc::new(SimulatedDevice::new());
    let automation = Arc::new(open_automation(
        dir.path(),
        device.clone(),
        Arc::new(FixedPosition::new(51.6889, 5.3094)),
    ));

    let handles: Vec<_> = (0..8)
        .map(|t| {
            let automation = automation.clone();
            thread::spawn(move || {
                for i in 0..25 {
                    let inside = (t + i) % 2 == 0;
                    let pos = if inside {
                        Position::new(51.6889, 5.3094)
                    } else {
                        Position::new(51.70, 5.33)
                    };
                    automation.process_fix(&pos).unwrap();
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    let state = automation.reconciler().state();
    assert!(state.is_consistent());
    assert_eq!(state.active, device.is_silent_active());

    // Only one zone is involved, so silence and sound must alternate.
    let calls = device.calls();
    for pair in calls.windows(2) {
        assert_ne!(pair[0], pair[1], "double toggle in {calls:?}");
    }
}
