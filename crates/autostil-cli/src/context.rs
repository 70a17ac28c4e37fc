//! Shared setup for commands: data directory, config, stores and the
//! simulated device that stands in for the phone.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use autostil_core::catalog::CATALOG_FILE;
use autostil_core::device::{HapticCue, Haptics, StatusNotifier, StatusUpdate};
use autostil_core::geofence::RecordingRegistrar;
use autostil_core::storage::{data_dir, USER_DB_FILE};
use autostil_core::{
    Automation, CatalogDb, CatalogUpdater, Config, CoreError, PositionSource, SimulatedDevice,
    UserDb,
};
use tracing::info;

pub type CliResult = Result<(), Box<dyn std::error::Error>>;

/// Prints status updates the way the ongoing notification would show them.
struct LogNotifier;

impl StatusNotifier for LogNotifier {
    fn publish(&self, update: &StatusUpdate) {
        if !update.permission_granted {
            info!("status: notification policy access required");
            return;
        }
        match (&update.zone_name, update.silent) {
            (Some(name), true) => {
                let promotion = update.promotion.as_ref().map(|p| p.text.as_str());
                info!(zone = %name, ?promotion, "status: silenced");
            }
            (None, true) => info!(manual = update.manual, "status: silent"),
            (_, false) => info!(manual = update.manual, "status: sound on"),
        }
    }
}

struct LogHaptics;

impl Haptics for LogHaptics {
    fn cue(&self, cue: HapticCue) {
        info!(?cue, pattern = ?cue.pattern(), "vibrate");
    }
}

pub struct Context {
    pub dir: PathBuf,
    pub config: Config,
    pub device: Arc<SimulatedDevice>,
}

impl Context {
    pub fn load() -> Result<Self, CoreError> {
        let dir = data_dir()?;
        let config = Config::load_from(&dir.join("config.toml"))?;
        let device = Arc::new(SimulatedDevice::load(&UserDb::open(
            dir.join(USER_DB_FILE),
        )?)?);
        Ok(Self {
            dir,
            config,
            device,
        })
    }

    pub fn config_path(&self) -> PathBuf {
        self.dir.join("config.toml")
    }

    pub fn catalog_path(&self) -> PathBuf {
        self.dir.join(CATALOG_FILE)
    }

    pub fn catalog(&self) -> Result<CatalogDb, CoreError> {
        Ok(CatalogDb::open(self.catalog_path())?)
    }

    pub fn user_db(&self) -> Result<UserDb, CoreError> {
        Ok(UserDb::open(self.dir.join(USER_DB_FILE))?)
    }

    /// Full service around the simulated device.
    pub fn automation(&self, positions: Arc<dyn PositionSource>) -> Result<Automation, CoreError> {
        let updater = CatalogUpdater::new(
            &self.config.catalog.base_url,
            self.catalog_path(),
            Duration::from_secs(self.config.catalog.timeout_secs),
        )?;
        Ok(Automation::new(
            self.catalog()?,
            self.user_db()?,
            self.config.clone(),
            self.device.clone(),
            Arc::new(RecordingRegistrar::new()),
            positions,
        )?
        .with_notifier(Arc::new(LogNotifier))
        .with_haptics(Arc::new(LogHaptics))
        .with_updater(updater)
        .with_config_path(self.config_path()))
    }

    /// Persist the simulated device for the next invocation.
    pub fn save_device(&self) -> Result<(), CoreError> {
        self.device.save(&self.user_db()?)?;
        Ok(())
    }

    /// Save the device after a command body, then report the body's result.
    /// The device is saved even when the body failed part way.
    pub fn finish(&self, result: CliResult) -> CliResult {
        let saved = self.save_device();
        result?;
        Ok(saved?)
    }
}

/// Build a tokio runtime for async commands.
pub fn runtime() -> Result<tokio::runtime::Runtime, std::io::Error> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
}

/// Print any serializable value as a single JSON line.
pub fn print_json<T: serde::Serialize>(value: &T) -> CliResult {
    println!("{}", serde_json::to_string(value)?);
    Ok(())
}
