pub mod catalog;
pub mod config;
pub mod device;
pub mod geofence;
pub mod ignore;
pub mod mode;
pub mod pass;
pub mod status;

use clap::Args;

use autostil_core::Position;

/// A coordinate given on the command line.
#[derive(Args, Debug, Clone, Copy)]
pub struct PositionArgs {
    /// Latitude in decimal degrees
    #[arg(long, allow_negative_numbers = true)]
    pub lat: f64,
    /// Longitude in decimal degrees
    #[arg(long, allow_negative_numbers = true)]
    pub lon: f64,
}

impl PositionArgs {
    pub fn position(&self) -> Position {
        Position::new(self.lat, self.lon)
    }
}
