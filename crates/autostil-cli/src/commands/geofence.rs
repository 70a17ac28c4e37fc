use std::sync::Arc;

use clap::Subcommand;

use autostil_core::geofence::{GeofenceEvent, GeofencePlanner, TransitionKind};
use autostil_core::position::{PositionSource, UnavailablePosition};
use autostil_core::proximity::{self, WIDE_WINDOW_DEG};
use autostil_core::FixedPosition;

use super::PositionArgs;
use crate::context::{print_json, CliResult, Context};

#[derive(Subcommand)]
pub enum GeofenceAction {
    /// Show the fences that would be registered around a position
    Plan {
        #[command(flatten)]
        at: PositionArgs,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Deliver a platform transition for a fence
    Event {
        /// Fence request id, "<zone id>|<name>" or MAGIC_UPDATE_FENCE
        request_id: String,
        /// enter, exit or dwell
        transition: TransitionKind,
        /// Current latitude, used when the update fence is left
        #[arg(long, allow_negative_numbers = true, requires = "lon")]
        lat: Option<f64>,
        /// Current longitude
        #[arg(long, allow_negative_numbers = true, requires = "lat")]
        lon: Option<f64>,
    },
}

pub fn run(action: GeofenceAction) -> CliResult {
    let ctx = Context::load()?;

    match action {
        GeofenceAction::Plan { at, json } => {
            let position = at.position();
            position.validate()?;
            let ignored = ctx.user_db()?.ignored_ids()?;
            let candidates = proximity::candidates(
                &ctx.catalog()?,
                &ignored,
                &ctx.config.zones.active_categories,
                &position,
                WIDE_WINDOW_DEG,
            )?;
            let fences = GeofencePlanner::from_config(&ctx.config).plan(&position, &candidates);

            if json {
                return print_json(&fences);
            }
            for fence in &fences {
                let transitions: Vec<&str> = fence.transitions.iter().map(|t| t.as_str()).collect();
                println!(
                    "{:<32}  {:>9.5} {:>10.5}  {:>6.0} m  {}",
                    fence.request_id,
                    fence.lat,
                    fence.lon,
                    fence.radius_m,
                    transitions.join("+")
                );
            }
        }
        GeofenceAction::Event {
            request_id,
            transition,
            lat,
            lon,
        } => {
            let positions: Arc<dyn PositionSource> = match (lat, lon) {
                (Some(lat), Some(lon)) => Arc::new(FixedPosition::new(lat, lon)),
                _ => Arc::new(UnavailablePosition::default()),
            };
            let automation = ctx.automation(positions)?;
            let result = automation
                .on_geofence_event(&GeofenceEvent {
                    request_id,
                    transition,
                })
                .map_err(Into::into)
                .and_then(|outcome| print_json(&outcome));
            return ctx.finish(result);
        }
    }
    Ok(())
}
