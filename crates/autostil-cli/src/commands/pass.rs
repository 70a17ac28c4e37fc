use std::sync::Arc;
use std::time::Duration;

use clap::Subcommand;

use autostil_core::position::UnavailablePosition;
use autostil_core::{FixedPosition, LiveTracker, ScriptedPositions};

use super::PositionArgs;
use crate::context::{print_json, runtime, CliResult, Context};

#[derive(Subcommand)]
pub enum PassAction {
    /// Run one live-tracking pass for a single fix
    Live {
        #[command(flatten)]
        at: PositionArgs,
    },
    /// Run one self-heal pass (refresh, reconcile, re-register fences)
    Heal {
        #[command(flatten)]
        at: PositionArgs,
    },
    /// Track a scripted route of fixes, e.g. "52.0,5.0;52.01,5.0"
    Track {
        #[arg(long)]
        script: String,
        /// Delay between fixes in milliseconds
        #[arg(long, default_value_t = 0)]
        interval_ms: u64,
    },
    /// Run the periodic self-heal worker for a number of cycles
    Worker {
        #[command(flatten)]
        at: PositionArgs,
        #[arg(long, default_value_t = 1)]
        cycles: usize,
        /// Period between cycles in milliseconds (defaults to worker.period_minutes)
        #[arg(long)]
        period_ms: Option<u64>,
    },
}

pub fn run(action: PassAction) -> CliResult {
    let ctx = Context::load()?;
    let result = execute(&ctx, action);
    ctx.finish(result)
}

fn execute(ctx: &Context, action: PassAction) -> CliResult {
    match action {
        PassAction::Live { at } => {
            let automation = ctx.automation(Arc::new(UnavailablePosition::default()))?;
            let outcome = automation.process_fix(&at.position())?;
            print_json(&outcome)?;
        }
        PassAction::Heal { at } => {
            let automation = ctx.automation(Arc::new(FixedPosition::new(at.lat, at.lon)))?;
            let outcome = runtime()?.block_on(automation.run_self_heal());
            print_json(&outcome)?;
        }
        PassAction::Track {
            script,
            interval_ms,
        } => {
            let coords = parse_script(&script)?;
            let source = Arc::new(
                ScriptedPositions::new(coords).with_interval(Duration::from_millis(interval_ms)),
            );
            let automation = Arc::new(ctx.automation(source.clone())?);
            let stats = LiveTracker::start(automation.clone(), source).join();
            print_json(&stats)?;
            print_json(&automation.reconciler().state())?;
        }
        PassAction::Worker {
            at,
            cycles,
            period_ms,
        } => {
            let period = match period_ms {
                Some(ms) => Duration::from_millis(ms.max(1)),
                None => Duration::from_secs(ctx.config.worker.period_minutes * 60),
            };
            let automation = ctx.automation(Arc::new(FixedPosition::new(at.lat, at.lon)))?;
            let outcomes = runtime()?.block_on(automation.run_worker(period, Some(cycles)));
            print_json(&outcomes)?;
        }
    }
    Ok(())
}

/// Parse `"lat,lon;lat,lon;..."`.
fn parse_script(script: &str) -> Result<Vec<(f64, f64)>, String> {
    script
        .split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|pair| {
            let (lat, lon) = pair
                .split_once(',')
                .ok_or_else(|| format!("expected lat,lon but got '{pair}'"))?;
            let lat = lat.trim().parse::<f64>().map_err(|_| format!("bad latitude '{lat}'"))?;
            let lon = lon.trim().parse::<f64>().map_err(|_| format!("bad longitude '{lon}'"))?;
            Ok((lat, lon))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_script() {
        let coords = parse_script("52.0,5.0; 52.01, -5.5;").unwrap();
        assert_eq!(coords, vec![(52.0, 5.0), (52.01, -5.5)]);
    }

    #[test]
    fn rejects_malformed_script() {
        assert!(parse_script("52.0").is_err());
        assert!(parse_script("north,5.0").is_err());
    }
}
