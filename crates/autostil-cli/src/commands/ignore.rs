use std::sync::Arc;

use clap::Subcommand;

use autostil_core::position::UnavailablePosition;
use autostil_core::ZoneId;

use super::PositionArgs;
use crate::context::{print_json, CliResult, Context};

#[derive(Subcommand)]
pub enum IgnoreAction {
    /// Ignore zones by id
    Add {
        #[arg(required = true)]
        ids: Vec<ZoneId>,
    },
    /// Stop ignoring a zone
    Remove { id: ZoneId },
    /// List ignored zone ids
    List,
    /// Remove every zone from the ignore list
    Clear,
    /// Ignore the zone the device is currently silenced for
    Current,
    /// Show every zone within 150 m (all categories) that is not yet ignored
    Scan {
        #[command(flatten)]
        at: PositionArgs,
        /// Ignore everything found
        #[arg(long)]
        apply: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

pub fn run(action: IgnoreAction) -> CliResult {
    let ctx = Context::load()?;
    let result = execute(&ctx, action);
    ctx.finish(result)
}

fn execute(ctx: &Context, action: IgnoreAction) -> CliResult {
    let automation = ctx.automation(Arc::new(UnavailablePosition::default()))?;

    match action {
        IgnoreAction::Add { ids } => {
            let outcome = automation.ignore_all(&ids)?;
            println!("ignored {} zone(s)", ids.len());
            if outcome.is_change() {
                println!("left current zone, sound restored");
            }
        }
        IgnoreAction::Remove { id } => {
            if automation.unignore(id)? {
                println!("zone {id} no longer ignored");
            } else {
                println!("zone {id} was not ignored");
            }
        }
        IgnoreAction::List => {
            for id in automation.ignored_zones()? {
                println!("{id}");
            }
        }
        IgnoreAction::Clear => {
            let n = automation.clear_ignored()?;
            println!("cleared {n} zone(s)");
        }
        IgnoreAction::Current => match automation.ignore_current_zone()? {
            Some(id) => println!("zone {id} ignored, sound restored"),
            None => println!("not in a zone"),
        },
        IgnoreAction::Scan { at, apply, json } => {
            let found = automation.scan_safe_zone(&at.position())?;
            if json {
                print_json(&found)?;
            } else if found.is_empty() {
                println!("no zones nearby");
            } else {
                for m in &found {
                    println!(
                        "{:>8}  {:>6.1} m  {:<10}  {}",
                        m.zone.id,
                        m.distance_m,
                        m.zone.category,
                        m.zone.display_name()
                    );
                }
            }
            if apply && !found.is_empty() {
                let ids: Vec<ZoneId> = found.iter().map(|m| m.zone.id).collect();
                automation.ignore_all(&ids)?;
                if !json {
                    println!("ignored {} zone(s)", ids.len());
                }
            }
        }
    }
    Ok(())
}
