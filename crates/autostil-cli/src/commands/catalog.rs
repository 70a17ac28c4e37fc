use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Subcommand;

use autostil_core::position::UnavailablePosition;
use autostil_core::proximity::{self, LIVE_WINDOW_DEG};
use autostil_core::{RefreshOutcome, ZoneCategory};

use super::PositionArgs;
use crate::context::{print_json, runtime, CliResult, Context};

#[derive(Subcommand)]
pub enum CatalogAction {
    /// Replace the catalog with zones from a JSON file
    Import {
        /// JSON array of zones
        file: PathBuf,
    },
    /// Download a newer catalog snapshot
    Refresh {
        /// Download even when the local snapshot is current
        #[arg(long)]
        force: bool,
    },
    /// Show catalog size and version
    Stats,
    /// List zones near a position, nearest first
    Nearby {
        #[command(flatten)]
        at: PositionArgs,
        /// Search radius in meters
        #[arg(long, default_value_t = 500.0)]
        radius: f64,
        /// Include every category, not just the active ones
        #[arg(long)]
        all: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

pub fn run(action: CatalogAction) -> CliResult {
    let ctx = Context::load()?;
    match action {
        CatalogAction::Import { file } => {
            let json = std::fs::read_to_string(&file)?;
            let count = ctx.catalog()?.import_json(&json)?;
            println!("imported {count} zones");
        }
        CatalogAction::Refresh { force } => {
            let automation = ctx.automation(Arc::new(UnavailablePosition::default()))?;
            let outcome = runtime()?.block_on(automation.refresh_catalog(force));
            match &outcome {
                RefreshOutcome::Updated { timestamp, region } => {
                    println!("catalog updated: region {region}, version {timestamp}")
                }
                RefreshOutcome::Unchanged => println!("catalog is up to date"),
                RefreshOutcome::Failed { reason } => {
                    println!("catalog refresh failed, keeping existing catalog: {reason}")
                }
            }
        }
        CatalogAction::Stats => {
            let count = ctx.catalog()?.count()?;
            let version = ctx.user_db()?.catalog_timestamp()?;
            println!("zones:   {count}");
            println!("version: {version}");
            println!("path:    {}", ctx.catalog_path().display());
        }
        CatalogAction::Nearby {
            at,
            radius,
            all,
            json,
        } => {
            let position = at.position();
            position.validate()?;
            let categories: Vec<ZoneCategory> = if all {
                ZoneCategory::ALL.to_vec()
            } else {
                ctx.config.zones.active_categories.clone()
            };
            // Wide enough to cover the radius at any latitude we care about.
            let window = (radius / 111_000.0).max(LIVE_WINDOW_DEG) * 2.0;
            let candidates = proximity::candidates(
                &ctx.catalog()?,
                &BTreeSet::new(),
                &categories,
                &position,
                window,
            )?;
            let found = proximity::zones_within(&position, &candidates, radius);

            if json {
                return print_json(&found);
            }
            if found.is_empty() {
                println!("no zones within {radius} m");
            }
            for m in &found {
                println!(
                    "{:>8}  {:>7.1} m  {:<10}  {}",
                    m.zone.id,
                    m.distance_m,
                    m.zone.category,
                    m.zone.display_name()
                );
            }
        }
    }
    Ok(())
}
