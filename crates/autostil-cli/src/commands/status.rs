use std::sync::Arc;

use autostil_core::position::UnavailablePosition;

use crate::context::{print_json, CliResult, Context};

pub fn run(json: bool) -> CliResult {
    let ctx = Context::load()?;
    let automation = ctx.automation(Arc::new(UnavailablePosition::default()))?;
    let status = automation.status()?;

    if json {
        return print_json(&status);
    }

    let residency = &status.residency;
    println!("Mode:      {:?}", status.override_mode);
    match residency.resident_zone() {
        Some(zone_id) => println!("Residency: zone {zone_id}"),
        None if residency.is_orphaned_claim() => println!("Residency: claimed, no zone"),
        None => println!("Residency: none"),
    }
    println!("Since:     {}", residency.updated_at.to_rfc3339());
    println!(
        "Device:    {}",
        if status.device_silent { "silent" } else { "sound on" }
    );
    println!(
        "Catalog:   {} zones (version {})",
        status.catalog_zones, status.catalog_timestamp
    );
    println!("Ignored:   {} zones", status.ignored_zones);
    Ok(())
}
