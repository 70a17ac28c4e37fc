use std::sync::Arc;

use autostil_core::position::UnavailablePosition;
use autostil_core::OverrideMode;

use crate::context::{print_json, CliResult, Context};

pub fn run(mode: &str) -> CliResult {
    let mode = parse_mode(mode)?;
    let ctx = Context::load()?;
    let result = apply_mode(&ctx, mode);
    ctx.finish(result)
}

fn apply_mode(ctx: &Context, mode: OverrideMode) -> CliResult {
    let automation = ctx.automation(Arc::new(UnavailablePosition::default()))?;
    let outcome = automation.set_override_mode(mode)?;
    print_json(&outcome)
}

fn parse_mode(raw: &str) -> Result<OverrideMode, String> {
    let normalized = raw.trim().to_ascii_lowercase().replace('-', "_");
    serde_json::from_value(serde_json::Value::String(normalized))
        .map_err(|_| format!("unknown mode '{raw}' (expected auto, force_sound or force_silent)"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_modes() {
        assert_eq!(parse_mode("auto").unwrap(), OverrideMode::Auto);
        assert_eq!(parse_mode("force-sound").unwrap(), OverrideMode::ForceSound);
        assert_eq!(parse_mode("FORCE_SILENT").unwrap(), OverrideMode::ForceSilent);
        assert!(parse_mode("loud").is_err());
    }
}
