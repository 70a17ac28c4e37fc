use clap::{Subcommand, ValueEnum};

use autostil_core::device::DeviceCall;
use autostil_core::SilentStrength;

use crate::context::{CliResult, Context};

#[derive(Clone, Copy, ValueEnum)]
pub enum Toggle {
    On,
    Off,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum Filter {
    Priority,
    Total,
    Off,
}

#[derive(Subcommand)]
pub enum DeviceAction {
    /// Show the simulated device
    Show,
    /// Grant or revoke notification policy access
    Permission { state: Toggle },
    /// Change the interruption filter by hand, as the user would
    Silence { filter: Filter },
    /// Forget the recorded actuator calls
    ResetCalls,
}

pub fn run(action: DeviceAction) -> CliResult {
    let ctx = Context::load()?;
    let result = execute(&ctx, action);
    ctx.finish(result)
}

fn execute(ctx: &Context, action: DeviceAction) -> CliResult {
    let device = &ctx.device;

    match action {
        DeviceAction::Show => {
            let snapshot = device.snapshot();
            println!(
                "permission: {}",
                if snapshot.permission { "granted" } else { "missing" }
            );
            match snapshot.silent {
                Some(SilentStrength::Priority) => println!("filter:     priority"),
                Some(SilentStrength::Total) => println!("filter:     total"),
                None => println!("filter:     off"),
            }
            let calls: Vec<String> = device
                .calls()
                .iter()
                .map(|call| match call {
                    DeviceCall::SetSilent(SilentStrength::Priority) => "silent(priority)".into(),
                    DeviceCall::SetSilent(SilentStrength::Total) => "silent(total)".into(),
                    DeviceCall::SetNormal => "normal".into(),
                })
                .collect();
            println!("calls:      {}", calls.join(", "));
        }
        DeviceAction::Permission { state } => {
            device.set_permission(matches!(state, Toggle::On));
            println!("ok");
        }
        DeviceAction::Silence { filter } => {
            device.set_manual_silent(match filter {
                Filter::Priority => Some(SilentStrength::Priority),
                Filter::Total => Some(SilentStrength::Total),
                Filter::Off => None,
            });
            println!("ok");
        }
        DeviceAction::ResetCalls => {
            device.clear_calls();
            println!("ok");
        }
    }
    Ok(())
}
