use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod context;

#[derive(Parser)]
#[command(name = "autostil", version, about = "AutoStil CLI")]
struct Cli {
    /// Log at debug level (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
    /// Zone catalog management
    Catalog {
        #[command(subcommand)]
        action: commands::catalog::CatalogAction,
    },
    /// Ignore list management
    Ignore {
        #[command(subcommand)]
        action: commands::ignore::IgnoreAction,
    },
    /// Run reconciliation passes
    Pass {
        #[command(subcommand)]
        action: commands::pass::PassAction,
    },
    /// Geofence planning and transitions
    Geofence {
        #[command(subcommand)]
        action: commands::geofence::GeofenceAction,
    },
    /// Set the manual override mode (auto, force_sound, force_silent)
    Mode {
        mode: String,
    },
    /// Simulated device controls
    Device {
        #[command(subcommand)]
        action: commands::device::DeviceAction,
    },
    /// Show residency, device and catalog status
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match cli.command {
        Commands::Config { action } => commands::config::run(action),
        Commands::Catalog { action } => commands::catalog::run(action),
        Commands::Ignore { action } => commands::ignore::run(action),
        Commands::Pass { action } => commands::pass::run(action),
        Commands::Geofence { action } => commands::geofence::run(action),
        Commands::Mode { mode } => commands::mode::run(&mode),
        Commands::Device { action } => commands::device::run(action),
        Commands::Status { json } => commands::status::run(json),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
