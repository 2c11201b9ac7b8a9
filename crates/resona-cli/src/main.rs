//! Resona CLI - command-line interface for the resona audio engine.

mod commands;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "resona")]
#[command(author, version, about = "Resona audio engine CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Batch-process audio files through an effect chain
    Process(commands::process::ProcessArgs),

    /// Run live input monitoring through the realtime engine
    Monitor(commands::monitor::MonitorArgs),

    /// List available audio devices
    Devices(commands::devices::DevicesArgs),
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Process(args) => commands::process::run(args),
        Commands::Monitor(args) => commands::monitor::run(args),
        Commands::Devices(args) => commands::devices::run(args),
    }
}
