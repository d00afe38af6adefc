//! CLI tool for Sluice.
//!
//! Provides commands for:
//! - stream: Open an event stream and print each dispatched event
//! - status: Poll a backend status endpoint with adaptive backoff

mod commands;

use clap::{Parser, Subcommand};
use commands::{status, stream};
use sluice_core::SluiceError;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "sluice")]
#[command(about = "CLI tool for Sluice event streams and backend status", long_about = None)]
#[command(version)]
struct Cli {
    /// Enable debug logging (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Stream a chat response and print its events
    Stream(stream::StreamArgs),
    /// Poll backend status until interrupted
    Status(status::StatusArgs),
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "sluice=debug" } else { "sluice=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Map a command failure to the process exit code.
///
/// 2 for bad input or configuration, 3 for network failures, 4 for a bad
/// server answer, 1 otherwise.
fn exit_code(err: &anyhow::Error) -> i32 {
    let typed = err.chain().find_map(|cause| cause.downcast_ref::<SluiceError>());
    match typed {
        Some(SluiceError::Config(_)) => 2,
        Some(SluiceError::Transport(_) | SluiceError::Timeout(_)) => 3,
        Some(SluiceError::Status(_) | SluiceError::Payload(_) | SluiceError::Framing(_)) => 4,
        Some(SluiceError::Cancelled) => 1,
        None if format!("{:#}", err).contains("Invalid input") => 2,
        None => 1,
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match cli.command {
        Commands::Stream(args) => stream::run(args).await,
        Commands::Status(args) => status::run(args).await,
    };

    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        std::process::exit(exit_code(&e));
    }
}
