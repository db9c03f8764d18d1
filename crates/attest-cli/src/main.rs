//! Attest CLI - registry credential management for the attest signing tool.

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

use commands::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let default_filter = if cli.debug { "attest=debug" } else { "attest=info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match cli.command {
        Commands::Login(args) => commands::login::run(&args, cli.debug).await,
        Commands::Logout(args) => commands::logout::run(&args),
        Commands::Check(args) => commands::check::run(&args, cli.debug).await,
        Commands::Version => {
            println!("attest {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}
