mod cli;
mod commands;
mod input;
mod session;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Commands};

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive(format!("tcsync={}", level).parse()?),
        )
        .init();

    match cli.command {
        Commands::Run {
            config,
            session_dir,
            no_keys,
        } => commands::run::run(&config, &session_dir, !no_keys),
        Commands::Validate { config } => commands::validate::run(&config),
    }
}
