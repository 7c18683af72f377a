//! Command line arguments.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "tcsync")]
#[command(about = "Multiworld sync client for LEGO Star Wars: The Complete Saga")]
pub struct Cli {
    /// Log at debug level
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Attach to the game and keep it in sync with the session
    Run {
        /// Game table
        #[arg(short, long, env = "TCSYNC_CONFIG", default_value = "lsw_tcs.toml")]
        config: PathBuf,

        /// Directory shared with the multiworld bridge
        #[arg(short, long, env = "TCSYNC_SESSION_DIR", default_value = "session")]
        session_dir: PathBuf,

        /// Do not watch the terminal for stop keys
        #[arg(long)]
        no_keys: bool,
    },

    /// Load a game table and print what it defines
    Validate {
        /// Game table
        #[arg(short, long, default_value = "lsw_tcs.toml")]
        config: PathBuf,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_run_args() {
        let cli = Cli::try_parse_from([
            "tcsync",
            "run",
            "--config",
            "table.toml",
            "--session-dir",
            "bridge",
            "-v",
        ])
        .unwrap();
        assert!(cli.verbose);
        match cli.command {
            Commands::Run {
                config,
                session_dir,
                no_keys,
            } => {
                assert_eq!(config, PathBuf::from("table.toml"));
                assert_eq!(session_dir, PathBuf::from("bridge"));
                assert!(!no_keys);
            }
            Commands::Validate { .. } => panic!("expected run"),
        }
    }
}
