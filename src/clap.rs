//! Command line interface
//!
//! Author: arkSong <arksong2018@gmail.com>
//! Version: 0.3.0-alpha
//! Date: 2025-07-02

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Version string, with `BEACON_VERSION_EXTRA` appended when set at build time
pub fn version() -> String {
    let cargo_pkg_version = env!("CARGO_PKG_VERSION");

    match option_env!("BEACON_VERSION_EXTRA") {
        Some(x) => format!("{} ({})", cargo_pkg_version, x),
        None => cargo_pkg_version.to_owned(),
    }
}

/// Beacon discovery core
#[derive(Parser, Debug, Clone, PartialEq, Eq)]
#[clap(about, version, name = "beacon")]
pub struct Args {
    /// Path to configuration file
    #[clap(short, long, global = true, env = "BEACON_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log filter override, e.g. `info` or `beacon=debug`
    #[clap(short, long, global = true)]
    pub log_level: Option<String>,

    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Run the maintenance scheduler until interrupted
    Run,

    /// Deactivate expired broadcasts once
    Sweep,

    /// Hard-delete broadcasts inactive for longer than the retention
    Purge {
        /// Retention in days; defaults to `broadcast.retention_days`
        #[clap(long)]
        days: Option<u32>,
    },

    /// Create the database schema and seed default weights
    Migrate,

    /// Ranking weight management
    Weights {
        #[clap(subcommand)]
        action: WeightsCommands,
    },

    /// Presence maintenance
    Presence {
        #[clap(subcommand)]
        action: PresenceCommands,
    },
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum WeightsCommands {
    /// Print the current weights
    Show,
    /// Restore the default weights
    Reset,
    /// Check whether the current weights sum to roughly one
    Validate,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum PresenceCommands {
    /// Mark users without a recent heartbeat as offline
    Expire,
}

/// Parse command line arguments into structured data
pub fn parse() -> Args {
    Args::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_contains_package_version() {
        assert!(version().contains(env!("CARGO_PKG_VERSION")));
    }

    #[test]
    fn test_parse_purge_days() {
        let args = Args::try_parse_from(["beacon", "purge", "--days", "7"]).unwrap();
        assert_eq!(args.command, Commands::Purge { days: Some(7) });
    }

    #[test]
    fn test_parse_nested_commands() {
        let args = Args::try_parse_from(["beacon", "--log-level", "debug", "weights", "show"]).unwrap();
        assert_eq!(args.log_level.as_deref(), Some("debug"));
        assert_eq!(
            args.command,
            Commands::Weights {
                action: WeightsCommands::Show
            }
        );

        let args = Args::try_parse_from(["beacon", "presence", "expire"]).unwrap();
        assert_eq!(
            args.command,
            Commands::Presence {
                action: PresenceCommands::Expire
            }
        );
    }

    #[test]
    fn test_missing_subcommand_fails() {
        assert!(Args::try_parse_from(["beacon"]).is_err());
    }
}
