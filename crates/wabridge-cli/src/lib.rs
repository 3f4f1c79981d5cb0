//! wabridge command-line interface.

pub mod commands;
pub mod logging;
pub mod runtime;

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use wabridge_core::Config;

/// wabridge - WhatsApp to CRM message bridge
#[derive(Parser)]
#[command(name = "wabridge")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Increase logging verbosity
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Path to config file
    #[arg(short, long, env = "WABRIDGE_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP gateway and bridge every configured session
    Serve(commands::serve::ServeArgs),

    /// Show mapping counts for a session
    Stats {
        /// Messaging session id
        session: String,
    },

    /// Re-drive pending inbound mappings of a session
    Retry {
        /// Messaging session id
        session: String,

        /// Maximum mappings to process
        #[arg(short, long, default_value_t = 50)]
        limit: usize,
    },

    /// List failed mappings of a session
    Failed {
        /// Messaging session id
        session: String,

        /// Maximum mappings to list
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },

    /// Deliver a failed inbound mapping again
    Resync {
        /// Messaging session id
        session: String,

        /// Id of the failed mapping, as logged when its delivery failed
        mapping_id: String,
    },

    /// Delete old mappings of a session
    Cleanup {
        /// Messaging session id
        session: String,

        /// Delete mappings older than this many days (defaults to bridge.retention_days)
        #[arg(short, long, value_parser = clap::value_parser!(u32).range(1..))]
        days: Option<u32>,
    },

    /// Configuration management
    Config(commands::config::ConfigArgs),

    /// Show how a phone number is keyed
    Phone {
        /// Raw phone number or JID
        raw: String,
    },

    /// Show version information
    Version,
}

/// Load the config from `path`, or from the default location when absent.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    let config = match path {
        Some(path) => {
            let mut config = Config::load(path)?;
            config.apply_env_overrides();
            config
        }
        None => Config::load_or_default()?,
    };
    Ok(config)
}

/// Run the CLI with the given arguments.
pub async fn run(cli: Cli, config: Config) -> anyhow::Result<()> {
    match cli.command {
        Commands::Serve(args) => commands::serve::run(args, config).await,
        Commands::Stats { session } => commands::maintenance::stats(&config, &session).await,
        Commands::Retry { session, limit } => {
            commands::maintenance::retry(&config, &session, limit).await
        }
        Commands::Failed { session, limit } => {
            commands::maintenance::failed(&config, &session, limit).await
        }
        Commands::Resync { session, mapping_id } => {
            commands::maintenance::resync(&config, &session, &mapping_id).await
        }
        Commands::Cleanup { session, days } => {
            let days = days.unwrap_or(config.bridge.retention_days);
            commands::maintenance::cleanup(&config, &session, days).await
        }
        Commands::Config(args) => commands::config::run(args, &config, cli.config.as_deref()),
        Commands::Phone { raw } => commands::phone::run(&config, &raw),
        Commands::Version => {
            println!("wabridge {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_parse_version() {
        let cli = Cli::try_parse_from(["wabridge", "version"]).unwrap();
        assert!(matches!(cli.command, Commands::Version));
    }

    #[test]
    fn test_parse_serve_overrides() {
        let cli = Cli::try_parse_from(["wabridge", "serve", "--port", "9090", "--bind", "lan"]).unwrap();
        match cli.command {
            Commands::Serve(args) => {
                assert_eq!(args.port, Some(9090));
                assert_eq!(args.bind.as_deref(), Some("lan"));
            }
            _ => panic!("Expected Serve command"),
        }
    }

    #[test]
    fn test_parse_retry_default_limit() {
        let cli = Cli::try_parse_from(["wabridge", "retry", "main"]).unwrap();
        match cli.command {
            Commands::Retry { session, limit } => {
                assert_eq!(session, "main");
                assert_eq!(limit, 50);
            }
            _ => panic!("Expected Retry command"),
        }
    }

    #[test]
    fn test_parse_resync() {
        let cli = Cli::try_parse_from(["wabridge", "resync", "main", "b3c1"]).unwrap();
        match cli.command {
            Commands::Resync { session, mapping_id } => {
                assert_eq!(session, "main");
                assert_eq!(mapping_id, "b3c1");
            }
            _ => panic!("Expected Resync command"),
        }
        assert!(Cli::try_parse_from(["wabridge", "resync", "main"]).is_err());
    }

    #[test]
    fn test_parse_cleanup_rejects_zero_days() {
        assert!(Cli::try_parse_from(["wabridge", "cleanup", "main", "--days", "0"]).is_err());

        let cli = Cli::try_parse_from(["wabridge", "cleanup", "main", "--days", "30"]).unwrap();
        assert!(matches!(cli.command, Commands::Cleanup { days: Some(30), .. }));
    }

    #[test]
    fn test_parse_config_show() {
        let cli = Cli::try_parse_from(["wabridge", "config", "show"]).unwrap();
        match cli.command {
            Commands::Config(args) => {
                assert!(matches!(args.command, commands::config::ConfigCommand::Show));
            }
            _ => panic!("Expected Config command"),
        }
    }

    #[test]
    fn test_parse_global_config_path() {
        let cli = Cli::try_parse_from(["wabridge", "-c", "/tmp/w.json5", "-vv", "phone", "11987654321"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/w.json5")));
        assert_eq!(cli.verbose, 2);
        assert!(matches!(cli.command, Commands::Phone { .. }));
    }

    #[test]
    fn test_load_config_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wabridge.json5");
        std::fs::write(&path, "{ gateway: { port: 9191 }, bridge: { retention_days: 30 } }").unwrap();

        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.bridge.retention_days, 30);

        assert!(load_config(Some(&dir.path().join("missing.json5"))).is_err());
    }
}
