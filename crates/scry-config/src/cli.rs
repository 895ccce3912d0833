//! Command-line overrides for the simulator.

use std::path::PathBuf;

use clap::Parser;

use crate::Config;

/// scry simulator arguments.
///
/// CLI values override settings loaded from `config.ron`.
#[derive(Parser, Debug, Default)]
#[command(name = "scry-sim", about = "Synthetic host driving the scry feed")]
pub struct CliArgs {
    /// Address to bind the feed listener on.
    #[arg(long)]
    pub bind: Option<String>,

    /// Feed port.
    #[arg(long)]
    pub port: Option<u16>,

    /// Maximum simultaneous overlay connections.
    #[arg(long)]
    pub max_connections: Option<usize>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Path to config directory (overrides default location).
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Simulated frames per second.
    #[arg(long, default_value_t = 60)]
    pub fps: u32,

    /// Stop after this many seconds; run until interrupted when absent.
    #[arg(long)]
    pub duration: Option<u64>,

    /// World seed.
    #[arg(long, default_value_t = 1)]
    pub seed: u64,

    /// Instead of hosting, connect to a running feed and print what arrives.
    #[arg(long)]
    pub probe: bool,
}

impl Config {
    /// Apply CLI overrides to a loaded config.
    pub fn apply_cli_overrides(&mut self, args: &CliArgs) {
        if let Some(ref addr) = args.bind {
            self.network.bind_address = addr.clone();
        }
        if let Some(port) = args.port {
            self.network.port = port;
        }
        if let Some(max) = args.max_connections {
            self.network.max_connections = max;
        }
        if let Some(ref level) = args.log_level {
            self.debug.log_level = level.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_override() {
        let mut config = Config::default();
        let args = CliArgs {
            port: Some(4444),
            log_level: Some("debug".to_string()),
            ..Default::default()
        };
        config.apply_cli_overrides(&args);
        assert_eq!(config.network.port, 4444);
        assert_eq!(config.debug.log_level, "debug");
        // Non-overridden fields retain defaults
        assert_eq!(config.network.bind_address, "127.0.0.1");
        assert_eq!(config.network.max_connections, 16);
    }

    #[test]
    fn test_cli_no_override() {
        let original = Config::default();
        let mut config = Config::default();
        config.apply_cli_overrides(&CliArgs::default());
        assert_eq!(config, original);
    }

    #[test]
    fn test_parse_flags() {
        let args = CliArgs::parse_from(["scry-sim", "--port", "9000", "--probe", "--fps", "30"]);
        assert_eq!(args.port, Some(9000));
        assert!(args.probe);
        assert_eq!(args.fps, 30);
        assert_eq!(args.seed, 1);
    }
}
