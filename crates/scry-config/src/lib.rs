//! Configuration for the scry feed.
//!
//! Settings persist to disk as `config.ron`. Every section is
//! `#[serde(default)]`, so older files keep loading as fields are added, and
//! the simulator binary can override a handful of values from the command
//! line.

mod cli;
mod config;
mod error;

pub use cli::CliArgs;
pub use config::{
    BroadcastConfig, Config, DebugConfig, ModulesConfig, NetworkConfig, ScanConfig,
    default_config_dir,
};
pub use error::ConfigError;
