//! Bridge errors.

use scry_blocks::ScanError;
use scry_config::ConfigError;
use scry_net::ServerError;

/// Errors from starting or driving the feed.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// A full disable is in effect until [`reset_disable`](crate::Bridge::reset_disable).
    #[error("feed is disabled until reset")]
    Disabled,

    /// The operation needs a running feed.
    #[error("feed is not running")]
    NotRunning,

    /// The configuration failed validation.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The async runtime could not be built.
    #[error("failed to build runtime: {0}")]
    Runtime(#[source] std::io::Error),

    /// The listener could not be bound.
    #[error(transparent)]
    Server(#[from] ServerError),

    /// The scan worker is unavailable.
    #[error(transparent)]
    Scan(#[from] ScanError),
}
