//! Tracing setup for the scry feed.
//!
//! Console output goes through a human-readable `fmt` layer with uptime
//! timestamps and thread names (`scry-scan`, `scry-net-*`). Debug builds can
//! additionally write JSON lines to `scry.log` for post-mortem analysis.
//! `RUST_LOG` always wins over the configured level.

use std::path::{Path, PathBuf};

use scry_config::Config;
use tracing::Subscriber;
use tracing_subscriber::layer::{Layer, SubscriberExt};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

/// Name of the JSON log file written inside the log directory.
pub const LOG_FILE_NAME: &str = "scry.log";

const DEFAULT_DIRECTIVES: &str = "info";

/// Install the global subscriber.
///
/// Returns the path of the JSON log file when one was opened. Calling this a
/// second time leaves the first subscriber in place.
///
/// ```no_run
/// use scry_config::Config;
/// use scry_log::init_logging;
///
/// let config = Config::default();
/// init_logging(Some(std::path::Path::new("./logs")), cfg!(debug_assertions), Some(&config));
/// ```
pub fn init_logging(
    log_dir: Option<&Path>,
    debug_build: bool,
    config: Option<&Config>,
) -> Option<PathBuf> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directives(config)));

    let console_layer = fmt::layer()
        .with_target(true)
        .with_thread_names(true)
        .with_level(true)
        .with_timer(fmt::time::uptime());

    let subscriber = tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer);

    if debug_build
        && let Some(log_dir) = log_dir
        && let Some((log_file, path)) = open_log_file(log_dir)
    {
        if subscriber.with(json_file_layer(log_file)).try_init().is_err() {
            tracing::debug!("Global subscriber already installed");
        }
        return Some(path);
    }

    if subscriber.try_init().is_err() {
        tracing::debug!("Global subscriber already installed");
    }
    None
}

/// Filter directives for the given config: its `debug.log_level` when set,
/// otherwise `info`.
pub fn filter_directives(config: Option<&Config>) -> String {
    config
        .map(|c| c.debug.log_level.trim())
        .filter(|level| !level.is_empty())
        .unwrap_or(DEFAULT_DIRECTIVES)
        .to_string()
}

/// JSON-lines layer for the debug log file.
fn json_file_layer<S>(log_file: std::fs::File) -> impl Layer<S>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fmt::layer()
        .with_writer(log_file)
        .with_ansi(false)
        .with_target(true)
        .with_thread_names(true)
        .with_timer(fmt::time::uptime())
        .json()
}

fn open_log_file(log_dir: &Path) -> Option<(std::fs::File, PathBuf)> {
    std::fs::create_dir_all(log_dir).ok()?;
    let path = log_dir.join(LOG_FILE_NAME);
    let file = std::fs::File::create(&path).ok()?;
    Some((file, path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directives() {
        assert_eq!(filter_directives(None), "info");
    }

    #[test]
    fn test_config_level_used() {
        let mut config = Config::default();
        config.debug.log_level = "debug,scry_net=trace".into();
        assert_eq!(filter_directives(Some(&config)), "debug,scry_net=trace");
    }

    #[test]
    fn test_blank_config_level_falls_back() {
        let mut config = Config::default();
        config.debug.log_level = "   ".into();
        assert_eq!(filter_directives(Some(&config)), "info");
    }

    #[test]
    fn test_subsystem_filters_parse() {
        for directives in [
            "info",
            "warn,scry_blocks=debug",
            "debug,scry_net=trace,scry_entities=warn",
        ] {
            assert!(
                EnvFilter::try_new(directives).is_ok(),
                "Failed to parse filter: {directives}"
            );
        }
    }

    #[test]
    fn test_log_file_created_in_nested_dir() {
        let temp_dir = tempfile::tempdir().unwrap();
        let nested = temp_dir.path().join("logs").join("today");
        let (_file, path) = open_log_file(&nested).unwrap();
        assert!(path.exists());
        assert_eq!(path.file_name().unwrap(), LOG_FILE_NAME);
    }

    #[test]
    fn test_file_layer_writes_json_lines() {
        let temp_dir = tempfile::tempdir().unwrap();
        let (file, path) = open_log_file(temp_dir.path()).unwrap();
        let subscriber = tracing_subscriber::registry().with(json_file_layer(file));
        tracing::subscriber::with_default(subscriber, || {
            tracing::info!(chunk = 3, "Scanned chunk");
        });

        let contents = std::fs::read_to_string(&path).unwrap();
        let line: serde_json::Value =
            serde_json::from_str(contents.lines().next().unwrap()).unwrap();
        assert_eq!(line["level"], "INFO");
        assert_eq!(line["fields"]["message"], "Scanned chunk");
        assert_eq!(line["fields"]["chunk"], 3);
    }
}
