//! Configuration sections, defaults, and RON persistence.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

const FILE_NAME: &str = "config.ron";

/// Top-level feed configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Listener and socket options.
    pub network: NetworkConfig,
    /// Chunk scanning geometry and reconciliation cadence.
    pub scan: ScanConfig,
    /// Entity frame pacing and de-duplication.
    pub broadcast: BroadcastConfig,
    /// Module flag policy.
    pub modules: ModulesConfig,
    /// Logging.
    pub debug: DebugConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NetworkConfig {
    /// Address to bind. Loopback unless the overlay runs on another host.
    pub bind_address: String,
    /// TCP port.
    pub port: u16,
    /// Connections beyond this are closed right after accept.
    pub max_connections: usize,
    /// Set TCP_NODELAY on accepted sockets.
    pub nodelay: bool,
    /// TCP keepalive idle time in seconds, 0 to leave the OS default.
    pub keepalive_secs: u64,
}

/// Chunk scan configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ScanConfig {
    /// Lowest scanned block Y (inclusive).
    pub min_y: i32,
    /// Highest scanned block Y (exclusive).
    pub max_y: i32,
    /// Extra chunks beyond the view radius covered by targeted rescans.
    pub rescan_margin: i32,
    /// Host ticks between reconciliation passes over unscanned chunks.
    pub reconcile_interval_ticks: u64,
}

/// Entity frame configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BroadcastConfig {
    /// Minimum time between two frames, in microseconds.
    pub min_frame_interval_us: u64,
    /// How long a non-player stays in the send cache, in milliseconds.
    pub mob_cache_ttl_ms: u64,
    /// Minimum time between two cache sweeps, in milliseconds.
    pub cache_cleanup_interval_ms: u64,
}

/// Module flag configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ModulesConfig {
    /// Answer for a module name the overlay never mentioned.
    pub unknown_module_default: bool,
    /// Flags applied at startup, before any overlay connects.
    pub initial: BTreeMap<String, bool>,
}

/// Debug/development configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DebugConfig {
    /// Log level override (e.g., "debug", "info", "warn").
    pub log_level: String,
}

// --- Default implementations ---

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1".to_string(),
            port: 25566,
            max_connections: 16,
            nodelay: true,
            keepalive_secs: 30,
        }
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            min_y: -64,
            max_y: 320,
            rescan_margin: 2,
            reconcile_interval_ticks: 100,
        }
    }
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            min_frame_interval_us: 7_000,
            mob_cache_ttl_ms: 5_000,
            cache_cleanup_interval_ms: 1_000,
        }
    }
}

impl Default for ModulesConfig {
    fn default() -> Self {
        Self {
            unknown_module_default: true,
            initial: BTreeMap::new(),
        }
    }
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

/// Platform config directory for scry, e.g. `~/.config/scry` on Linux.
/// Falls back to the working directory when the platform has none.
pub fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .map(|d| d.join("scry"))
        .unwrap_or_else(|| PathBuf::from("."))
}

// --- Load / Save / Reload ---

impl Config {
    /// Load config from the given directory, or create a default config file.
    pub fn load_or_create(config_dir: &Path) -> Result<Self, ConfigError> {
        let config_path = config_dir.join(FILE_NAME);

        if config_path.exists() {
            let config = Self::read(&config_path)?;
            log::info!("Loaded config from {}", config_path.display());
            Ok(config)
        } else {
            let config = Config::default();
            config.save(config_dir)?;
            log::info!("Created default config at {}", config_path.display());
            Ok(config)
        }
    }

    /// Save config to the given directory as `config.ron`.
    pub fn save(&self, config_dir: &Path) -> Result<(), ConfigError> {
        std::fs::create_dir_all(config_dir).map_err(|source| ConfigError::Write {
            path: config_dir.to_path_buf(),
            source,
        })?;

        let config_path = config_dir.join(FILE_NAME);
        let pretty = ron::ser::PrettyConfig::new()
            .depth_limit(3)
            .separate_tuple_members(true)
            .enumerate_arrays(false);
        let serialized = ron::ser::to_string_pretty(self, pretty).map_err(ConfigError::Serialize)?;

        std::fs::write(&config_path, serialized).map_err(|source| ConfigError::Write {
            path: config_path,
            source,
        })
    }

    /// Hot-reload: returns `Some(new_config)` if the file changed, `None` otherwise.
    pub fn reload(&self, config_dir: &Path) -> Result<Option<Self>, ConfigError> {
        let new_config = Self::read(&config_dir.join(FILE_NAME))?;
        if &new_config != self {
            log::info!("Config reloaded with changes");
            Ok(Some(new_config))
        } else {
            Ok(None)
        }
    }

    /// Reject values that would make the feed misbehave.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.scan.min_y >= self.scan.max_y {
            return Err(ConfigError::Invalid {
                field: "scan.min_y",
                reason: format!(
                    "must be below scan.max_y ({} >= {})",
                    self.scan.min_y, self.scan.max_y
                ),
            });
        }
        if self.scan.rescan_margin < 0 {
            return Err(ConfigError::Invalid {
                field: "scan.rescan_margin",
                reason: "must not be negative".to_string(),
            });
        }
        if self.network.max_connections == 0 {
            return Err(ConfigError::Invalid {
                field: "network.max_connections",
                reason: "must allow at least one connection".to_string(),
            });
        }
        Ok(())
    }

    fn read(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Config = ron::from_str(&contents).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_serializes() {
        let config = Config::default();
        let ron_str =
            ron::ser::to_string_pretty(&config, ron::ser::PrettyConfig::new().depth_limit(3))
                .unwrap();
        assert!(ron_str.contains("port: 25566"));
        assert!(ron_str.contains("min_frame_interval_us: 7000"));
    }

    #[test]
    fn test_defaults_are_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_missing_section_uses_default() {
        let config: Config = ron::from_str("(network: (port: 4000))").unwrap();
        assert_eq!(config.network.port, 4000);
        assert_eq!(config.network.bind_address, "127.0.0.1");
        assert_eq!(config.scan, ScanConfig::default());
    }

    #[test]
    fn test_extra_field_ignored() {
        let result: Result<Config, _> = ron::from_str("(future_setting: true)");
        assert!(result.is_ok());
    }

    #[test]
    fn test_initial_modules_parse() {
        let config: Config =
            ron::from_str(r#"(modules: (initial: {"ESP": true, "BlockESP": false}))"#).unwrap();
        assert_eq!(config.modules.initial.get("ESP"), Some(&true));
        assert_eq!(config.modules.initial.get("BlockESP"), Some(&false));
        assert!(config.modules.unknown_module_default);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.network.port = 30000;
        config.modules.initial.insert("ESP".into(), true);

        config.save(dir.path()).unwrap();
        let loaded = Config::load_or_create(dir.path()).unwrap();
        assert_eq!(config, loaded);
    }

    #[test]
    fn test_load_or_create_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_or_create(dir.path()).unwrap();
        assert_eq!(config, Config::default());
        assert!(dir.path().join(FILE_NAME).exists());
    }

    #[test]
    fn test_reload_detects_changes() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::default();
        config.save(dir.path()).unwrap();

        let mut modified = config.clone();
        modified.scan.rescan_margin = 4;
        modified.save(dir.path()).unwrap();

        let reloaded = config.reload(dir.path()).unwrap().unwrap();
        assert_eq!(reloaded.scan.rescan_margin, 4);
    }

    #[test]
    fn test_reload_no_changes() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::default();
        config.save(dir.path()).unwrap();
        assert!(config.reload(dir.path()).unwrap().is_none());
    }

    #[test]
    fn test_inverted_scan_range_rejected_on_load() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(FILE_NAME), "(scan: (min_y: 10, max_y: 10))").unwrap();
        let err = Config::load_or_create(dir.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "scan.min_y", .. }));
    }

    #[test]
    fn test_invalid_ron_produces_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(FILE_NAME), "{{not valid}}").unwrap();
        let err = Config::load_or_create(dir.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
