//! Configuration file support for the preview core.
//!
//! Holds the tunable policy: resolution clamps, debounce delays, progressive
//! rendering and the worker pool size. Every field has a default, so a
//! partial file (or none at all) is valid.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::geometry::ResolutionPolicy;
use crate::preview::RenderOptions;

/// Log level setting for the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Show only errors
    Error,
    /// Show errors and warnings
    Warn,
    /// Show errors, warnings, and info messages
    #[default]
    Info,
    /// Show debug-level logging
    Debug,
    /// Show all log messages including trace
    Trace,
}

impl LogLevel {
    /// Convert to log crate's LevelFilter.
    pub fn to_level_filter(&self) -> log::LevelFilter {
        match self {
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

/// Current configuration file format version.
/// Increment this when making breaking changes to the config format.
pub const CONFIG_VERSION: u32 = 1;

/// Debounce delays in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Render debounce while a slider is being dragged
    pub interactive_debounce_ms: u64,
    /// Render debounce at rest
    pub rest_debounce_ms: u64,
    /// Delay between the last edit and the recipe save
    pub save_debounce_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            interactive_debounce_ms: 0,
            rest_debounce_ms: 150,
            save_debounce_ms: 300,
        }
    }
}

impl TimingConfig {
    pub fn render_debounce(&self, interacting: bool) -> Duration {
        let ms = if interacting {
            self.interactive_debounce_ms
        } else {
            self.rest_debounce_ms
        };
        Duration::from_millis(ms)
    }

    pub fn save_debounce(&self) -> Duration {
        Duration::from_millis(self.save_debounce_ms)
    }
}

/// Preview configuration that can be loaded from and saved to disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreviewConfig {
    /// Version of the configuration file format
    pub version: u32,

    /// Target resolution clamps
    pub resolution: ResolutionPolicy,

    pub timing: TimingConfig,

    /// Show a floor-resolution pass before the full render
    pub progressive: bool,

    /// Threads serving an in-process render service
    pub worker_threads: usize,

    /// Log verbosity level
    pub log_level: LogLevel,
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            resolution: ResolutionPolicy::default(),
            timing: TimingConfig::default(),
            progressive: true,
            worker_threads: 2,
            log_level: LogLevel::default(),
        }
    }
}

impl PreviewConfig {
    /// Render options for a preview at `target_resolution`.
    ///
    /// While interacting, the full pass is skipped so scrubbing only ever
    /// waits on floor-resolution renders.
    pub fn render_options(&self, target_resolution: u32, interacting: bool) -> RenderOptions {
        RenderOptions {
            target_resolution,
            floor_resolution: self.resolution.floor,
            progressive: self.progressive,
            skip_high: interacting,
            debounce: self.timing.render_debounce(interacting),
        }
    }

    /// Serialize configuration to pretty JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Deserialize configuration from JSON.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;

        if config.version > CONFIG_VERSION {
            return Err(ConfigError::VersionTooNew {
                file_version: config.version,
                supported_version: CONFIG_VERSION,
            });
        }

        Ok(config)
    }

    pub fn default_filename() -> &'static str {
        "openroom-preview.json"
    }

    /// Platform config location, e.g. `~/.config/openroom/openroom-preview.json`.
    pub fn default_path() -> Option<PathBuf> {
        if let Some(config_dir) = dirs::config_dir() {
            Some(config_dir.join("openroom").join(Self::default_filename()))
        } else {
            dirs::home_dir().map(|home_dir| {
                home_dir
                    .join(".config")
                    .join("openroom")
                    .join(Self::default_filename())
            })
        }
    }

    /// Read and validate a config file.
    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Load from the default path. Missing or invalid files yield `None`.
    pub fn load_from_default_path() -> Option<Self> {
        let path = Self::default_path()?;
        if !path.exists() {
            log::debug!("No config file found at {:?}", path);
            return None;
        }

        match Self::load_from_path(&path) {
            Ok(config) => {
                log::info!("Loaded configuration from {:?}", path);
                Some(config)
            }
            Err(e) => {
                log::warn!("Failed to load config file {:?}: {}", path, e);
                None
            }
        }
    }

    /// Write to `path`, creating parent directories as needed.
    pub fn save_to_path(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_json()?)?;
        log::info!("Saved configuration to {:?}", path);
        Ok(())
    }

    pub fn save_to_default_path(&self) -> Result<(), ConfigError> {
        let path = Self::default_path().ok_or_else(|| {
            ConfigError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "Could not determine config directory",
            ))
        })?;
        self.save_to_path(&path)
    }
}

/// Errors that can occur during config import/export.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),

    #[error(
        "Configuration file version {file_version} is newer than supported version {supported_version}"
    )]
    VersionTooNew {
        file_version: u32,
        supported_version: u32,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PreviewConfig::default();
        assert_eq!(config.version, CONFIG_VERSION);
        assert_eq!(config.resolution.floor, 480);
        assert_eq!(config.timing.save_debounce(), Duration::from_millis(300));
        assert!(config.progressive);
        assert_eq!(config.log_level, LogLevel::Info);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let config = PreviewConfig::from_json(
            r#"{ "version": 1, "timing": { "rest_debounce_ms": 90 }, "log_level": "debug" }"#,
        )
        .unwrap();
        assert_eq!(config.timing.rest_debounce_ms, 90);
        assert_eq!(config.timing.save_debounce_ms, 300);
        assert_eq!(config.resolution, ResolutionPolicy::default());
        assert_eq!(config.log_level.to_level_filter(), log::LevelFilter::Debug);
        assert_eq!(config.worker_threads, 2);
    }

    #[test]
    fn test_version_too_new() {
        let json = format!(r#"{{ "version": {} }}"#, CONFIG_VERSION + 1);
        let result = PreviewConfig::from_json(&json);
        assert!(matches!(result, Err(ConfigError::VersionTooNew { .. })));
    }

    #[test]
    fn test_invalid_json() {
        assert!(matches!(
            PreviewConfig::from_json("not json"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_render_options() {
        let config = PreviewConfig::default();

        let rest = config.render_options(1600, false);
        assert_eq!(rest.target_resolution, 1600);
        assert_eq!(rest.floor_resolution, 480);
        assert!(rest.progressive);
        assert!(!rest.skip_high);
        assert_eq!(rest.debounce, Duration::from_millis(150));

        let scrub = config.render_options(960, true);
        assert!(scrub.skip_high);
        assert_eq!(scrub.debounce, Duration::ZERO);
    }

    #[test]
    fn test_save_and_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("openroom-preview.json");

        let mut config = PreviewConfig::default();
        config.worker_threads = 4;
        config.resolution.floor = 360;
        config.save_to_path(&path).unwrap();

        let loaded = PreviewConfig::load_from_path(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = PreviewConfig::load_from_path(&dir.path().join("absent.json"));
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }
}
