//! Configuration management for floodgate.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{FloodControlError, Result};

/// Prefix for environment variable overrides, e.g. `FLOODGATE__LIMITER__MAX_REQUESTS`.
const ENV_PREFIX: &str = "FLOODGATE";

/// Main configuration for the floodgate binary.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FloodgateConfig {
    /// Limiter configuration
    #[serde(default)]
    pub limiter: LimiterConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Limiter configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimiterConfig {
    /// Length of the trailing window in seconds
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,

    /// Maximum admitted requests per user within the window
    #[serde(default = "default_max_requests")]
    pub max_requests: u32,

    /// Use per-key locking instead of a single lock
    #[serde(default)]
    pub sharded: bool,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            window_secs: default_window_secs(),
            max_requests: default_max_requests(),
            sharded: false,
        }
    }
}

impl LimiterConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

fn default_window_secs() -> u64 {
    10
}

fn default_max_requests() -> u32 {
    5
}

/// Output format for log lines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl FloodgateConfig {
    /// Load configuration from a YAML file.
    pub fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Parse configuration from a YAML document.
    pub fn from_yaml(contents: &str) -> Result<Self> {
        serde_yaml::from_str(contents).map_err(|e| FloodControlError::Config(e.to_string()))
    }

    /// Load configuration from an optional YAML file, then apply
    /// `FLOODGATE__SECTION__KEY` environment overrides on top.
    ///
    /// Values missing from both come from the defaults.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let base = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };

        config::Config::builder()
            .add_source(config::Config::try_from(&base).map_err(config_error)?)
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .try_parsing(true)
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(config_error)
    }
}

fn config_error(e: config::ConfigError) -> FloodControlError {
    FloodControlError::Config(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = FloodgateConfig::default();
        assert_eq!(config.limiter.window(), Duration::from_secs(10));
        assert_eq!(config.limiter.max_requests, 5);
        assert!(!config.limiter.sharded);
        assert_eq!(config.logging.format, LogFormat::Text);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_from_yaml() {
        let yaml = r#"
limiter:
  window_secs: 30
  max_requests: 100
  sharded: true
logging:
  format: json
"#;
        let config = FloodgateConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.limiter.window_secs, 30);
        assert_eq!(config.limiter.max_requests, 100);
        assert!(config.limiter.sharded);
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_from_yaml_partial_uses_defaults() {
        let config = FloodgateConfig::from_yaml("limiter:\n  max_requests: 2\n").unwrap();
        assert_eq!(config.limiter.window_secs, 10);
        assert_eq!(config.limiter.max_requests, 2);
    }

    #[test]
    fn test_from_yaml_invalid() {
        let result = FloodgateConfig::from_yaml("limiter:\n  max_requests: lots\n");
        assert!(matches!(result, Err(FloodControlError::Config(_))));
    }

    #[test]
    fn test_from_missing_file() {
        let result = FloodgateConfig::from_file("/nonexistent/floodgate.yaml");
        assert!(matches!(result, Err(FloodControlError::Io(_))));
    }

    /// Writes `contents` to a per-process file in the temp directory.
    fn write_temp_yaml(name: &str, contents: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!("{}-{}.yaml", name, std::process::id()));
        std::fs::write(&path, contents).unwrap();
        path
    }

    // Every test that touches FLOODGATE__* variables lives here, since the
    // environment is shared by all tests in the process.
    #[test]
    fn test_load_layers_env_over_file() {
        let path = write_temp_yaml(
            "floodgate-load",
            "limiter:\n  window_secs: 30\n  max_requests: 100\nlogging:\n  format: json\n",
        );
        let path_str = path.to_str().unwrap();

        let from_file = FloodgateConfig::load(Some(path_str)).unwrap();
        assert_eq!(from_file.limiter.window_secs, 30);
        assert_eq!(from_file.limiter.max_requests, 100);
        assert_eq!(from_file.logging.format, LogFormat::Json);

        std::env::set_var("FLOODGATE__LIMITER__MAX_REQUESTS", "7");

        let overridden = FloodgateConfig::load(Some(path_str)).unwrap();
        let env_only = FloodgateConfig::load(None).unwrap();

        std::env::remove_var("FLOODGATE__LIMITER__MAX_REQUESTS");
        std::fs::remove_file(&path).unwrap();

        assert_eq!(overridden.limiter.max_requests, 7);
        assert_eq!(overridden.limiter.window_secs, 30);
        assert_eq!(overridden.logging.format, LogFormat::Json);

        assert_eq!(env_only.limiter.max_requests, 7);
        assert_eq!(env_only.limiter.window_secs, 10);
        assert_eq!(env_only.logging.format, LogFormat::Text);
    }

    #[test]
    fn test_load_missing_file() {
        let result = FloodgateConfig::load(Some("/nonexistent/floodgate.yaml"));
        assert!(matches!(result, Err(FloodControlError::Io(_))));
    }
}
