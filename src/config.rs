use config::{self, Config, FileFormat};
use log::{debug, warn};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{MetricsError, Result};

/// Source of configuration
#[derive(Debug, Clone)]
pub enum ConfigSource {
    /// File path (format picked from the extension, TOML when absent)
    File(String),
    /// Environment variables with a prefix
    Environment(String),
    /// TOML string
    Toml(String),
    /// Default configuration
    Defaults,
}

/// Logging level
#[derive(Debug, Deserialize, Clone, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Error level
    Error,
    /// Warning level
    Warn,
    /// Info level
    #[default]
    Info,
    /// Debug level
    Debug,
    /// Trace level
    Trace,
}

impl LogLevel {
    /// Read the optional `log-level` key, falling back to `info`
    pub fn from_config(config: &Config) -> Result<Self> {
        match config.get::<LogLevel>("log-level") {
            Ok(level) => Ok(level),
            Err(config::ConfigError::NotFound(_)) => Ok(LogLevel::default()),
            Err(e) => Err(MetricsError::config_key("log-level", e)),
        }
    }
}

fn file_format(path: &Path) -> Result<FileFormat> {
    let extension = match path.extension() {
        Some(ext) => ext.to_string_lossy().to_lowercase(),
        None => return Ok(FileFormat::Toml),
    };

    match extension.as_str() {
        "toml" => Ok(FileFormat::Toml),
        "json" => Ok(FileFormat::Json),
        "yaml" | "yml" => Ok(FileFormat::Yaml),
        format => Err(MetricsError::Config(format!(
            "Unsupported config format: {}",
            format
        ))),
    }
}

/// Build an opaque key-value source from the given sources, later sources
/// overriding earlier ones
pub fn load_source(sources: Vec<ConfigSource>) -> Result<Config> {
    let mut builder = Config::builder();

    for source in sources {
        match source {
            ConfigSource::File(path) => {
                let path = PathBuf::from(path);
                if !path.exists() {
                    warn!("Configuration file not found: {}", path.display());
                    continue;
                }

                let format = file_format(&path)?;
                debug!("Loading configuration from file: {}", path.display());
                builder = builder.add_source(
                    config::File::from(path.as_path()).format(format),
                );
            }
            ConfigSource::Environment(prefix) => {
                debug!("Loading configuration from environment with prefix: {}", prefix);
                builder = builder.add_source(
                    config::Environment::with_prefix(&prefix)
                        .separator("__")
                        .try_parsing(true),
                );
            }
            ConfigSource::Toml(toml_str) => {
                debug!("Loading configuration from TOML string");
                builder = builder.add_source(config::File::from_str(&toml_str, FileFormat::Toml));
            }
            ConfigSource::Defaults => {
                debug!("Using default configuration values");
            }
        }
    }

    builder
        .build()
        .map_err(|e| MetricsError::Config(format!("Failed to build configuration: {}", e)))
}

/// Configuration builder
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    sources: Vec<ConfigSource>,
}

impl ConfigBuilder {
    /// Create a new config builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a file source
    pub fn add_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.sources
            .push(ConfigSource::File(path.as_ref().to_string_lossy().to_string()));
        self
    }

    /// Add environment variables
    pub fn add_env(mut self, prefix: impl Into<String>) -> Self {
        self.sources.push(ConfigSource::Environment(prefix.into()));
        self
    }

    /// Add TOML string
    pub fn add_toml(mut self, toml: impl Into<String>) -> Self {
        self.sources.push(ConfigSource::Toml(toml.into()));
        self
    }

    /// Use default values
    pub fn use_defaults(mut self) -> Self {
        self.sources.push(ConfigSource::Defaults);
        self
    }

    /// Build the key-value source
    pub fn build(self) -> Result<Config> {
        load_source(self.sources)
    }
}

/// Parse a human-readable duration such as `10s`, `100ms` or `1m30s`.
pub fn parse_duration(s: &str) -> Result<Duration> {
    let s = s.trim();
    if s.is_empty() {
        return Err(MetricsError::Config("duration string is empty".to_string()));
    }
    humantime::parse_duration(s)
        .map_err(|e| MetricsError::Config(format!("invalid duration '{}': {}", s, e)))
}

/// Read a required integer key
pub(crate) fn require_int(config: &Config, key: &str) -> Result<i64> {
    config
        .get_int(key)
        .map_err(|e| MetricsError::config_key(key, e))
}

/// Read a required duration key
pub(crate) fn require_duration(config: &Config, key: &str) -> Result<Duration> {
    let raw = config
        .get_string(key)
        .map_err(|e| MetricsError::config_key(key, e))?;
    parse_duration(&raw).map_err(|e| MetricsError::config_key(key, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::Builder;

    #[test]
    fn test_load_from_toml_file() {
        let mut file = Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
            log-level = "debug"

            [reporting]
            hostname = "collector.local"
            "#
        )
        .unwrap();

        let config = ConfigBuilder::new().add_file(file.path()).build().unwrap();
        assert_eq!(
            config.get_string("reporting.hostname").unwrap(),
            "collector.local"
        );
        assert_eq!(LogLevel::from_config(&config).unwrap(), LogLevel::Debug);
    }

    #[test]
    fn test_missing_file_is_skipped() {
        let config = ConfigBuilder::new()
            .add_file("/definitely/not/here.toml")
            .add_toml("answer = 42")
            .build()
            .unwrap();
        assert_eq!(config.get_int("answer").unwrap(), 42);
    }

    #[test]
    fn test_later_sources_override() {
        let config = ConfigBuilder::new()
            .add_toml("name = \"first\"\ncount = 10")
            .add_toml("name = \"second\"")
            .build()
            .unwrap();

        assert_eq!(config.get_string("name").unwrap(), "second");
        assert_eq!(config.get_int("count").unwrap(), 10);
    }

    #[test]
    fn test_log_level_defaults_to_info() {
        let config = ConfigBuilder::new().use_defaults().build().unwrap();
        assert_eq!(LogLevel::from_config(&config).unwrap(), LogLevel::Info);
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("10s").unwrap(), Duration::from_secs(10));
        assert_eq!(parse_duration("100ms").unwrap(), Duration::from_millis(100));
        assert_eq!(parse_duration(" 1m30s ").unwrap(), Duration::from_secs(90));
        assert!(parse_duration("").is_err());
        assert!(parse_duration("10 parsecs").is_err());
    }

    #[test]
    fn test_require_keys_name_the_key() {
        let config = ConfigBuilder::new()
            .add_toml("interval = \"soon\"")
            .build()
            .unwrap();

        let err = require_int(&config, "missing.key").unwrap_err();
        assert!(err.to_string().contains("missing.key"));

        let err = require_duration(&config, "interval").unwrap_err();
        assert!(err.to_string().contains("interval"));
    }
}
