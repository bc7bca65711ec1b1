//! Application configuration.
//!
//! Configuration is loaded from a TOML file at:
//! 1. `$MAILUPLOAD_CONFIG` (environment variable)
//! 2. `~/.config/mailupload/config.toml` (Linux/macOS)
//!    `%APPDATA%\mailupload\config.toml` (Windows)
//! 3. Built-in defaults

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, UploadError};
use crate::store::temp::normalize_dir;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General behavior settings.
    pub general: GeneralConfig,
    /// Upload defaults.
    pub upload: UploadConfig,
    /// Performance tuning.
    pub performance: PerformanceConfig,
}

/// General behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Override cache directory for logs.
    pub cache_dir: Option<PathBuf>,
    /// Log level: "error", "warn", "info", "debug", "trace".
    pub log_level: String,
}

/// Upload defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    /// Directory for temp objects. Defaults to the platform temp directory.
    pub temp_dir: Option<PathBuf>,
    /// Overall HTTP request timeout in seconds. No timeout when unset.
    pub timeout_secs: Option<u64>,
    /// Static form fields sent ahead of the message fields.
    pub fields: BTreeMap<String, String>,
}

/// Performance tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PerformanceConfig {
    /// Buffer size for attachment copies in bytes (default: 65536 = 64 KB).
    pub copy_buffer_size: usize,
    /// Parser events buffered ahead of the pipeline.
    pub channel_capacity: usize,
}

// ── Default implementations ─────────────────────────────────────

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            cache_dir: None,
            log_level: "warn".to_string(),
        }
    }
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            copy_buffer_size: 64 * 1024, // 64 KB
            channel_capacity: 16,
        }
    }
}

impl UploadConfig {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

/// Options for one conversion.
#[derive(Debug, Clone)]
pub struct UploadOptions {
    /// Directory for temp objects, always ending with a path separator.
    pub temp_dir: PathBuf,
    /// Static form fields, sent in key order ahead of the message fields.
    pub additional_fields: BTreeMap<String, String>,
    /// Buffer size used for every attachment copy.
    pub copy_buffer_size: usize,
    /// Parser events buffered ahead of the pipeline.
    pub channel_capacity: usize,
}

impl Default for UploadOptions {
    fn default() -> Self {
        let performance = PerformanceConfig::default();
        Self {
            temp_dir: normalize_dir(std::env::temp_dir()),
            additional_fields: BTreeMap::new(),
            copy_buffer_size: performance.copy_buffer_size,
            channel_capacity: performance.channel_capacity,
        }
    }
}

impl UploadOptions {
    /// Options derived from a loaded configuration.
    pub fn from_config(config: &Config) -> Self {
        let defaults = Self::default();
        Self {
            temp_dir: config
                .upload
                .temp_dir
                .clone()
                .map(normalize_dir)
                .unwrap_or(defaults.temp_dir),
            additional_fields: config.upload.fields.clone(),
            copy_buffer_size: config.performance.copy_buffer_size.max(1),
            channel_capacity: config.performance.channel_capacity.max(1),
        }
    }

    pub fn with_temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = normalize_dir(dir.into());
        self
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.additional_fields.insert(name.into(), value.into());
        self
    }
}

/// Parse a `name=value` form field specification.
pub fn parse_field(pair: &str) -> Result<(String, String)> {
    match pair.split_once('=') {
        Some((name, value)) if !name.trim().is_empty() => {
            Ok((name.trim().to_string(), value.to_string()))
        }
        _ => Err(UploadError::InvalidField(format!(
            "expected NAME=VALUE, got '{pair}'"
        ))),
    }
}

// ── Load ────────────────────────────────────────────────────────

/// Load configuration, searching standard locations.
///
/// Returns the default configuration if no file is found or on parse error.
pub fn load_config() -> Config {
    if let Some(path) = config_file_path() {
        if path.exists() {
            match std::fs::read_to_string(&path) {
                Ok(contents) => match toml::from_str::<Config>(&contents) {
                    Ok(cfg) => {
                        tracing::info!(path = %path.display(), "Loaded config");
                        return cfg;
                    }
                    Err(e) => {
                        tracing::warn!(
                            path = %path.display(),
                            error = %e,
                            "Failed to parse config, using defaults"
                        );
                    }
                },
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "Failed to read config file, using defaults"
                    );
                }
            }
        }
    }
    Config::default()
}

/// Determine the config file path (checking env var first, then standard dirs).
pub fn config_file_path() -> Option<PathBuf> {
    if let Ok(env_path) = std::env::var("MAILUPLOAD_CONFIG") {
        return Some(PathBuf::from(env_path));
    }

    dirs::config_dir().map(|d| d.join("mailupload").join("config.toml"))
}

/// Return the cache directory for logs.
pub fn cache_dir(config: &Config) -> PathBuf {
    if let Some(ref dir) = config.general.cache_dir {
        return dir.clone();
    }
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("mailupload")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::MAIN_SEPARATOR_STR;

    #[test]
    fn test_default_config() {
        let cfg = Config::default();
        assert_eq!(cfg.general.log_level, "warn");
        assert_eq!(cfg.performance.copy_buffer_size, 64 * 1024);
        assert!(cfg.upload.fields.is_empty());
        assert_eq!(cfg.upload.timeout(), None);
    }

    #[test]
    fn test_serialize_deserialize_roundtrip() {
        let mut cfg = Config::default();
        cfg.upload.fields.insert("token".to_string(), "abc".to_string());
        let toml_str = toml::to_string_pretty(&cfg).expect("serialize");
        let parsed: Config = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.upload.fields.get("token").map(String::as_str), Some("abc"));
        assert_eq!(
            parsed.performance.copy_buffer_size,
            cfg.performance.copy_buffer_size
        );
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let partial = r#"
[upload]
temp_dir = "/var/spool/mailupload"
timeout_secs = 30

[upload.fields]
account = "42"
"#;
        let cfg: Config = toml::from_str(partial).expect("parse partial");
        assert_eq!(cfg.upload.timeout(), Some(Duration::from_secs(30)));
        assert_eq!(cfg.general.log_level, "warn");

        let options = UploadOptions::from_config(&cfg);
        assert!(options
            .temp_dir
            .to_string_lossy()
            .ends_with(MAIN_SEPARATOR_STR));
        assert_eq!(
            options.additional_fields.get("account").map(String::as_str),
            Some("42")
        );
    }

    #[test]
    fn test_default_options_use_platform_temp_dir() {
        let options = UploadOptions::default();
        assert!(options
            .temp_dir
            .to_string_lossy()
            .starts_with(&*std::env::temp_dir().to_string_lossy()));
        assert!(options
            .temp_dir
            .to_string_lossy()
            .ends_with(MAIN_SEPARATOR_STR));
    }

    #[test]
    fn test_parse_field() {
        assert_eq!(
            parse_field("token=a=b").expect("valid"),
            ("token".to_string(), "a=b".to_string())
        );
        assert_eq!(
            parse_field("empty=").expect("valid"),
            ("empty".to_string(), String::new())
        );
        assert!(parse_field("novalue").is_err());
        assert!(parse_field("=x").is_err());
    }
}
