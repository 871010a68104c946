//! Configuration loading for f1link telemetry clients.
//!
//! A TOML file plus `F1LINK_`-prefixed environment variables, layered
//! with figment and translated into `f1link_core::ClientConfig`. Nested
//! keys use a double underscore: `F1LINK_REFRESH__MAX_FREQUENCY=60`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use f1link_core::{ClientConfig, CoreError, MetricsConfig, RefreshPolicyConfig, ServerIdentity};

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

impl From<CoreError> for ConfigError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::InvalidIdentity { field, reason } => Self::Validation {
                field: field.into(),
                reason,
            },
            CoreError::Config { message } => Self::Validation {
                field: "config".into(),
                reason: message,
            },
            other @ CoreError::Disconnecting => Self::Validation {
                field: "config".into(),
                reason: other.to_string(),
            },
        }
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Config {
    /// Publisher endpoint (e.g., "wss://telemetry.example.com").
    pub endpoint: Option<String>,

    /// Topic namespace the publisher writes under (e.g., "F1/Publisher").
    pub root_topic_path: Option<String>,

    /// Housekeeping tick in milliseconds.
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    #[serde(default)]
    pub refresh: RefreshSection,

    #[serde(default)]
    pub metrics: MetricsSection,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            endpoint: None,
            root_topic_path: None,
            tick_interval_ms: default_tick_interval_ms(),
            refresh: RefreshSection::default(),
            metrics: MetricsSection::default(),
        }
    }
}

fn default_tick_interval_ms() -> u64 {
    1000
}

/// `[refresh]`: bounds for the adaptive refresh cadence.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct RefreshSection {
    pub min_frequency: u32,
    pub max_frequency: u32,
    pub idle_window_ms: u64,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RefreshSection {
    fn default() -> Self {
        let defaults = RefreshPolicyConfig::default();
        Self {
            min_frequency: defaults.min_frequency,
            max_frequency: defaults.max_frequency,
            idle_window_ms: millis(defaults.idle_window),
            initial_backoff_ms: millis(defaults.initial_backoff),
            max_backoff_ms: millis(defaults.max_backoff),
        }
    }
}

impl From<&RefreshSection> for RefreshPolicyConfig {
    fn from(section: &RefreshSection) -> Self {
        Self {
            min_frequency: section.min_frequency,
            max_frequency: section.max_frequency,
            idle_window: Duration::from_millis(section.idle_window_ms),
            initial_backoff: Duration::from_millis(section.initial_backoff_ms),
            max_backoff: Duration::from_millis(section.max_backoff_ms),
        }
    }
}

/// `[metrics]`: rate window for the client metrics.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct MetricsSection {
    pub window_secs: u64,
}

impl Default for MetricsSection {
    fn default() -> Self {
        Self {
            window_secs: MetricsConfig::default().window.as_secs(),
        }
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("com", "f1link", "f1link").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("f1link");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the Config from the canonical path + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load the Config from `path` + environment. A missing file is not an
/// error; defaults and environment still apply.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("F1LINK_").split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<(), ConfigError> {
    save_config_to(cfg, &config_path())
}

pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── Translation ─────────────────────────────────────────────────────

impl Config {
    /// Build a validated `ClientConfig`.
    pub fn to_client_config(&self) -> Result<ClientConfig, ConfigError> {
        let endpoint = self.endpoint.as_deref().ok_or_else(|| missing("endpoint"))?;
        let root = self
            .root_topic_path
            .as_deref()
            .ok_or_else(|| missing("root_topic_path"))?;

        let identity = ServerIdentity::new(endpoint, root)?;

        let config = ClientConfig {
            identity,
            refresh: RefreshPolicyConfig::from(&self.refresh),
            metrics: MetricsConfig {
                window: Duration::from_secs(self.metrics.window_secs),
            },
            tick_interval: Duration::from_millis(self.tick_interval_ms),
        };
        config.validate()?;
        Ok(config)
    }
}

fn missing(field: &str) -> ConfigError {
    ConfigError::Validation {
        field: field.into(),
        reason: "not configured".into(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn write(dir: &tempfile::TempDir, contents: &str) -> PathBuf {
        let path = dir.path().join("config.toml");
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn defaults_mirror_core() {
        let cfg = Config::default();
        assert_eq!(cfg.tick_interval_ms, 1000);
        assert_eq!(cfg.metrics.window_secs, 5);
        assert_eq!(
            RefreshPolicyConfig::from(&cfg.refresh),
            RefreshPolicyConfig::default()
        );
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = load_config_from(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(cfg.refresh, RefreshSection::default());
        assert_eq!(cfg.metrics, MetricsSection::default());
    }

    #[test]
    fn file_values_override_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            &dir,
            r#"
endpoint = "wss://telemetry.example.com"
root_topic_path = "/F1/Publisher/"
tick_interval_ms = 250

[refresh]
max_frequency = 60
max_backoff_ms = 10000
"#,
        );

        let cfg = load_config_from(&path).unwrap();
        assert_eq!(cfg.endpoint.as_deref(), Some("wss://telemetry.example.com"));
        assert_eq!(cfg.tick_interval_ms, 250);
        assert_eq!(cfg.refresh.max_frequency, 60);
        assert_eq!(cfg.refresh.min_frequency, 1);

        let client = cfg.to_client_config().unwrap();
        assert_eq!(client.identity.root_topic_path(), "F1/Publisher");
        assert_eq!(client.tick_interval, Duration::from_millis(250));
        assert_eq!(client.refresh.max_backoff, Duration::from_secs(10));
        assert_eq!(client.metrics.window, Duration::from_secs(5));
    }

    #[test]
    fn malformed_file_is_a_figment_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "tick_interval_ms = \"soon\"\n");
        assert!(matches!(
            load_config_from(&path),
            Err(ConfigError::Figment(_))
        ));
    }

    #[test]
    fn missing_endpoint_is_rejected() {
        let cfg = Config {
            root_topic_path: Some("cars".into()),
            ..Config::default()
        };
        let err = cfg.to_client_config().unwrap_err();
        assert_eq!(err.to_string(), "invalid endpoint: not configured");
    }

    #[test]
    fn empty_root_is_rejected() {
        let cfg = Config {
            endpoint: Some("wss://example/test".into()),
            root_topic_path: Some("/".into()),
            ..Config::default()
        };
        assert!(matches!(
            cfg.to_client_config(),
            Err(ConfigError::Validation { field, .. }) if field == "root_topic_path"
        ));
    }

    #[test]
    fn out_of_bounds_tunables_are_rejected() {
        let mut cfg = Config {
            endpoint: Some("wss://example/test".into()),
            root_topic_path: Some("cars".into()),
            ..Config::default()
        };
        cfg.refresh.min_frequency = 0;
        assert!(matches!(
            cfg.to_client_config(),
            Err(ConfigError::Validation { field, .. }) if field == "config"
        ));

        cfg.refresh.min_frequency = 1;
        cfg.tick_interval_ms = 0;
        assert!(cfg.to_client_config().is_err());
    }

    #[test]
    fn oversized_metrics_window_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            &dir,
            r#"
endpoint = "wss://example/test"
root_topic_path = "cars"

[metrics]
window_secs = 4611686018427387903
"#,
        );

        let cfg = load_config_from(&path).unwrap();
        let err = cfg.to_client_config().unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid config: metrics window must not exceed 3600 seconds"
        );
    }

    #[test]
    fn save_then_load_preserves_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let mut cfg = Config {
            endpoint: Some("ws://localhost:8080".into()),
            root_topic_path: Some("F1/Publisher".into()),
            ..Config::default()
        };
        cfg.metrics.window_secs = 10;

        save_config_to(&cfg, &path).unwrap();
        assert_eq!(load_config_from(&path).unwrap(), cfg);
    }
}
