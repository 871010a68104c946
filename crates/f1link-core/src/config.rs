// ── Runtime client configuration ──
//
// These types describe *where* to connect and how the derived metrics and
// refresh cadence are computed. Core never reads config files; the
// `f1link-config` crate builds a `ClientConfig` and hands it in.

use std::time::Duration;

use url::Url;

use crate::error::CoreError;
use crate::refresh::RefreshPolicyConfig;

/// Immutable (endpoint, root topic path) pair identifying what to subscribe to.
///
/// Only constructible through validation, so a `ServerIdentity` in hand is
/// always usable: the endpoint is a URL with a host and the root topic path
/// is non-empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerIdentity {
    endpoint: Url,
    root_topic_path: String,
}

impl ServerIdentity {
    /// Validate and build an identity from raw strings.
    ///
    /// The root topic path is normalized: leading and trailing `/` are
    /// stripped, so `"/cars/"` and `"cars"` name the same namespace.
    pub fn new(endpoint: &str, root_topic_path: &str) -> Result<Self, CoreError> {
        let endpoint = endpoint.trim();
        if endpoint.is_empty() {
            return Err(CoreError::InvalidIdentity {
                field: "endpoint",
                reason: "must not be empty".into(),
            });
        }
        let url = Url::parse(endpoint).map_err(|e| CoreError::InvalidIdentity {
            field: "endpoint",
            reason: format!("is not a valid URL ({e})"),
        })?;
        Self::from_url(url, root_topic_path)
    }

    /// Build an identity from an already-parsed URL.
    pub fn from_url(endpoint: Url, root_topic_path: &str) -> Result<Self, CoreError> {
        if endpoint.host_str().is_none_or(str::is_empty) {
            return Err(CoreError::InvalidIdentity {
                field: "endpoint",
                reason: format!("must include a host, got '{endpoint}'"),
            });
        }
        let root_topic_path = normalize_root(root_topic_path)?;
        Ok(Self {
            endpoint,
            root_topic_path,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// The normalized root topic path (no leading or trailing `/`).
    pub fn root_topic_path(&self) -> &str {
        &self.root_topic_path
    }
}

fn normalize_root(raw: &str) -> Result<String, CoreError> {
    let trimmed = raw.trim().trim_matches('/');
    if trimmed.is_empty() {
        return Err(CoreError::InvalidIdentity {
            field: "root_topic_path",
            reason: "must not be empty".into(),
        });
    }
    if trimmed.split('/').any(|segment| segment.trim().is_empty()) {
        return Err(CoreError::InvalidIdentity {
            field: "root_topic_path",
            reason: format!("must not contain empty segments, got '{raw}'"),
        });
    }
    Ok(trimmed.to_owned())
}

/// Rate window configuration for the metrics collector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsConfig {
    /// Trailing window the per-second rates are averaged over.
    /// Rounded down to whole seconds, between one second and
    /// [`MAX_WINDOW`](Self::MAX_WINDOW).
    pub window: Duration,
}

impl MetricsConfig {
    /// One rate bucket is allocated per second of the window.
    pub const MAX_WINDOW: Duration = Duration::from_secs(3600);
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(5),
        }
    }
}

/// Everything a `TelemetryClient` needs besides its transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub identity: ServerIdentity,
    pub refresh: RefreshPolicyConfig,
    pub metrics: MetricsConfig,
    /// How often the housekeeping task republishes metrics and re-evaluates
    /// the refresh policy.
    pub tick_interval: Duration,
}

impl ClientConfig {
    pub fn new(identity: ServerIdentity) -> Self {
        Self {
            identity,
            refresh: RefreshPolicyConfig::default(),
            metrics: MetricsConfig::default(),
            tick_interval: Duration::from_secs(1),
        }
    }

    /// Check the tunables for values the engine cannot work with.
    pub fn validate(&self) -> Result<(), CoreError> {
        self.refresh.validate()?;
        if self.metrics.window < Duration::from_secs(1) {
            return Err(CoreError::Config {
                message: "metrics window must be at least one second".into(),
            });
        }
        if self.metrics.window > MetricsConfig::MAX_WINDOW {
            return Err(CoreError::Config {
                message: format!(
                    "metrics window must not exceed {} seconds",
                    MetricsConfig::MAX_WINDOW.as_secs()
                ),
            });
        }
        if self.tick_interval.is_zero() {
            return Err(CoreError::Config {
                message: "tick interval must be greater than zero".into(),
            });
        }
        Ok(())
    }
}
