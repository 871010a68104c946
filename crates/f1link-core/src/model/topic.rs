// ── Topic tree ──
//
// Every telemetry field has its own topic below the client's root path.
// Names match ASCII case-insensitively so `cars/steering` and
// `cars/Steering` address the same field.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr};

/// The six counters a publisher exposes under `Metrics/`.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    IntoStaticStr,
)]
#[strum(ascii_case_insensitive)]
pub enum PublisherMetric {
    CountOfUpdates,
    UpTimeInSeconds,
    CountOfSuccessfulTopicSourceUpdates,
    CountOfFailedTopicSourceUpdates,
    RateOfUpdatesPerSecond,
    RateOfSuccessfulTopicSourceUpdatesPerSecond,
}

/// A topic this client knows how to decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TelemetryTopic {
    Steering,
    Braking,
    Acceleration,
    Gear,
    ButtonStates,
    ButtonNames,
    RefreshInterval,
    PublisherMetric(PublisherMetric),
}

impl TelemetryTopic {
    /// Resolve an inbound topic path against the client's root.
    ///
    /// Accepts absolute (`/cars/Gear`), rooted (`cars/Gear`) and bare
    /// (`Gear`) paths. `root` must already be normalized (no surrounding `/`).
    pub fn resolve(root: &str, path: &str) -> Option<Self> {
        let path = path.trim().trim_start_matches('/');
        let relative = strip_root(root, path).unwrap_or(path);
        relative.parse().ok()
    }

    /// Leaf label used in logs and decode errors.
    pub fn label(self) -> &'static str {
        match self {
            Self::Steering => "Steering",
            Self::Braking => "Braking",
            Self::Acceleration => "Acceleration",
            Self::Gear => "Gear",
            Self::ButtonStates => "Buttons/States",
            Self::ButtonNames => "Buttons/Names",
            Self::RefreshInterval => "RefreshInterval",
            Self::PublisherMetric(metric) => metric.into(),
        }
    }

    /// Path of this topic relative to the root topic path.
    pub fn relative_path(self) -> String {
        match self {
            Self::PublisherMetric(metric) => format!("Metrics/{metric}"),
            other => other.label().to_owned(),
        }
    }
}

impl fmt::Display for TelemetryTopic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.relative_path())
    }
}

/// Error for a topic path that names nothing this client decodes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownTopic;

impl FromStr for TelemetryTopic {
    type Err = UnknownTopic;

    /// Parse a path relative to the root topic path.
    fn from_str(relative: &str) -> Result<Self, Self::Err> {
        let mut segments = relative.trim_matches('/').split('/');
        let first = segments.next().ok_or(UnknownTopic)?;
        let second = segments.next();
        if segments.next().is_some() {
            return Err(UnknownTopic);
        }

        let is = |candidate: &str, expected: &str| candidate.eq_ignore_ascii_case(expected);
        match (first, second) {
            (s, None) if is(s, "Steering") => Ok(Self::Steering),
            (s, None) if is(s, "Braking") => Ok(Self::Braking),
            (s, None) if is(s, "Acceleration") => Ok(Self::Acceleration),
            (s, None) if is(s, "Gear") => Ok(Self::Gear),
            (s, None) if is(s, "RefreshInterval") => Ok(Self::RefreshInterval),
            (s, Some(leaf)) if is(s, "Buttons") && is(leaf, "States") => Ok(Self::ButtonStates),
            (s, Some(leaf)) if is(s, "Buttons") && is(leaf, "Names") => Ok(Self::ButtonNames),
            (s, Some(leaf)) if is(s, "Metrics") => leaf
                .parse::<PublisherMetric>()
                .map(Self::PublisherMetric)
                .map_err(|_| UnknownTopic),
            _ => Err(UnknownTopic),
        }
    }
}

fn strip_root<'a>(root: &str, path: &'a str) -> Option<&'a str> {
    let prefix = path.get(..root.len())?;
    if !prefix.eq_ignore_ascii_case(root) {
        return None;
    }
    path.get(root.len()..)?.strip_prefix('/')
}
