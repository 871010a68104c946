// ── Telemetry snapshot ──
//
// The latest decoded value of every subscribed topic. Snapshots are
// immutable once published; updates build a modified copy.

use serde::{Deserialize, Serialize};

use super::topic::{PublisherMetric, TelemetryTopic};
use crate::error::DecodeError;
use crate::refresh::RefreshInterval;

/// A decoded topic payload, ready to be applied to a snapshot.
#[derive(Debug, Clone, PartialEq)]
pub enum TelemetryValue {
    Steering(f64),
    Braking(f64),
    Acceleration(f64),
    Gear(u32),
    ButtonStates(Vec<bool>),
    ButtonNames(Vec<String>),
    RefreshInterval(RefreshInterval),
    PublisherMetric(PublisherMetric, u64),
}

impl TelemetryValue {
    /// The topic this value was decoded from.
    pub fn topic(&self) -> TelemetryTopic {
        match self {
            Self::Steering(_) => TelemetryTopic::Steering,
            Self::Braking(_) => TelemetryTopic::Braking,
            Self::Acceleration(_) => TelemetryTopic::Acceleration,
            Self::Gear(_) => TelemetryTopic::Gear,
            Self::ButtonStates(_) => TelemetryTopic::ButtonStates,
            Self::ButtonNames(_) => TelemetryTopic::ButtonNames,
            Self::RefreshInterval(_) => TelemetryTopic::RefreshInterval,
            Self::PublisherMetric(metric, _) => TelemetryTopic::PublisherMetric(*metric),
        }
    }
}

/// Last reported value of each publisher-side metric topic.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublisherMetrics {
    pub count_of_updates: Option<u64>,
    pub up_time_in_seconds: Option<u64>,
    pub count_of_successful_topic_source_updates: Option<u64>,
    pub count_of_failed_topic_source_updates: Option<u64>,
    pub rate_of_updates_per_second: Option<u64>,
    pub rate_of_successful_topic_source_updates_per_second: Option<u64>,
}

impl PublisherMetrics {
    pub fn get(&self, metric: PublisherMetric) -> Option<u64> {
        match metric {
            PublisherMetric::CountOfUpdates => self.count_of_updates,
            PublisherMetric::UpTimeInSeconds => self.up_time_in_seconds,
            PublisherMetric::CountOfSuccessfulTopicSourceUpdates => {
                self.count_of_successful_topic_source_updates
            }
            PublisherMetric::CountOfFailedTopicSourceUpdates => {
                self.count_of_failed_topic_source_updates
            }
            PublisherMetric::RateOfUpdatesPerSecond => self.rate_of_updates_per_second,
            PublisherMetric::RateOfSuccessfulTopicSourceUpdatesPerSecond => {
                self.rate_of_successful_topic_source_updates_per_second
            }
        }
    }

    fn set(&mut self, metric: PublisherMetric, value: u64) {
        *self.slot_mut(metric) = Some(value);
    }

    fn slot_mut(&mut self, metric: PublisherMetric) -> &mut Option<u64> {
        match metric {
            PublisherMetric::CountOfUpdates => &mut self.count_of_updates,
            PublisherMetric::UpTimeInSeconds => &mut self.up_time_in_seconds,
            PublisherMetric::CountOfSuccessfulTopicSourceUpdates => {
                &mut self.count_of_successful_topic_source_updates
            }
            PublisherMetric::CountOfFailedTopicSourceUpdates => {
                &mut self.count_of_failed_topic_source_updates
            }
            PublisherMetric::RateOfUpdatesPerSecond => &mut self.rate_of_updates_per_second,
            PublisherMetric::RateOfSuccessfulTopicSourceUpdatesPerSecond => {
                &mut self.rate_of_successful_topic_source_updates_per_second
            }
        }
    }
}

/// Latest known telemetry values.
///
/// Steering is normalized to [-1.0, 1.0] (negative is left), braking and
/// acceleration to [0.0, 1.0]. Button states and names are index-paired and
/// always the same length, which is why they are only reachable through
/// accessors.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySnapshot {
    pub steering: f64,
    pub braking: f64,
    pub acceleration: f64,
    pub gear: u32,
    button_states: Vec<bool>,
    button_names: Vec<String>,
    /// The cadence the publisher reports it samples its inputs at.
    pub publisher_refresh_interval: Option<RefreshInterval>,
    pub publisher_metrics: PublisherMetrics,
}

impl TelemetrySnapshot {
    pub fn button_states(&self) -> &[bool] {
        &self.button_states
    }

    pub fn button_names(&self) -> &[String] {
        &self.button_names
    }

    /// `(name, pressed)` pairs in publisher order.
    pub fn buttons(&self) -> impl Iterator<Item = (&str, bool)> {
        self.button_names
            .iter()
            .map(String::as_str)
            .zip(self.button_states.iter().copied())
    }

    /// State of the button called `name`, if the publisher reported one.
    pub fn button(&self, name: &str) -> Option<bool> {
        self.buttons()
            .find(|(candidate, _)| *candidate == name)
            .map(|(_, pressed)| pressed)
    }

    /// Apply one decoded value. On error `self` is left untouched.
    pub(crate) fn apply(&mut self, value: &TelemetryValue) -> Result<(), DecodeError> {
        match value {
            TelemetryValue::Steering(v) => self.steering = *v,
            TelemetryValue::Braking(v) => self.braking = *v,
            TelemetryValue::Acceleration(v) => self.acceleration = *v,
            TelemetryValue::Gear(v) => self.gear = *v,
            TelemetryValue::ButtonStates(states) => self.apply_button_states(states)?,
            TelemetryValue::ButtonNames(names) => {
                self.button_states.resize(names.len(), false);
                self.button_names.clone_from(names);
            }
            TelemetryValue::RefreshInterval(interval) => {
                self.publisher_refresh_interval = Some(*interval);
            }
            TelemetryValue::PublisherMetric(metric, v) => self.publisher_metrics.set(*metric, *v),
        }
        Ok(())
    }

    fn apply_button_states(&mut self, states: &[bool]) -> Result<(), DecodeError> {
        if self.button_names.is_empty() {
            // Names not received yet: hold the slots with placeholders.
            self.button_names = (1..=states.len()).map(|i| format!("Button{i}")).collect();
        } else if states.len() != self.button_names.len() {
            return Err(DecodeError::ButtonCountMismatch {
                expected: self.button_names.len(),
                got: states.len(),
            });
        }
        self.button_states = states.to_vec();
        Ok(())
    }
}
