// ── Adaptive refresh cadence ──
//
// `RefreshPolicy` turns recent inbound activity into an advisory
// `RefreshInterval`. While updates are flowing the frequency follows the
// observed rate; once the feed goes quiet (or the link is down) the
// frequency falls to its floor and the idle sleep backs off exponentially.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::controller::ConnectionState;
use crate::error::CoreError;

pub const MILLIS_PER_SECOND: u32 = 1000;

/// Cadence pair: `frequency` in updates per second, `sleep_duration` in
/// milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RefreshInterval {
    pub frequency: u32,
    pub sleep_duration: u32,
}

impl RefreshInterval {
    pub const fn new(frequency: u32, sleep_duration: u32) -> Self {
        Self {
            frequency,
            sleep_duration,
        }
    }

    /// Interval whose sleep is one period of `frequency`. Zero is treated as 1 Hz.
    pub fn from_frequency(frequency: u32) -> Self {
        let frequency = frequency.max(1);
        Self::new(frequency, MILLIS_PER_SECOND / frequency)
    }

    pub fn sleep(&self) -> Duration {
        Duration::from_millis(u64::from(self.sleep_duration))
    }
}

/// Bounds for the refresh policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshPolicyConfig {
    pub min_frequency: u32,
    pub max_frequency: u32,
    /// The feed counts as idle once no update has arrived for this long.
    pub idle_window: Duration,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RefreshPolicyConfig {
    fn default() -> Self {
        Self {
            min_frequency: 1,
            max_frequency: MILLIS_PER_SECOND,
            idle_window: Duration::from_secs(2),
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
        }
    }
}

impl RefreshPolicyConfig {
    pub fn validate(&self) -> Result<(), CoreError> {
        let fail = |message: &str| {
            Err(CoreError::Config {
                message: message.to_owned(),
            })
        };
        if self.min_frequency == 0 {
            return fail("refresh min_frequency must be at least 1");
        }
        if self.max_frequency < self.min_frequency {
            return fail("refresh max_frequency must not be below min_frequency");
        }
        if self.max_frequency > MILLIS_PER_SECOND {
            return fail("refresh max_frequency must not exceed 1000");
        }
        if self.initial_backoff < Duration::from_millis(1) {
            return fail("refresh initial_backoff must be at least 1ms");
        }
        if self.max_backoff < self.initial_backoff {
            return fail("refresh max_backoff must not be below initial_backoff");
        }
        if u32::try_from(self.max_backoff.as_millis()).is_err() {
            return fail("refresh max_backoff is too large");
        }
        Ok(())
    }
}

/// What the policy looks at on each evaluation.
#[derive(Debug, Clone, Copy)]
pub struct RefreshInput {
    pub state: ConnectionState,
    pub updates_per_second: u64,
    /// Time since the last successful update, `None` if there never was one.
    pub since_last_update: Option<Duration>,
}

#[derive(Debug)]
pub struct RefreshPolicy {
    config: RefreshPolicyConfig,
    idle_evaluations: u32,
    current: RefreshInterval,
}

impl RefreshPolicy {
    pub fn new(config: RefreshPolicyConfig) -> Self {
        let current = RefreshInterval::new(
            config.min_frequency.max(1),
            duration_millis(config.initial_backoff),
        );
        Self {
            config,
            idle_evaluations: 0,
            current,
        }
    }

    pub fn current(&self) -> RefreshInterval {
        self.current
    }

    /// Recompute the interval from `input`, remembering it as current.
    pub fn evaluate(&mut self, input: &RefreshInput) -> RefreshInterval {
        let active = input.state == ConnectionState::Connected
            && input
                .since_last_update
                .is_some_and(|age| age <= self.config.idle_window);

        self.current = if active {
            self.idle_evaluations = 0;
            let rate = u32::try_from(input.updates_per_second).unwrap_or(u32::MAX);
            let min = self.config.min_frequency.max(1);
            RefreshInterval::from_frequency(rate.clamp(min, self.config.max_frequency.max(min)))
        } else {
            let sleep = self.idle_backoff();
            self.idle_evaluations = self.idle_evaluations.saturating_add(1);
            RefreshInterval::new(self.config.min_frequency.max(1), sleep)
        };
        self.current
    }

    /// `min(initial * 2^n, max)` for the current idle streak, in ms.
    fn idle_backoff(&self) -> u32 {
        let initial = duration_millis(self.config.initial_backoff);
        let max = duration_millis(self.config.max_backoff).max(initial);
        let factor = 1u32
            .checked_shl(self.idle_evaluations)
            .unwrap_or(u32::MAX);
        initial.saturating_mul(factor).min(max)
    }
}

fn duration_millis(duration: Duration) -> u32 {
    u32::try_from(duration.as_millis())
        .unwrap_or(u32::MAX)
        .max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connected(rate: u64, age_ms: u64) -> RefreshInput {
        RefreshInput {
            state: ConnectionState::Connected,
            updates_per_second: rate,
            since_last_update: Some(Duration::from_millis(age_ms)),
        }
    }

    fn idle(state: ConnectionState) -> RefreshInput {
        RefreshInput {
            state,
            updates_per_second: 0,
            since_last_update: None,
        }
    }

    #[test]
    fn from_frequency_derives_sleep() {
        assert_eq!(RefreshInterval::from_frequency(50), RefreshInterval::new(50, 20));
        assert_eq!(RefreshInterval::from_frequency(1000), RefreshInterval::new(1000, 1));
        assert_eq!(RefreshInterval::from_frequency(0), RefreshInterval::new(1, 1000));
        assert_eq!(
            RefreshInterval::from_frequency(50).sleep(),
            Duration::from_millis(20)
        );
    }

    #[test]
    fn active_feed_tracks_rate() {
        let mut policy = RefreshPolicy::new(RefreshPolicyConfig::default());
        let interval = policy.evaluate(&connected(60, 100));
        assert_eq!(interval, RefreshInterval::new(60, 16));
        assert_eq!(policy.current(), interval);
    }

    #[test]
    fn rate_is_clamped() {
        let mut policy = RefreshPolicy::new(RefreshPolicyConfig::default());
        assert_eq!(policy.evaluate(&connected(0, 10)).frequency, 1);
        assert_eq!(policy.evaluate(&connected(5_000, 10)).frequency, 1000);
        assert_eq!(
            policy.evaluate(&connected(u64::MAX, 10)),
            RefreshInterval::new(1000, 1)
        );
    }

    #[test]
    fn idle_backoff_doubles_and_caps() {
        let mut policy = RefreshPolicy::new(RefreshPolicyConfig::default());
        let sleeps: Vec<u32> = (0..8)
            .map(|_| policy.evaluate(&idle(ConnectionState::NotConnected)).sleep_duration)
            .collect();
        assert_eq!(
            sleeps,
            vec![1000, 2000, 4000, 8000, 16000, 30000, 30000, 30000]
        );
        assert_eq!(policy.current().frequency, 1);
    }

    #[test]
    fn backoff_survives_long_idle_streaks() {
        let mut policy = RefreshPolicy::new(RefreshPolicyConfig::default());
        for _ in 0..100 {
            policy.evaluate(&idle(ConnectionState::Connecting));
        }
        assert_eq!(policy.current(), RefreshInterval::new(1, 30_000));
    }

    #[test]
    fn stale_feed_counts_as_idle() {
        let mut policy = RefreshPolicy::new(RefreshPolicyConfig::default());
        let interval = policy.evaluate(&connected(40, 2_500));
        assert_eq!(interval, RefreshInterval::new(1, 1000));
    }

    #[test]
    fn activity_resets_backoff() {
        let mut policy = RefreshPolicy::new(RefreshPolicyConfig::default());
        policy.evaluate(&idle(ConnectionState::Connected));
        policy.evaluate(&idle(ConnectionState::Connected));
        policy.evaluate(&connected(10, 0));
        assert_eq!(
            policy.evaluate(&idle(ConnectionState::Connected)).sleep_duration,
            1000
        );
    }

    #[test]
    fn invariants_hold_for_every_state() {
        let mut policy = RefreshPolicy::new(RefreshPolicyConfig::default());
        for state in [
            ConnectionState::NotConnected,
            ConnectionState::Connecting,
            ConnectionState::Connected,
            ConnectionState::Disconnecting,
        ] {
            let interval = policy.evaluate(&idle(state));
            assert!(interval.frequency > 0);
            assert!(interval.sleep_duration > 0);
        }
    }

    #[test]
    fn config_validation() {
        assert!(RefreshPolicyConfig::default().validate().is_ok());

        let zero_min = RefreshPolicyConfig {
            min_frequency: 0,
            ..RefreshPolicyConfig::default()
        };
        assert!(zero_min.validate().is_err());

        let inverted = RefreshPolicyConfig {
            min_frequency: 100,
            max_frequency: 10,
            ..RefreshPolicyConfig::default()
        };
        assert!(inverted.validate().is_err());

        let backoff = RefreshPolicyConfig {
            initial_backoff: Duration::from_secs(10),
            max_backoff: Duration::from_secs(1),
            ..RefreshPolicyConfig::default()
        };
        assert!(backoff.validate().is_err());
    }
}
