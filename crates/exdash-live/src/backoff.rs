/*
[INPUT]:  Backoff policy (floor, ceiling, growth factor)
[OUTPUT]: Successive reconnect delays
[POS]:    Live layer - reconnect pacing
[UPDATE]: When changing reconnect timing
*/

use std::time::Duration;

pub const RECONNECT_FLOOR: Duration = Duration::from_millis(1_500);
pub const RECONNECT_CEILING: Duration = Duration::from_secs(20);
pub const RECONNECT_FACTOR: f64 = 1.6;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffPolicy {
    pub floor: Duration,
    pub ceiling: Duration,
    pub factor: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            floor: RECONNECT_FLOOR,
            ceiling: RECONNECT_CEILING,
            factor: RECONNECT_FACTOR,
        }
    }
}

/// Exponential reconnect delay.
///
/// Grows across a run of consecutive failures and only returns to the floor
/// through `reset`, which the manager calls on a successful open.
#[derive(Debug, Clone)]
pub struct Backoff {
    policy: BackoffPolicy,
    current: Duration,
}

impl Backoff {
    pub fn new(policy: BackoffPolicy) -> Self {
        Self {
            policy,
            current: policy.floor,
        }
    }

    /// Delay the next reconnect will wait
    pub fn current(&self) -> Duration {
        self.current
    }

    /// Take the delay for this reconnect and grow the one after it.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        let grown = (self.current.as_millis() as f64 * self.policy.factor).round() as u64;
        self.current = Duration::from_millis(grown)
            .max(self.policy.floor)
            .min(self.policy.ceiling);
        delay
    }

    pub fn reset(&mut self) {
        self.current = self.policy.floor;
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(BackoffPolicy::default())
    }
}
