//! Linear reconnect backoff with a bounded attempt budget.

use std::time::Duration;

/// Configuration for the reconnect policy.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Failures tolerated before the hub gives up.
    pub max_attempts: u32,
    /// Backoff grows by this much per attempt.
    pub step: Duration,
    /// When set, a connection that stayed up at least this long resets the attempt count.
    /// `None` keeps the budget lifetime-wide.
    pub reset_after: Option<Duration>,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            step: Duration::from_millis(100),
            reset_after: None,
        }
    }
}

/// Stateless reconnect policy: computes the delay for a given attempt number.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    pub config: ReconnectConfig,
}

impl ReconnectPolicy {
    pub fn new(config: ReconnectConfig) -> Self {
        Self { config }
    }

    /// Delay before reconnecting after the `attempt`-th failure (1-based).
    /// Returns `None` once `attempt` exceeds `max_attempts`.
    pub fn next_delay(&self, attempt: u32) -> Option<Duration> {
        if attempt > self.config.max_attempts {
            return None;
        }
        Some(self.config.step.saturating_mul(attempt))
    }

    /// Returns `true` if a connection that streamed for `uptime` earns a fresh budget.
    pub fn resets_after(&self, uptime: Duration) -> bool {
        self.config.reset_after.is_some_and(|threshold| uptime >= threshold)
    }
}
