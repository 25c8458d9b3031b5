//! Processor configuration.

use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

/// What to do once a compensation has used up its attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OnExhausted {
    /// Log the failure and keep unwinding the earlier steps.
    Continue,

    /// Stop the rollback at the failing step and report it for manual
    /// intervention.
    #[default]
    Halt,
}

impl OnExhausted {
    pub fn as_str(&self) -> &'static str {
        match self {
            OnExhausted::Continue => "continue",
            OnExhausted::Halt => "halt",
        }
    }
}

/// Error returned when parsing an unknown [`OnExhausted`] value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown compensation exhaustion policy '{0}', expected 'halt' or 'continue'")]
pub struct UnknownPolicy(pub String);

impl FromStr for OnExhausted {
    type Err = UnknownPolicy;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "continue" => Ok(OnExhausted::Continue),
            "halt" => Ok(OnExhausted::Halt),
            _ => Err(UnknownPolicy(s.to_string())),
        }
    }
}

/// How failed compensation commands are retried and escalated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompensationPolicy {
    /// Total attempts per compensation, including the first. Zero is treated
    /// as one.
    pub max_attempts: u32,
    /// Delay before the second attempt; grows linearly with each retry.
    pub backoff: Duration,
    /// Behavior once all attempts failed.
    pub on_exhausted: OnExhausted,
}

impl CompensationPolicy {
    /// A single attempt, then keep unwinding whatever happened.
    pub fn best_effort() -> Self {
        Self {
            max_attempts: 1,
            backoff: Duration::ZERO,
            on_exhausted: OnExhausted::Continue,
        }
    }

    /// Retry up to `max_attempts` times, then halt the rollback.
    pub fn retry(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts,
            backoff,
            on_exhausted: OnExhausted::Halt,
        }
    }

    /// Sets the behavior once all attempts failed.
    pub fn on_exhausted(mut self, on_exhausted: OnExhausted) -> Self {
        self.on_exhausted = on_exhausted;
        self
    }

    /// Returns the effective number of attempts.
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Returns the delay to wait after failed attempt number `attempt`
    /// (starting at 1).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.backoff.saturating_mul(attempt)
    }
}

impl Default for CompensationPolicy {
    fn default() -> Self {
        Self::retry(3, Duration::from_millis(100))
    }
}

/// Configuration of a [`SagaProcessor`](crate::SagaProcessor).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessorConfig {
    /// Retry and escalation policy for compensation commands.
    pub compensation: CompensationPolicy,
    /// Capacity of the outcome event channel. Slow receivers that fall more
    /// than this many events behind miss the oldest ones.
    pub event_buffer: usize,
}

impl ProcessorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the compensation policy.
    pub fn with_compensation(mut self, compensation: CompensationPolicy) -> Self {
        self.compensation = compensation;
        self
    }

    /// Sets the outcome event buffer size.
    pub fn with_event_buffer(mut self, event_buffer: usize) -> Self {
        self.event_buffer = event_buffer;
        self
    }
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            compensation: CompensationPolicy::default(),
            event_buffer: 256,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let config = ProcessorConfig::default();
        assert_eq!(config.event_buffer, 256);
        assert_eq!(config.compensation.max_attempts, 3);
        assert_eq!(config.compensation.backoff, Duration::from_millis(100));
        assert_eq!(config.compensation.on_exhausted, OnExhausted::Halt);
    }

    #[test]
    fn test_best_effort_policy() {
        let policy = CompensationPolicy::best_effort();
        assert_eq!(policy.attempts(), 1);
        assert_eq!(policy.on_exhausted, OnExhausted::Continue);
    }

    #[test]
    fn test_zero_attempts_means_one() {
        let policy = CompensationPolicy::retry(0, Duration::from_millis(5));
        assert_eq!(policy.attempts(), 1);
    }

    #[test]
    fn test_linear_backoff() {
        let policy = CompensationPolicy::retry(4, Duration::from_millis(50));
        assert_eq!(policy.delay_after(1), Duration::from_millis(50));
        assert_eq!(policy.delay_after(3), Duration::from_millis(150));
    }

    #[test]
    fn test_on_exhausted_from_str() {
        assert_eq!("halt".parse::<OnExhausted>().unwrap(), OnExhausted::Halt);
        assert_eq!(
            " Continue ".parse::<OnExhausted>().unwrap(),
            OnExhausted::Continue
        );
        assert_eq!(
            "retry".parse::<OnExhausted>(),
            Err(UnknownPolicy("retry".to_string()))
        );
    }

    #[test]
    fn test_builder_methods() {
        let config = ProcessorConfig::new()
            .with_event_buffer(8)
            .with_compensation(CompensationPolicy::best_effort().on_exhausted(OnExhausted::Halt));
        assert_eq!(config.event_buffer, 8);
        assert_eq!(config.compensation.on_exhausted, OnExhausted::Halt);
        assert_eq!(OnExhausted::Halt.as_str(), "halt");
    }
}
