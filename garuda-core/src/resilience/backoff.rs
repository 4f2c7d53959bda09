//! Exponential backoff for retry logic
//!
//! Drives broker reconnection: fixed schedule 5s * 2^(attempt-1), capped
//! at 10 attempts. Jitter is available but off by default because the
//! broker schedule is specified exactly.

use rand::Rng;
use std::time::Duration;

/// Configuration for exponential backoff
#[derive(Debug, Clone)]
pub struct BackoffConfig {
    /// Initial delay before first retry
    pub initial_delay: Duration,
    /// Maximum delay between retries
    pub max_delay: Duration,
    /// Multiplier for each retry
    pub multiplier: f64,
    /// Maximum number of retry attempts (None = unlimited)
    pub max_retries: Option<usize>,
    /// Randomization to prevent thundering herd (0.0 to 1.0)
    pub jitter_factor: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self::broker_reconnect()
    }
}

impl BackoffConfig {
    /// The broker transport schedule: 5s, 10s, 20s, ... 10 attempts max.
    pub fn broker_reconnect() -> Self {
        Self {
            initial_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(1280),
            multiplier: 2.0,
            max_retries: Some(10),
            jitter_factor: 0.0,
        }
    }

    /// Fast retries for tests
    pub fn aggressive() -> Self {
        Self {
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(50),
            multiplier: 2.0,
            max_retries: Some(5),
            jitter_factor: 0.0,
        }
    }
}

/// Exponential backoff state machine
pub struct ExponentialBackoff {
    config: BackoffConfig,
    current_attempt: usize,
    current_delay: Duration,
}

impl ExponentialBackoff {
    pub fn new() -> Self {
        Self::with_config(BackoffConfig::default())
    }

    pub fn with_config(config: BackoffConfig) -> Self {
        Self {
            current_delay: config.initial_delay,
            current_attempt: 0,
            config,
        }
    }

    /// Get the next delay duration and advance the backoff state.
    ///
    /// Returns None when max retries are exhausted.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if let Some(max_retries) = self.config.max_retries {
            if self.current_attempt >= max_retries {
                return None;
            }
        }

        let delay = self.delay_with_jitter();

        self.current_attempt += 1;
        self.current_delay = std::cmp::min(
            Duration::from_secs_f64(self.current_delay.as_secs_f64() * self.config.multiplier),
            self.config.max_delay,
        );

        Some(delay)
    }

    fn delay_with_jitter(&self) -> Duration {
        if self.config.jitter_factor == 0.0 {
            return self.current_delay;
        }

        let mut rng = rand::thread_rng();
        let jitter = rng.gen::<f64>() * self.config.jitter_factor;
        let jitter_multiplier = 1.0 + (jitter - self.config.jitter_factor / 2.0);

        Duration::from_secs_f64(self.current_delay.as_secs_f64() * jitter_multiplier)
    }

    /// Reset to the initial state (after a successful connect)
    pub fn reset(&mut self) {
        self.current_attempt = 0;
        self.current_delay = self.config.initial_delay;
    }

    pub fn attempt_number(&self) -> usize {
        self.current_attempt
    }

    pub fn can_retry(&self) -> bool {
        match self.config.max_retries {
            Some(max) => self.current_attempt < max,
            None => true,
        }
    }

    pub fn config(&self) -> &BackoffConfig {
        &self.config
    }
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_broker_schedule() {
        let mut backoff = ExponentialBackoff::with_config(BackoffConfig::broker_reconnect());

        // 5s * 2^(attempt-1)
        let expected = [5u64, 10, 20, 40, 80, 160, 320, 640, 1280, 1280];
        for (i, secs) in expected.iter().enumerate() {
            let delay = backoff.next_delay().unwrap_or_else(|| panic!("attempt {} exhausted", i));
            assert_eq!(delay, Duration::from_secs(*secs), "attempt {}", i + 1);
        }

        // 11th attempt gives up
        assert!(backoff.next_delay().is_none());
        assert!(!backoff.can_retry());
    }

    #[test]
    fn test_reset_after_success() {
        let mut backoff = ExponentialBackoff::new();
        backoff.next_delay();
        backoff.next_delay();
        assert_eq!(backoff.attempt_number(), 2);

        backoff.reset();
        assert_eq!(backoff.attempt_number(), 0);
        assert_eq!(backoff.next_delay(), Some(Duration::from_secs(5)));
    }

    #[test]
    fn test_max_delay_cap() {
        let config = BackoffConfig {
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(100),
            multiplier: 2.0,
            max_retries: Some(20),
            jitter_factor: 0.0,
        };
        let mut backoff = ExponentialBackoff::with_config(config);

        let mut last = Duration::ZERO;
        for _ in 0..10 {
            if let Some(delay) = backoff.next_delay() {
                assert!(delay <= Duration::from_millis(100));
                last = delay;
            }
        }
        assert_eq!(last, Duration::from_millis(100));
    }

    #[test]
    fn test_jitter_varies_delays() {
        let config = BackoffConfig {
            jitter_factor: 0.2,
            ..BackoffConfig::broker_reconnect()
        };

        let mut delays = Vec::new();
        for _ in 0..3 {
            let mut backoff = ExponentialBackoff::with_config(config.clone());
            delays.push(backoff.next_delay().unwrap());
        }
        let all_equal = delays[0] == delays[1] && delays[1] == delays[2];
        assert!(!all_equal, "jitter should produce varying delays");
    }
}
