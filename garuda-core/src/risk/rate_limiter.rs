//! Broker API rate limiting - token bucket per endpoint class
//!
//! The broker enforces separate per-second limits for order placement,
//! order reads, quotes, instrument dumps and GTTs. Each class gets its
//! own bucket; a denied permit surfaces `RATE_LIMITED` and retrying is
//! the caller's responsibility.

use crate::core::errors::EngineError;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Broker endpoint classes with independent limits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(usize)]
pub enum EndpointClass {
    Order = 0,
    OrdersRead = 1,
    Quote = 2,
    Instruments = 3,
    Gtt = 4,
}

pub const ENDPOINT_CLASS_COUNT: usize = 5;

impl EndpointClass {
    pub const fn as_str(&self) -> &'static str {
        match self {
            EndpointClass::Order => "ORDER",
            EndpointClass::OrdersRead => "ORDERS_READ",
            EndpointClass::Quote => "QUOTE",
            EndpointClass::Instruments => "INSTRUMENTS",
            EndpointClass::Gtt => "GTT",
        }
    }
}

/// Per-bucket configuration
#[derive(Debug, Clone, Copy)]
pub struct BucketConfig {
    /// Sustained permits per second
    pub refill_rate: f64,
    /// Burst capacity (tokens in the bucket)
    pub burst_capacity: u64,
    pub refill_interval: Duration,
}

impl BucketConfig {
    pub fn per_second(rate: f64, burst: u64) -> Self {
        Self {
            refill_rate: rate,
            burst_capacity: burst,
            refill_interval: Duration::from_millis(100),
        }
    }
}

/// Broker defaults, per endpoint class
pub fn default_bucket_configs() -> [BucketConfig; ENDPOINT_CLASS_COUNT] {
    [
        BucketConfig::per_second(10.0, 10), // ORDER
        BucketConfig::per_second(5.0, 5),   // ORDERS_READ
        BucketConfig::per_second(1.0, 1),   // QUOTE
        BucketConfig::per_second(1.0, 1),   // INSTRUMENTS
        BucketConfig::per_second(2.0, 2),   // GTT
    ]
}

/// Token bucket with lock-free consume (CAS loop) and a mutex-guarded
/// refill clock. Tokens are fixed-point (x1000) so fractional refill
/// rates accumulate correctly.
struct TokenBucket {
    config: BucketConfig,
    tokens: AtomicU64,
    last_refill: Mutex<Instant>,
    total_allowed: AtomicU64,
    total_rejected: AtomicU64,
}

impl TokenBucket {
    fn new(config: BucketConfig) -> Self {
        Self {
            tokens: AtomicU64::new(config.burst_capacity * 1000),
            last_refill: Mutex::new(Instant::now()),
            total_allowed: AtomicU64::new(0),
            total_rejected: AtomicU64::new(0),
            config,
        }
    }

    fn try_acquire(&self) -> bool {
        self.refill();

        let needed = 1000u64;
        let mut current = self.tokens.load(Ordering::Acquire);
        loop {
            if current < needed {
                self.total_rejected.fetch_add(1, Ordering::Relaxed);
                return false;
            }
            match self.tokens.compare_exchange_weak(
                current,
                current - needed,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    self.total_allowed.fetch_add(1, Ordering::Relaxed);
                    return true;
                }
                Err(actual) => current = actual,
            }
        }
    }

    fn refill(&self) {
        let mut last_refill = self.last_refill.lock();
        let now = Instant::now();
        let elapsed = now.duration_since(*last_refill);

        if elapsed < self.config.refill_interval {
            return;
        }

        let tokens_to_add = (self.config.refill_rate * elapsed.as_secs_f64() * 1000.0) as u64;
        if tokens_to_add > 0 {
            let max_tokens = self.config.burst_capacity * 1000;
            let current = self.tokens.load(Ordering::Acquire);
            let new_tokens = (current + tokens_to_add).min(max_tokens);
            self.tokens.store(new_tokens, Ordering::Release);
            *last_refill = now;

            debug!(
                added = tokens_to_add / 1000,
                available = new_tokens / 1000,
                "rate limiter refilled"
            );
        }
    }

    fn available(&self) -> u64 {
        self.tokens.load(Ordering::Acquire) / 1000
    }
}

/// Process-wide broker API limiter: one bucket per endpoint class.
pub struct ApiRateLimiter {
    buckets: [TokenBucket; ENDPOINT_CLASS_COUNT],
}

impl ApiRateLimiter {
    pub fn new() -> Self {
        Self::with_configs(default_bucket_configs())
    }

    pub fn with_configs(configs: [BucketConfig; ENDPOINT_CLASS_COUNT]) -> Self {
        Self {
            buckets: configs.map(TokenBucket::new),
        }
    }

    /// Take one permit for the endpoint class.
    pub fn acquire(&self, class: EndpointClass) -> Result<(), EngineError> {
        if self.buckets[class as usize].try_acquire() {
            Ok(())
        } else {
            warn!(endpoint = class.as_str(), "rate limit permit denied");
            Err(EngineError::RateLimited {
                endpoint: class.as_str(),
            })
        }
    }

    pub fn available(&self, class: EndpointClass) -> u64 {
        self.buckets[class as usize].available()
    }

    pub fn stats(&self, class: EndpointClass) -> (u64, u64) {
        let bucket = &self.buckets[class as usize];
        (
            bucket.total_allowed.load(Ordering::Relaxed),
            bucket.total_rejected.load(Ordering::Relaxed),
        )
    }
}

impl Default for ApiRateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_burst_then_denied() {
        let limiter = ApiRateLimiter::new();

        for i in 0..10 {
            assert!(limiter.acquire(EndpointClass::Order).is_ok(), "permit {}", i);
        }
        let err = limiter.acquire(EndpointClass::Order).unwrap_err();
        assert_eq!(err.tag(), "RATE_LIMITED");
    }

    #[test]
    fn test_classes_independent() {
        let limiter = ApiRateLimiter::new();

        // Exhaust QUOTE; ORDER still has permits
        assert!(limiter.acquire(EndpointClass::Quote).is_ok());
        assert!(limiter.acquire(EndpointClass::Quote).is_err());
        assert!(limiter.acquire(EndpointClass::Order).is_ok());
    }

    #[test]
    fn test_refill_restores_permits() {
        let mut configs = default_bucket_configs();
        configs[EndpointClass::Quote as usize] = BucketConfig {
            refill_rate: 50.0,
            burst_capacity: 1,
            refill_interval: Duration::from_millis(10),
        };
        let limiter = ApiRateLimiter::with_configs(configs);

        assert!(limiter.acquire(EndpointClass::Quote).is_ok());
        assert!(limiter.acquire(EndpointClass::Quote).is_err());

        thread::sleep(Duration::from_millis(40));
        assert!(limiter.acquire(EndpointClass::Quote).is_ok());
    }

    #[test]
    fn test_concurrent_acquire_counts() {
        let limiter = std::sync::Arc::new(ApiRateLimiter::new());

        let mut handles = Vec::new();
        for _ in 0..4 {
            let limiter = std::sync::Arc::clone(&limiter);
            handles.push(thread::spawn(move || {
                let mut granted = 0u64;
                for _ in 0..10 {
                    if limiter.acquire(EndpointClass::Order).is_ok() {
                        granted += 1;
                    }
                }
                granted
            }));
        }

        let granted: u64 = handles.into_iter().map(|h| h.join().unwrap()).sum();
        // Burst capacity is 10; refill may add a few during the run but
        // 40 requests cannot all be granted
        assert!(granted >= 10);
        assert!(granted < 40);

        let (allowed, rejected) = limiter.stats(EndpointClass::Order);
        assert_eq!(allowed, granted);
        assert_eq!(allowed + rejected, 40);
    }
}
