//! Process-wide instrument dump cache
//!
//! The dump is large and changes rarely intraday: cache it per exchange
//! with a 5-minute TTL. Concurrent misses for the same exchange collapse
//! into one fetch (single-flight) under a per-exchange lock; readers of
//! a fresh entry never block.

use super::{Exchange, Instrument};
use crate::core::errors::EngineError;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Dump TTL: one backtest fetches at most once, live sessions refresh
/// every five minutes at worst
pub const DUMP_TTL: Duration = Duration::from_secs(300);

/// Fetches the full instrument dump for an exchange (broker API or a
/// file in tests).
pub trait InstrumentSource: Send + Sync {
    fn fetch(&self, exchange: Exchange) -> Result<Vec<Instrument>, EngineError>;
}

struct CacheEntry {
    dump: Arc<Vec<Instrument>>,
    fetched_at: Instant,
}

pub struct InstrumentCache {
    ttl: Duration,
    entries: DashMap<Exchange, CacheEntry>,
    /// One flight guard per exchange
    flights: DashMap<Exchange, Arc<Mutex<()>>>,
}

static GLOBAL: OnceLock<InstrumentCache> = OnceLock::new();

impl InstrumentCache {
    pub fn new() -> Self {
        Self::with_ttl(DUMP_TTL)
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: DashMap::new(),
            flights: DashMap::new(),
        }
    }

    /// The process-wide cache shared by live sessions and backtests.
    pub fn global() -> &'static InstrumentCache {
        GLOBAL.get_or_init(InstrumentCache::new)
    }

    /// Fresh dump for the exchange, fetching through `source` on miss or
    /// expiry. Concurrent misses fetch once.
    pub fn get_or_fetch(
        &self,
        exchange: Exchange,
        source: &dyn InstrumentSource,
    ) -> Result<Arc<Vec<Instrument>>, EngineError> {
        if let Some(dump) = self.fresh(exchange) {
            return Ok(dump);
        }

        let flight = self
            .flights
            .entry(exchange)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = flight.lock();

        // Another flight may have filled the entry while we waited
        if let Some(dump) = self.fresh(exchange) {
            debug!(%exchange, "instrument dump filled by concurrent flight");
            return Ok(dump);
        }

        let dump = Arc::new(source.fetch(exchange)?);
        info!(%exchange, rows = dump.len(), "instrument dump fetched");
        self.entries.insert(
            exchange,
            CacheEntry {
                dump: Arc::clone(&dump),
                fetched_at: Instant::now(),
            },
        );
        Ok(dump)
    }

    /// Drop the cached dump for an exchange (or all, with None).
    pub fn invalidate(&self, exchange: Option<Exchange>) {
        match exchange {
            Some(exchange) => {
                self.entries.remove(&exchange);
            }
            None => self.entries.clear(),
        }
    }

    fn fresh(&self, exchange: Exchange) -> Option<Arc<Vec<Instrument>>> {
        let entry = self.entries.get(&exchange)?;
        if entry.fetched_at.elapsed() < self.ttl {
            Some(Arc::clone(&entry.dump))
        } else {
            None
        }
    }
}

impl Default for InstrumentCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruments::InstrumentKind;
    use chrono::NaiveDate;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSource {
        fetches: AtomicUsize,
        delay: Duration,
    }

    impl CountingSource {
        fn new() -> Self {
            Self {
                fetches: AtomicUsize::new(0),
                delay: Duration::ZERO,
            }
        }
    }

    impl InstrumentSource for CountingSource {
        fn fetch(&self, exchange: Exchange) -> Result<Vec<Instrument>, EngineError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(self.delay);
            Ok(vec![Instrument {
                instrument_token: 1,
                tradingsymbol: "NIFTY24AUG22500CE".into(),
                name: "NIFTY".into(),
                expiry: NaiveDate::from_ymd_opt(2024, 8, 29).unwrap(),
                strike: 22_500.0,
                lot_size: 50,
                kind: InstrumentKind::CE,
                exchange,
            }])
        }
    }

    #[test]
    fn test_second_read_is_cached() {
        let cache = InstrumentCache::new();
        let source = CountingSource::new();

        let first = cache.get_or_fetch(Exchange::Nfo, &source).unwrap();
        let second = cache.get_or_fetch(Exchange::Nfo, &source).unwrap();
        assert_eq!(source.fetches.load(Ordering::SeqCst), 1);
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_ttl_expiry_refetches() {
        let cache = InstrumentCache::with_ttl(Duration::from_millis(10));
        let source = CountingSource::new();

        cache.get_or_fetch(Exchange::Nfo, &source).unwrap();
        std::thread::sleep(Duration::from_millis(20));
        cache.get_or_fetch(Exchange::Nfo, &source).unwrap();
        assert_eq!(source.fetches.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_exchanges_cached_independently() {
        let cache = InstrumentCache::new();
        let source = CountingSource::new();

        cache.get_or_fetch(Exchange::Nfo, &source).unwrap();
        cache.get_or_fetch(Exchange::Nse, &source).unwrap();
        assert_eq!(source.fetches.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_invalidate() {
        let cache = InstrumentCache::new();
        let source = CountingSource::new();

        cache.get_or_fetch(Exchange::Nfo, &source).unwrap();
        cache.invalidate(Some(Exchange::Nfo));
        cache.get_or_fetch(Exchange::Nfo, &source).unwrap();
        assert_eq!(source.fetches.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_single_flight_under_contention() {
        let cache = Arc::new(InstrumentCache::new());
        let source = Arc::new(CountingSource {
            fetches: AtomicUsize::new(0),
            delay: Duration::from_millis(30),
        });

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = Arc::clone(&cache);
            let source = Arc::clone(&source);
            handles.push(std::thread::spawn(move || {
                cache.get_or_fetch(Exchange::Nfo, source.as_ref()).unwrap();
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(source.fetches.load(Ordering::SeqCst), 1);
    }
}
