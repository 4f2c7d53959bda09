//! Prometheus metrics for the position engine
//!
//! Cold path only: counters are bumped on state transitions (exit
//! dispatch, restart, run completion), never per strategy evaluation.

use prometheus::{Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry};
use std::sync::Arc;
use tracing::info;

/// Central registry for all engine metrics
#[derive(Clone)]
pub struct MetricsRegistry {
    registry: Arc<Registry>,
    engine: Arc<EngineMetrics>,
    backtest: Arc<BacktestMetrics>,
}

impl MetricsRegistry {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Arc::new(Registry::new());
        let engine = Arc::new(EngineMetrics::new(&registry)?);
        let backtest = Arc::new(BacktestMetrics::new(&registry)?);

        info!("metrics registry initialized");
        Ok(Self {
            registry,
            engine,
            backtest,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn engine(&self) -> &EngineMetrics {
        &self.engine
    }

    pub fn backtest(&self) -> &BacktestMetrics {
        &self.backtest
    }
}

pub struct EngineMetrics {
    /// Ticks routed through dispatchers
    pub ticks_total: IntCounter,
    /// Exit actions dispatched, labelled by reason tag
    pub exits_total: IntCounterVec,
    /// Leg replacements requested
    pub leg_replacements_total: IntCounter,
    /// Auto-restarts scheduled
    pub restarts_scheduled_total: IntCounter,
    /// Currently active monitors
    pub active_monitors: IntGauge,
}

impl EngineMetrics {
    fn new(registry: &Registry) -> Result<Self, prometheus::Error> {
        let ticks_total = IntCounter::with_opts(
            Opts::new("engine_ticks_total", "Ticks routed to monitors").namespace("garuda"),
        )?;
        registry.register(Box::new(ticks_total.clone()))?;

        let exits_total = IntCounterVec::new(
            Opts::new("engine_exits_total", "Exit actions dispatched").namespace("garuda"),
            &["reason"],
        )?;
        registry.register(Box::new(exits_total.clone()))?;

        let leg_replacements_total = IntCounter::with_opts(
            Opts::new("engine_leg_replacements_total", "Leg replacements requested")
                .namespace("garuda"),
        )?;
        registry.register(Box::new(leg_replacements_total.clone()))?;

        let restarts_scheduled_total = IntCounter::with_opts(
            Opts::new("engine_restarts_scheduled_total", "Auto-restarts scheduled")
                .namespace("garuda"),
        )?;
        registry.register(Box::new(restarts_scheduled_total.clone()))?;

        let active_monitors = IntGauge::with_opts(
            Opts::new("engine_active_monitors", "Currently active position monitors")
                .namespace("garuda"),
        )?;
        registry.register(Box::new(active_monitors.clone()))?;

        Ok(Self {
            ticks_total,
            exits_total,
            leg_replacements_total,
            restarts_scheduled_total,
            active_monitors,
        })
    }
}

pub struct BacktestMetrics {
    /// Completed/failed runs
    pub runs_total: IntCounterVec,
    /// Trades produced across runs
    pub trades_total: IntCounter,
    /// Wall time per run
    pub run_seconds: Histogram,
}

impl BacktestMetrics {
    fn new(registry: &Registry) -> Result<Self, prometheus::Error> {
        let runs_total = IntCounterVec::new(
            Opts::new("backtest_runs_total", "Backtest runs by status").namespace("garuda"),
            &["status"],
        )?;
        registry.register(Box::new(runs_total.clone()))?;

        let trades_total = IntCounter::with_opts(
            Opts::new("backtest_trades_total", "Trades produced by backtests").namespace("garuda"),
        )?;
        registry.register(Box::new(trades_total.clone()))?;

        let run_seconds = Histogram::with_opts(
            HistogramOpts::new("backtest_run_seconds", "Backtest wall time")
                .namespace("garuda")
                .buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 30.0]),
        )?;
        registry.register(Box::new(run_seconds.clone()))?;

        Ok(Self {
            runs_total,
            trades_total,
            run_seconds,
        })
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new().expect("metrics registry must initialize")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_gathers_families() {
        let metrics = MetricsRegistry::new().unwrap();
        metrics.engine().ticks_total.inc_by(10);
        metrics.engine().exits_total.with_label_values(&["CUMULATIVE_TARGET_HIT"]).inc();
        metrics.backtest().runs_total.with_label_values(&["completed"]).inc();

        let families = metrics.registry().gather();
        let names: Vec<&str> = families.iter().map(|f| f.get_name()).collect();
        assert!(names.contains(&"garuda_engine_ticks_total"));
        assert!(names.contains(&"garuda_engine_exits_total"));
        assert!(names.contains(&"garuda_backtest_runs_total"));
    }
}
