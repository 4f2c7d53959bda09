//! Fixture builders for monitors, legs, candles and ticks
//!
//! Conventions used across the test suite: trading day 2024-08-01,
//! CE leg token 1001, PE leg token 1002, lot size 50.

use crate::core::types::{Direction, ExecutionId, LegSide, OptionType, SlMode, Tick};
use crate::data::Candle;
use crate::monitor::position::{MonitorCallbacks, MonitorConfig, PositionMonitor, PremiumExitConfig};
use chrono::{NaiveDate, NaiveDateTime};
use std::sync::Arc;

pub const CE_TOKEN: u64 = 1001;
pub const PE_TOKEN: u64 = 1002;
pub const LOT_SIZE: u32 = 50;

pub fn trading_day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 8, 1).expect("static date")
}

pub fn ts(hour: u32, minute: u32) -> NaiveDateTime {
    trading_day().and_hms_opt(hour, minute, 0).expect("static time")
}

pub fn candle(hour: u32, minute: u32, open: f64, high: f64, low: f64, close: f64) -> Candle {
    Candle::new(ts(hour, minute), open, high, low, close, 10_000)
}

/// Points-mode monitor with the given thresholds and no callbacks
pub fn points_monitor(direction: Direction, target: f64, stop: f64) -> Arc<PositionMonitor> {
    points_monitor_with(direction, target, stop, MonitorCallbacks::default())
}

pub fn points_monitor_with(
    direction: Direction,
    target: f64,
    stop: f64,
    callbacks: MonitorCallbacks,
) -> Arc<PositionMonitor> {
    let mut config = MonitorConfig::new(ExecutionId::generate(), "test-user", direction);
    config.sl_mode = SlMode::Points;
    config.target_points = target;
    config.stop_loss_points = stop;
    Arc::new(PositionMonitor::new(config, callbacks).expect("valid test config"))
}

/// Premium-mode monitor with 5% decay / 10% expansion and 30/30 leg
/// adjustment thresholds
pub fn premium_monitor(entry_premium: f64, callbacks: MonitorCallbacks) -> Arc<PositionMonitor> {
    let mut config = MonitorConfig::new(ExecutionId::generate(), "test-user", Direction::Short);
    config.sl_mode = SlMode::Premium;
    config.premium = PremiumExitConfig {
        enabled: true,
        entry_premium,
        target_decay_pct: 0.05,
        stop_loss_expansion_pct: 0.10,
        leg_decay_pct: 0.30,
        leg_expansion_pct: 0.30,
    };
    Arc::new(PositionMonitor::new(config, callbacks).expect("valid test config"))
}

/// Add the conventional CE/PE straddle legs
pub fn add_straddle_legs(monitor: &PositionMonitor, ce_entry: f64, pe_entry: f64) {
    monitor.add_leg(
        "BT-CE",
        "NIFTY24AUG22500CE",
        CE_TOKEN,
        ce_entry,
        LOT_SIZE,
        OptionType::CE,
        LegSide::Primary,
    );
    monitor.add_leg(
        "BT-PE",
        "NIFTY24AUG22500PE",
        PE_TOKEN,
        pe_entry,
        LOT_SIZE,
        OptionType::PE,
        LegSide::Primary,
    );
}

/// Tick pair hitting both straddle legs
pub fn straddle_ticks(ce_price: f64, pe_price: f64) -> [Tick; 2] {
    [Tick::new(CE_TOKEN, ce_price), Tick::new(PE_TOKEN, pe_price)]
}
