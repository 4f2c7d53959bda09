//! Runtime configuration structures
//!
//! Cold-path settings only; per-execution thresholds travel in
//! `MonitorConfig` and `BacktestRequest`. Loaded from TOML with
//! section-level defaults so a partial file is always usable.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub restart: RestartConfig,
    #[serde(default)]
    pub trailing: TrailingDefaults,
    #[serde(default)]
    pub square_off: SquareOffConfig,
    #[serde(default)]
    pub premium_exit: PremiumExitDefaults,
    #[serde(default)]
    pub defaults: PointsDefaults,
    #[serde(default)]
    pub monitoring: MonitoringConfig,
    #[serde(default)]
    pub journal: JournalConfig,
    #[serde(default)]
    pub charges: ChargesConfig,
}

/// Auto-restart gates. Paper and live are gated separately on top of
/// the master switch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestartConfig {
    pub auto_restart_enabled: bool,
    pub auto_restart_paper_enabled: bool,
    pub auto_restart_live_enabled: bool,
    pub max_auto_restarts: u32,
}

impl Default for RestartConfig {
    fn default() -> Self {
        Self {
            auto_restart_enabled: false,
            auto_restart_paper_enabled: false,
            auto_restart_live_enabled: false,
            max_auto_restarts: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrailingDefaults {
    pub enabled: bool,
    pub activation_points: f64,
    pub distance_points: f64,
}

impl Default for TrailingDefaults {
    fn default() -> Self {
        Self {
            enabled: false,
            activation_points: 5.0,
            distance_points: 2.0,
        }
    }
}

/// Forced square-off; `time` is "HH:mm" in the market zone
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SquareOffConfig {
    pub enabled: bool,
    pub time: String,
}

impl Default for SquareOffConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            time: "15:20".to_string(),
        }
    }
}

/// Percentages may be whole percents (5.0) or fractions (0.05); both
/// are accepted and normalized at use sites.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PremiumExitDefaults {
    pub enabled: bool,
    pub target_decay_pct: f64,
    pub stop_loss_expansion_pct: f64,
    pub leg_decay_pct: f64,
    pub leg_expansion_pct: f64,
}

impl Default for PremiumExitDefaults {
    fn default() -> Self {
        Self {
            enabled: false,
            target_decay_pct: 5.0,
            stop_loss_expansion_pct: 10.0,
            leg_decay_pct: 30.0,
            leg_expansion_pct: 30.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PointsDefaults {
    pub stop_loss_points: f64,
    pub target_points: f64,
}

impl Default for PointsDefaults {
    fn default() -> Self {
        Self {
            stop_loss_points: 10.0,
            target_points: 15.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringConfig {
    pub enable_prometheus: bool,
    pub metrics_addr: String,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            enable_prometheus: true,
            metrics_addr: "127.0.0.1:9090".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalConfig {
    pub enabled: bool,
    pub path: PathBuf,
}

impl Default for JournalConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            path: PathBuf::from("./data/executions.jsonl"),
        }
    }
}

/// Transaction-charge coefficients; the engine treats them as opaque.
/// Percents are fractions of traded value except brokerage, which is a
/// flat amount per executed order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChargesConfig {
    pub enabled: bool,
    pub brokerage_per_order: Decimal,
    /// Sell-side only, on premium
    pub stt_sell_pct: Decimal,
    pub exchange_txn_pct: Decimal,
    /// On brokerage + transaction charges
    pub gst_pct: Decimal,
    pub sebi_turnover_pct: Decimal,
    /// Buy-side only
    pub stamp_duty_buy_pct: Decimal,
}

impl Default for ChargesConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            brokerage_per_order: dec!(20),
            stt_sell_pct: dec!(0.000625),
            exchange_txn_pct: dec!(0.00035),
            gst_pct: dec!(0.18),
            sebi_turnover_pct: dec!(0.000001),
            stamp_duty_buy_pct: dec!(0.00003),
        }
    }
}
