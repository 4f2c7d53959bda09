//! Configuration loading and validation
//!
//! Runtime TOML for cold-path settings; hot-path thresholds are
//! per-execution inputs carried on `MonitorConfig` / `BacktestRequest`.
//! Validation rejects a bad file at startup so `CONFIG_INVALID` never
//! surfaces from the tick path.

pub mod types;

pub use types::{
    AppConfig, ChargesConfig, JournalConfig, MonitoringConfig, PointsDefaults,
    PremiumExitDefaults, RestartConfig, SquareOffConfig, TrailingDefaults,
};

use crate::market;
use anyhow::{bail, Context, Result};
use chrono::NaiveTime;
use std::path::Path;

/// Values >= 1.0 are whole percents and divided by 100; values in (0,1)
/// are already fractional.
#[inline]
pub fn normalize_pct(pct: f64) -> f64 {
    if pct >= 1.0 {
        pct / 100.0
    } else {
        pct
    }
}

impl AppConfig {
    /// Load and validate a TOML configuration file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {:?}", path))?;
        let config: AppConfig =
            toml::from_str(&raw).with_context(|| format!("failed to parse config file {:?}", path))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from the default location (./config/default.toml)
    pub fn load_default() -> Result<Self> {
        Self::load("config/default.toml")
    }

    /// Square-off cutoff parsed from "HH:mm"
    pub fn square_off_time(&self) -> Option<NaiveTime> {
        market::parse_hhmm(&self.square_off.time)
    }

    pub fn validate(&self) -> Result<()> {
        if self.defaults.stop_loss_points < 0.0 || self.defaults.target_points < 0.0 {
            bail!("default stop/target points must be non-negative");
        }

        if self.trailing.enabled {
            if self.trailing.activation_points <= 0.0 {
                bail!("trailing activation_points must be positive");
            }
            if self.trailing.distance_points <= 0.0 {
                bail!("trailing distance_points must be positive");
            }
            if self.trailing.distance_points >= self.trailing.activation_points {
                bail!("trailing distance_points must be below activation_points");
            }
        }

        if self.square_off.enabled {
            let time = self
                .square_off_time()
                .with_context(|| format!("invalid square_off time '{}'", self.square_off.time))?;
            if !market::is_within_session(time) {
                bail!(
                    "square_off time {} is outside the trading session",
                    self.square_off.time
                );
            }
        }

        for (name, pct) in [
            ("target_decay_pct", self.premium_exit.target_decay_pct),
            ("stop_loss_expansion_pct", self.premium_exit.stop_loss_expansion_pct),
            ("leg_decay_pct", self.premium_exit.leg_decay_pct),
            ("leg_expansion_pct", self.premium_exit.leg_expansion_pct),
        ] {
            if pct < 0.0 || pct > 100.0 {
                bail!("premium_exit.{} out of range: {}", name, pct);
            }
        }

        if self.restart.max_auto_restarts == 0 && self.restart.auto_restart_enabled {
            bail!("auto restart enabled with max_auto_restarts = 0");
        }

        if self.monitoring.enable_prometheus && self.monitoring.metrics_addr.parse::<std::net::SocketAddr>().is_err()
        {
            bail!("invalid monitoring.metrics_addr '{}'", self.monitoring.metrics_addr);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_pct() {
        assert_eq!(normalize_pct(5.0), 0.05);
        assert_eq!(normalize_pct(0.05), 0.05);
        assert_eq!(normalize_pct(1.0), 0.01);
        assert_eq!(normalize_pct(0.999), 0.999);
        assert_eq!(normalize_pct(100.0), 1.0);
    }

    #[test]
    fn test_default_config_is_valid() {
        AppConfig::default().validate().unwrap();
    }

    #[test]
    fn test_partial_toml_uses_section_defaults() {
        let config: AppConfig = toml::from_str(
            r#"
            [restart]
            auto_restart_enabled = true
            auto_restart_paper_enabled = true
            auto_restart_live_enabled = false
            max_auto_restarts = 2

            [square_off]
            enabled = true
            time = "15:10"
            "#,
        )
        .unwrap();
        config.validate().unwrap();

        assert!(config.restart.auto_restart_enabled);
        assert_eq!(config.restart.max_auto_restarts, 2);
        assert_eq!(
            config.square_off_time(),
            NaiveTime::from_hms_opt(15, 10, 0)
        );
        // Untouched sections fall back to defaults
        assert_eq!(config.defaults.target_points, 15.0);
        assert!(config.charges.enabled);
    }

    #[test]
    fn test_bad_square_off_time_rejected() {
        let mut config = AppConfig::default();
        config.square_off.time = "25:99".into();
        assert!(config.validate().is_err());

        config.square_off.time = "08:00".into(); // before session open
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_trailing_validation() {
        let mut config = AppConfig::default();
        config.trailing.enabled = true;
        config.trailing.activation_points = 2.0;
        config.trailing.distance_points = 5.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_restart_zero_budget_rejected() {
        let mut config = AppConfig::default();
        config.restart.auto_restart_enabled = true;
        config.restart.max_auto_restarts = 0;
        assert!(config.validate().is_err());
    }
}
