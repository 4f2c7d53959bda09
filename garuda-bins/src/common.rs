//! Shared initialization and reporting for the binaries

use anyhow::{Context, Result};
use chrono::{NaiveDate, NaiveDateTime};
use garuda_core::backtest::{BacktestResult, BacktestStatus};
use garuda_core::data::Candle;

/// Initialize tracing/logging
pub fn init_logging(level: &str) -> Result<()> {
    garuda_core::utils::init_logger(level, false);
    Ok(())
}

pub fn parse_date(value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .with_context(|| format!("invalid date '{}', expected YYYY-MM-DD", value))
}

/// Load candles from a CSV file with rows
/// `timestamp,open,high,low,close,volume` (timestamp `YYYY-mm-dd HH:MM:SS`,
/// header optional).
pub fn load_candles_csv(path: &str) -> Result<Vec<Candle>> {
    let raw = std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path))?;

    let mut candles = Vec::new();
    for (number, line) in raw.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with("timestamp") {
            continue;
        }
        let fields: Vec<&str> = line.split(',').collect();
        if fields.len() < 5 {
            anyhow::bail!("line {}: expected at least 5 fields, got {}", number + 1, fields.len());
        }
        let timestamp = NaiveDateTime::parse_from_str(fields[0].trim(), "%Y-%m-%d %H:%M:%S")
            .with_context(|| format!("line {}: bad timestamp '{}'", number + 1, fields[0]))?;
        let parse = |i: usize| -> Result<f64> {
            fields[i]
                .trim()
                .parse::<f64>()
                .with_context(|| format!("line {}: bad number '{}'", number + 1, fields[i]))
        };
        let volume = fields
            .get(5)
            .and_then(|v| v.trim().parse::<i64>().ok())
            .unwrap_or(0);
        candles.push(Candle::new(timestamp, parse(1)?, parse(2)?, parse(3)?, parse(4)?, volume));
    }
    Ok(candles)
}

/// Print the result summary
pub fn print_result(result: &BacktestResult) {
    tracing::info!("=== Backtest Result ===");
    tracing::info!("Run:            {}", result.id);
    tracing::info!("Date:           {} ({})", result.date, result.underlying);

    if result.status == BacktestStatus::Failed {
        tracing::error!(
            "Status:         FAILED ({})",
            result.error_message.as_deref().unwrap_or("unknown")
        );
        return;
    }

    tracing::info!("Trades:         {}", result.trades.len());
    tracing::info!("P&L (points):   {:.2}", result.total_pnl_points);
    tracing::info!("Gross:          {}", result.gross_pnl_amount.round_dp(2));
    tracing::info!("Charges:        {}", result.total_charges.round_dp(2));
    tracing::info!("Net:            {}", result.net_pnl_amount.round_dp(2));
    tracing::info!(
        "Win rate:       {:.1}% ({}/{} wins)",
        result.win_rate * 100.0,
        result.win_count,
        result.trades.len()
    );
    tracing::info!("Max drawdown:   {:.2}%", result.max_drawdown_pct);
    tracing::info!("Profit factor:  {:.2}", result.profit_factor);
    tracing::info!("Restarts:       {}", result.restart_count);
    tracing::info!("Elapsed:        {} ms", result.elapsed_ms);

    for (i, trade) in result.trades.iter().enumerate() {
        tracing::info!(
            "  trade {}: {} -> {}  {:+.2} pts  net {}  [{}]",
            i + 1,
            trade.entry_time.time(),
            trade.exit_time.time(),
            trade.pnl_points,
            trade.net_amount.round_dp(2),
            trade.exit_reason
        );
    }
}
