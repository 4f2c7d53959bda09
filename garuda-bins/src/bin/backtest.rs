//! Backtest runner: replay one session of index candles from CSV
//! through the short-straddle strategy.
//!
//! ```bash
//! backtest --date 2024-08-01 --expiry 2024-08-29 --candles nifty_0801.csv \
//!     --target 15 --stop 10 --lots 1
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use garuda_bins::common::{init_logging, load_candles_csv, parse_date, print_result};
use garuda_core::backtest::{BacktestEngine, BacktestRequest, ResultCache};
use garuda_core::config::AppConfig;
use garuda_core::core::types::{Direction, SlMode};
use garuda_core::data::InMemoryHistory;
use garuda_core::instruments::{Exchange, Instrument, InstrumentKind, Underlying};
use garuda_core::monitor::position::TrailingConfig;
use garuda_core::resilience::install_panic_handler;
use garuda_strategies::{IndianOptionsCharges, ShortStraddleStrategy};
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(author, version, about = "Candle-replay backtest for index option strategies")]
struct Args {
    /// Trading date (YYYY-MM-DD)
    #[arg(long)]
    date: String,

    /// Contract expiry (YYYY-MM-DD)
    #[arg(long)]
    expiry: String,

    /// Index underlying
    #[arg(long, default_value = "NIFTY")]
    underlying: String,

    /// CSV of session candles: timestamp,open,high,low,close,volume
    #[arg(long)]
    candles: String,

    /// Lots to trade
    #[arg(long, default_value = "1")]
    lots: u32,

    /// Target in cumulative points
    #[arg(long, default_value = "15")]
    target: f64,

    /// Stop-loss in cumulative points
    #[arg(long, default_value = "10")]
    stop: f64,

    /// Stop-loss mode: points, premium or mtm
    #[arg(long, default_value = "points")]
    sl_mode: String,

    /// Enable the trailing stop
    #[arg(long)]
    trailing: bool,

    /// Disable restart fast-forward to the 5-minute boundary
    #[arg(long)]
    no_fast_forward: bool,

    /// Skip transaction charges
    #[arg(long)]
    no_charges: bool,

    /// Optional TOML config for trailing/charge defaults
    #[arg(long)]
    config: Option<String>,

    /// Write the full result as JSON to this path
    #[arg(long)]
    output: Option<String>,

    /// Log level
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level)?;
    install_panic_handler();

    let app_config = match &args.config {
        Some(path) => AppConfig::load(path)?,
        None => AppConfig::default(),
    };

    let date = parse_date(&args.date)?;
    let expiry = parse_date(&args.expiry)?;
    let underlying: Underlying = args
        .underlying
        .parse()
        .map_err(|e: String| anyhow::anyhow!(e))?;

    let candles = load_candles_csv(&args.candles)?;
    let spot_open = candles
        .first()
        .map(|c| c.open)
        .context("candle file is empty")?;

    let mut history = InMemoryHistory::new();
    history.insert_day(date, candles);

    let mut request = BacktestRequest::new(date, underlying, expiry, args.lots);
    request.direction = Direction::Short;
    request.target_points = args.target;
    request.stop_loss_points = args.stop;
    request.sl_mode = match args.sl_mode.to_ascii_lowercase().as_str() {
        "points" => SlMode::Points,
        "premium" => SlMode::Premium,
        "mtm" => SlMode::Mtm,
        other => anyhow::bail!("unknown sl mode '{}'", other),
    };
    request.fast_forward_enabled = !args.no_fast_forward;
    request.charges_enabled = !args.no_charges;
    request.max_restarts = app_config.restart.max_auto_restarts;
    if args.trailing {
        request.trailing = TrailingConfig {
            enabled: true,
            activation_points: app_config.trailing.activation_points,
            distance_points: app_config.trailing.distance_points,
        };
    }
    request.square_off = app_config.square_off_time();

    // No broker in a CSV replay: synthesize the option chain around the
    // opening spot
    let dump = Arc::new(synthetic_chain(underlying, expiry, spot_open));

    let engine = BacktestEngine::new(Arc::new(history))
        .with_charge_model(Arc::new(IndianOptionsCharges::new(app_config.charges.clone())));
    let mut strategy = ShortStraddleStrategy::new(dump);

    let result = engine.run(request, &mut strategy);
    print_result(&result);

    if let Some(path) = &args.output {
        let json = serde_json::to_string_pretty(&result).context("failed to serialize result")?;
        std::fs::write(path, json).with_context(|| format!("failed to write {}", path))?;
        tracing::info!("result written to {}", path);
    }
    ResultCache::global().insert(result);

    Ok(())
}

/// Strikes every interval for +/- 20 steps around the opening spot
fn synthetic_chain(underlying: Underlying, expiry: chrono::NaiveDate, spot: f64) -> Vec<Instrument> {
    let interval = underlying.strike_interval();
    let atm = (spot / interval).round() * interval;

    let mut dump = Vec::new();
    let mut token = 1_000u64;
    for step in -20i64..=20 {
        let strike = atm + step as f64 * interval;
        for kind in [InstrumentKind::CE, InstrumentKind::PE] {
            let suffix = if kind == InstrumentKind::CE { "CE" } else { "PE" };
            dump.push(Instrument {
                instrument_token: token,
                tradingsymbol: format!("{}{}{}", underlying.as_str(), strike as i64, suffix),
                name: underlying.as_str().to_string(),
                expiry,
                strike,
                lot_size: 50,
                kind,
                exchange: Exchange::Nfo,
            });
            token += 1;
        }
    }
    dump
}
