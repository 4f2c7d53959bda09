//! Paper trading runner: drive the live dispatcher/monitor path from a
//! recorded tick file with the simulated order gateway.
//!
//! Tick file rows: `instrument_token,ltp` (header optional). The CE and
//! PE legs are seeded from the command line; exits square off through
//! the simulated gateway exactly as the live path would.

use anyhow::{Context, Result};
use clap::Parser;
use garuda_bins::common::init_logging;
use garuda_core::core::types::{Direction, ExecutionId, LegSide, OptionType, SlMode, Tick};
use garuda_core::execution::{
    CompletedExecution, ExecutionJournal, JournalEvent, LegFill, OrderGateway, OrderRequest,
    SimulatedGateway, TransactionType,
};
use garuda_core::market;
use garuda_core::instruments::Exchange;
use garuda_core::monitor::dispatcher::{NullTransport, TickDispatcher};
use garuda_core::monitor::position::{MonitorCallbacks, MonitorConfig, PositionMonitor};
use garuda_core::monitoring::{spawn_metrics_server, MetricsRegistry, MetricsServerConfig};
use garuda_core::resilience::install_panic_handler;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(author, version, about = "Replay recorded ticks through the live monitoring path")]
struct Args {
    /// CSV of ticks: instrument_token,ltp
    #[arg(long)]
    ticks: String,

    /// CE leg: token, symbol and entry price
    #[arg(long, default_value = "1001")]
    ce_token: u64,
    #[arg(long, default_value = "NIFTY-CE")]
    ce_symbol: String,
    #[arg(long)]
    ce_entry: f64,

    /// PE leg: token, symbol and entry price
    #[arg(long, default_value = "1002")]
    pe_token: u64,
    #[arg(long, default_value = "NIFTY-PE")]
    pe_symbol: String,
    #[arg(long)]
    pe_entry: f64,

    /// Contracts per leg
    #[arg(long, default_value = "50")]
    quantity: u32,

    /// long or short
    #[arg(long, default_value = "short")]
    direction: String,

    /// Target in cumulative points
    #[arg(long, default_value = "15")]
    target: f64,

    /// Stop-loss in cumulative points
    #[arg(long, default_value = "10")]
    stop: f64,

    /// Serve Prometheus metrics on this address (e.g. 127.0.0.1:9090)
    #[arg(long)]
    metrics_addr: Option<String>,

    /// Append completed executions to this JSONL journal
    #[arg(long)]
    journal: Option<String>,

    /// Log level
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

fn load_ticks(path: &str) -> Result<Vec<Tick>> {
    let raw = std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path))?;
    let mut ticks = Vec::new();
    for (number, line) in raw.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with("instrument_token") {
            continue;
        }
        let (token, ltp) = line
            .split_once(',')
            .with_context(|| format!("line {}: expected token,ltp", number + 1))?;
        ticks.push(Tick::new(
            token.trim().parse().with_context(|| format!("line {}: bad token", number + 1))?,
            ltp.trim().parse().with_context(|| format!("line {}: bad ltp", number + 1))?,
        ));
    }
    Ok(ticks)
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level)?;
    install_panic_handler();

    let direction = match args.direction.to_ascii_lowercase().as_str() {
        "long" => Direction::Long,
        "short" => Direction::Short,
        other => anyhow::bail!("unknown direction '{}'", other),
    };

    let ticks = load_ticks(&args.ticks)?;
    tracing::info!(count = ticks.len(), "tick file loaded");

    let metrics = Arc::new(MetricsRegistry::new()?);
    if let Some(addr) = &args.metrics_addr {
        let config = MetricsServerConfig {
            listen_addr: addr.parse().context("invalid metrics address")?,
            ..MetricsServerConfig::default()
        };
        spawn_metrics_server(config, Arc::clone(&metrics));
    }

    let gateway = Arc::new(SimulatedGateway::new());
    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let shutdown = Arc::clone(&shutdown);
        ctrlc::set_handler(move || {
            tracing::warn!("interrupt received, stopping replay");
            shutdown.store(true, Ordering::SeqCst);
        })
        .context("failed to install signal handler")?;
    }

    // Exit callback mirrors the live path: square off both legs at
    // market through the gateway
    let exit_gateway = Arc::clone(&gateway);
    let square_off_side = match direction {
        Direction::Short => TransactionType::Buy,
        Direction::Long => TransactionType::Sell,
    };
    let ce_symbol = args.ce_symbol.clone();
    let pe_symbol = args.pe_symbol.clone();
    let quantity = args.quantity;
    let exit_metrics = Arc::clone(&metrics);
    let callbacks = MonitorCallbacks::default().exit_all(move |execution_id, reason, pnl| {
        tracing::info!(%execution_id, %reason, pnl, "exit dispatched; squaring off");
        exit_metrics
            .engine()
            .exits_total
            .with_label_values(&[reason.tag()])
            .inc();
        for symbol in [&ce_symbol, &pe_symbol] {
            let request =
                OrderRequest::market(symbol.clone(), Exchange::Nfo, square_off_side, quantity);
            match exit_gateway.place_order(&request) {
                Ok(response) if response.is_success() => {
                    tracing::info!(symbol, order_id = ?response.order_id, "square-off placed")
                }
                Ok(response) => tracing::error!(symbol, message = response.message, "square-off rejected"),
                Err(e) => tracing::error!(symbol, error = %e, "square-off failed"),
            }
        }
    });

    let mut config = MonitorConfig::new(ExecutionId::generate(), "paper-user", direction);
    config.sl_mode = SlMode::Points;
    config.target_points = args.target;
    config.stop_loss_points = args.stop;

    let entry_time = market::now_in_market_zone();
    let monitor = Arc::new(PositionMonitor::new(config, callbacks)?);
    monitor.add_leg(
        "PAPER-CE",
        args.ce_symbol.clone(),
        args.ce_token,
        args.ce_entry,
        args.quantity,
        OptionType::CE,
        LegSide::Primary,
    );
    monitor.add_leg(
        "PAPER-PE",
        args.pe_symbol.clone(),
        args.pe_token,
        args.pe_entry,
        args.quantity,
        OptionType::PE,
        LegSide::Primary,
    );

    let dispatcher = TickDispatcher::new("paper-user", Arc::new(NullTransport));
    dispatcher.set_live_subscriptions(false);
    dispatcher.start_monitoring(Arc::clone(&monitor));
    metrics.engine().active_monitors.set(1);

    for tick in &ticks {
        if shutdown.load(Ordering::SeqCst) || !monitor.is_active() {
            break;
        }
        metrics.engine().ticks_total.inc();
        gateway.set_ltp(
            if tick.instrument_token == args.ce_token {
                args.ce_symbol.clone()
            } else {
                args.pe_symbol.clone()
            },
            tick.last_price,
        );
        dispatcher.on_tick_batch(std::slice::from_ref(tick));
    }

    if let Some(path) = &args.journal {
        if let Some(reason) = monitor.exit_reason() {
            let journal = ExecutionJournal::new(path.into())?;
            let legs = monitor
                .legs()
                .iter()
                .map(|leg| LegFill {
                    symbol: leg.symbol().to_string(),
                    quantity: leg.quantity(),
                    entry_price: leg.entry_price(),
                    exit_price: leg.current_price(),
                })
                .collect();
            journal.record(JournalEvent::ExecutionCompleted(CompletedExecution {
                execution_id: monitor.execution_id(),
                user_id: "paper-user".into(),
                strategy_type: "paper_replay".into(),
                direction,
                sl_mode: SlMode::Points,
                legs,
                entry_timestamp: entry_time,
                exit_timestamp: market::now_in_market_zone(),
                exit_reason: reason.to_string(),
                realized_pnl: monitor.cumulative_pnl(),
            }));
        }
    }

    tracing::info!("=== Replay finished ===");
    tracing::info!("Ticks seen:      {}", dispatcher.stats().ticks_seen);
    tracing::info!("Final P&L (pts): {:.2}", monitor.cumulative_pnl());
    tracing::info!("Orders placed:   {}", gateway.orders_placed());
    match monitor.exit_reason() {
        Some(reason) => tracing::info!("Exit reason:     {}", reason),
        None => tracing::info!("Exit reason:     none (position still open)"),
    }

    dispatcher.stop_monitoring(monitor.execution_id());
    metrics.engine().active_monitors.set(0);
    Ok(())
}
