//! Per-user tick fan-out
//!
//! One dispatcher per user session routes broker tick batches to the
//! monitors subscribed to each instrument token. The reverse index
//! (token -> execution ids) is consulted on every batch; registration
//! and teardown keep broker subscriptions refcounted so a token is only
//! unsubscribed when its last monitor leaves.
//!
//! Live subscription can be disabled globally or per dispatcher; the
//! backtest harness uses that to feed synthetic ticks through the exact
//! same path with zero network activity.

use crate::core::types::{ExecutionId, Tick};
use crate::monitor::position::PositionMonitor;
use crate::resilience::backoff::{BackoffConfig, ExponentialBackoff};
use anyhow::{Context, Result};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Process-wide live-subscription gate. The backtest flips this off so
/// no dispatcher anywhere touches the transport while it replays.
static LIVE_SUBSCRIPTIONS: AtomicBool = AtomicBool::new(true);

pub fn set_live_subscriptions_enabled(enabled: bool) {
    LIVE_SUBSCRIPTIONS.store(enabled, Ordering::Release);
}

pub fn live_subscriptions_enabled() -> bool {
    LIVE_SUBSCRIPTIONS.load(Ordering::Acquire)
}

/// Broker market-data transport, LTP subscription mode.
///
/// Implementations wrap the actual WebSocket session; the engine only
/// ever calls these four operations.
pub trait TickerTransport: Send + Sync {
    fn connect(&self) -> Result<()>;
    fn disconnect(&self) -> Result<()>;
    fn subscribe_ltp(&self, tokens: &[u64]) -> Result<()>;
    fn unsubscribe(&self, tokens: &[u64]) -> Result<()>;
}

/// No-op transport for backtests, paper trading and tests.
#[derive(Debug, Default)]
pub struct NullTransport;

impl TickerTransport for NullTransport {
    fn connect(&self) -> Result<()> {
        Ok(())
    }
    fn disconnect(&self) -> Result<()> {
        Ok(())
    }
    fn subscribe_ltp(&self, _tokens: &[u64]) -> Result<()> {
        Ok(())
    }
    fn unsubscribe(&self, _tokens: &[u64]) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connected,
    Reconnecting,
    /// Gave up after exhausting reconnect attempts
    Failed,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DispatcherStats {
    pub batches_dispatched: u64,
    pub ticks_seen: u64,
    pub reconnect_attempts: u64,
    pub successful_reconnects: u64,
}

pub struct TickDispatcher {
    user_id: String,
    transport: Arc<dyn TickerTransport>,
    monitors: DashMap<ExecutionId, Arc<PositionMonitor>>,
    token_subs: DashMap<u64, HashSet<ExecutionId>>,
    state: Mutex<ConnectionState>,
    backoff_config: BackoffConfig,
    live_enabled: AtomicBool,
    batches_dispatched: AtomicU64,
    ticks_seen: AtomicU64,
    reconnect_attempts: AtomicU64,
    successful_reconnects: AtomicU64,
}

impl TickDispatcher {
    pub fn new(user_id: impl Into<String>, transport: Arc<dyn TickerTransport>) -> Self {
        Self::with_backoff(user_id, transport, BackoffConfig::broker_reconnect())
    }

    /// Override the reconnect schedule (tests use fast delays)
    pub fn with_backoff(
        user_id: impl Into<String>,
        transport: Arc<dyn TickerTransport>,
        backoff_config: BackoffConfig,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            transport,
            monitors: DashMap::new(),
            token_subs: DashMap::new(),
            state: Mutex::new(ConnectionState::Disconnected),
            backoff_config,
            live_enabled: AtomicBool::new(true),
            batches_dispatched: AtomicU64::new(0),
            ticks_seen: AtomicU64::new(0),
            reconnect_attempts: AtomicU64::new(0),
            successful_reconnects: AtomicU64::new(0),
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.lock()
    }

    pub fn stats(&self) -> DispatcherStats {
        DispatcherStats {
            batches_dispatched: self.batches_dispatched.load(Ordering::Relaxed),
            ticks_seen: self.ticks_seen.load(Ordering::Relaxed),
            reconnect_attempts: self.reconnect_attempts.load(Ordering::Relaxed),
            successful_reconnects: self.successful_reconnects.load(Ordering::Relaxed),
        }
    }

    /// Per-user override of the global live-subscription gate
    pub fn set_live_subscriptions(&self, enabled: bool) {
        self.live_enabled.store(enabled, Ordering::Release);
    }

    fn live_active(&self) -> bool {
        self.live_enabled.load(Ordering::Acquire) && live_subscriptions_enabled()
    }

    pub fn monitor_count(&self) -> usize {
        self.monitors.len()
    }

    pub fn subscribed_tokens(&self) -> Vec<u64> {
        self.token_subs.iter().map(|entry| *entry.key()).collect()
    }

    /// Register a monitor and subscribe to any tokens that gained their
    /// first subscriber.
    pub fn start_monitoring(&self, monitor: Arc<PositionMonitor>) {
        let execution_id = monitor.execution_id();
        let tokens = monitor.instrument_tokens();
        self.monitors.insert(execution_id, monitor);

        let mut newly_first = Vec::new();
        for token in tokens {
            let mut entry = self.token_subs.entry(token).or_default();
            if entry.is_empty() {
                newly_first.push(token);
            }
            entry.insert(execution_id);
        }

        info!(
            user = self.user_id,
            %execution_id,
            new_tokens = newly_first.len(),
            "monitoring started"
        );
        self.subscribe_tokens(&newly_first);
    }

    /// Deregister a monitor; unsubscribe only tokens left with no
    /// remaining subscribers.
    pub fn stop_monitoring(&self, execution_id: ExecutionId) {
        self.monitors.remove(&execution_id);

        let tokens: Vec<u64> = self
            .token_subs
            .iter()
            .filter(|entry| entry.value().contains(&execution_id))
            .map(|entry| *entry.key())
            .collect();

        let mut orphaned = Vec::new();
        for token in tokens {
            if let Some(mut entry) = self.token_subs.get_mut(&token) {
                entry.remove(&execution_id);
                if entry.is_empty() {
                    orphaned.push(token);
                }
            }
        }
        for token in &orphaned {
            self.token_subs.remove(token);
        }

        info!(
            user = self.user_id,
            %execution_id,
            released_tokens = orphaned.len(),
            "monitoring stopped"
        );
        self.unsubscribe_tokens(&orphaned);
    }

    /// Route one more token to an already-registered monitor (leg
    /// replacement adds an instrument mid-flight).
    pub fn add_instrument_to_monitoring(&self, execution_id: ExecutionId, token: u64) {
        if !self.monitors.contains_key(&execution_id) {
            warn!(%execution_id, token, "add_instrument for unknown execution ignored");
            return;
        }
        let mut entry = self.token_subs.entry(token).or_default();
        let newly_first = entry.is_empty();
        entry.insert(execution_id);
        drop(entry);

        if newly_first {
            self.subscribe_tokens(&[token]);
        }
    }

    /// Hot path: deliver the whole batch to each subscribed monitor at
    /// most once.
    pub fn on_tick_batch(&self, ticks: &[Tick]) {
        self.ticks_seen.fetch_add(ticks.len() as u64, Ordering::Relaxed);

        let mut seen: Vec<ExecutionId> = Vec::new();
        let mut targets: Vec<Arc<PositionMonitor>> = Vec::new();

        for tick in ticks {
            if let Some(subs) = self.token_subs.get(&tick.instrument_token) {
                for execution_id in subs.iter() {
                    if seen.contains(execution_id) {
                        continue;
                    }
                    seen.push(*execution_id);
                    if let Some(monitor) = self.monitors.get(execution_id) {
                        targets.push(Arc::clone(monitor.value()));
                    }
                }
            }
        }

        for monitor in targets {
            monitor.update_prices(ticks);
            self.batches_dispatched.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Idempotent connect.
    pub fn connect(&self) -> Result<()> {
        let mut state = self.state.lock();
        if *state == ConnectionState::Connected {
            return Ok(());
        }
        self.transport
            .connect()
            .with_context(|| format!("connect failed for user {}", self.user_id))?;
        *state = ConnectionState::Connected;
        drop(state);

        self.resubscribe_all();
        info!(user = self.user_id, "ticker connected");
        Ok(())
    }

    /// Idempotent disconnect.
    pub fn disconnect(&self) -> Result<()> {
        let mut state = self.state.lock();
        if *state == ConnectionState::Disconnected {
            return Ok(());
        }
        self.transport.disconnect().ok();
        *state = ConnectionState::Disconnected;
        info!(user = self.user_id, "ticker disconnected");
        Ok(())
    }

    /// Reconnect with exponential backoff (5s * 2^(attempt-1), 10
    /// attempts). On success all currently-tracked tokens are
    /// resubscribed; on exhaustion the dispatcher parks in Failed.
    pub fn reconnect(&self) -> Result<()> {
        {
            let mut state = self.state.lock();
            if *state == ConnectionState::Connected {
                return Ok(());
            }
            *state = ConnectionState::Reconnecting;
        }

        let mut backoff = ExponentialBackoff::with_config(self.backoff_config.clone());
        loop {
            self.reconnect_attempts.fetch_add(1, Ordering::Relaxed);
            match self.transport.connect() {
                Ok(()) => {
                    *self.state.lock() = ConnectionState::Connected;
                    self.successful_reconnects.fetch_add(1, Ordering::Relaxed);
                    self.resubscribe_all();
                    info!(
                        user = self.user_id,
                        attempt = backoff.attempt_number() + 1,
                        "ticker reconnected"
                    );
                    return Ok(());
                }
                Err(e) => match backoff.next_delay() {
                    Some(delay) => {
                        warn!(
                            user = self.user_id,
                            attempt = backoff.attempt_number(),
                            delay_secs = delay.as_secs_f64(),
                            error = %e,
                            "reconnect attempt failed"
                        );
                        std::thread::sleep(delay);
                    }
                    None => {
                        *self.state.lock() = ConnectionState::Failed;
                        error!(user = self.user_id, "reconnect attempts exhausted");
                        return Err(e).context("reconnect attempts exhausted");
                    }
                },
            }
        }
    }

    fn resubscribe_all(&self) {
        let tokens = self.subscribed_tokens();
        self.subscribe_tokens(&tokens);
    }

    fn subscribe_tokens(&self, tokens: &[u64]) {
        if tokens.is_empty() {
            return;
        }
        if !self.live_active() {
            debug!(user = self.user_id, count = tokens.len(), "live subscriptions disabled; skipping subscribe");
            return;
        }
        if let Err(e) = self.transport.subscribe_ltp(tokens) {
            error!(user = self.user_id, error = %e, "subscribe failed");
        }
    }

    fn unsubscribe_tokens(&self, tokens: &[u64]) {
        if tokens.is_empty() || !self.live_active() {
            return;
        }
        if let Err(e) = self.transport.unsubscribe(tokens) {
            error!(user = self.user_id, error = %e, "unsubscribe failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{Direction, LegSide, OptionType};
    use crate::monitor::position::{MonitorCallbacks, MonitorConfig};
    use anyhow::anyhow;
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct RecordingTransport {
        calls: Mutex<Vec<String>>,
        fail_connects: AtomicUsize,
    }

    impl RecordingTransport {
        fn calls(&self) -> Vec<String> {
            self.calls.lock().clone()
        }
    }

    impl TickerTransport for RecordingTransport {
        fn connect(&self) -> Result<()> {
            let remaining = self.fail_connects.load(Ordering::SeqCst);
            if remaining > 0 {
                self.fail_connects.store(remaining - 1, Ordering::SeqCst);
                return Err(anyhow!("connect refused"));
            }
            self.calls.lock().push("connect".into());
            Ok(())
        }
        fn disconnect(&self) -> Result<()> {
            self.calls.lock().push("disconnect".into());
            Ok(())
        }
        fn subscribe_ltp(&self, tokens: &[u64]) -> Result<()> {
            let mut sorted = tokens.to_vec();
            sorted.sort_unstable();
            self.calls.lock().push(format!("subscribe:{:?}", sorted));
            Ok(())
        }
        fn unsubscribe(&self, tokens: &[u64]) -> Result<()> {
            let mut sorted = tokens.to_vec();
            sorted.sort_unstable();
            self.calls.lock().push(format!("unsubscribe:{:?}", sorted));
            Ok(())
        }
    }

    fn monitor_with_legs(tokens: &[u64]) -> Arc<PositionMonitor> {
        let mut cfg = MonitorConfig::new(ExecutionId::generate(), "user-1", Direction::Long);
        cfg.target_points = 1_000.0;
        cfg.stop_loss_points = 1_000.0;
        let monitor = Arc::new(PositionMonitor::new(cfg, MonitorCallbacks::default()).unwrap());
        for (i, token) in tokens.iter().enumerate() {
            let otype = if i % 2 == 0 { OptionType::CE } else { OptionType::PE };
            monitor.add_leg(
                format!("O{}", i),
                format!("SYM{}", token),
                *token,
                100.0,
                50,
                otype,
                LegSide::Primary,
            );
        }
        monitor
    }

    #[test]
    fn test_subscribe_only_newly_first_tokens() {
        let transport = Arc::new(RecordingTransport::default());
        let dispatcher = TickDispatcher::new("user-1", transport.clone());

        let m1 = monitor_with_legs(&[1, 2]);
        let m2 = monitor_with_legs(&[2, 3]);
        dispatcher.start_monitoring(m1);
        dispatcher.start_monitoring(m2);

        let calls = transport.calls();
        assert!(calls.contains(&"subscribe:[1, 2]".to_string()));
        // Token 2 already subscribed; only 3 is new for m2
        assert!(calls.contains(&"subscribe:[3]".to_string()));
    }

    #[test]
    fn test_stop_monitoring_releases_orphans_only() {
        let transport = Arc::new(RecordingTransport::default());
        let dispatcher = TickDispatcher::new("user-1", transport.clone());

        let m1 = monitor_with_legs(&[1, 2]);
        let m2 = monitor_with_legs(&[2, 3]);
        let id1 = m1.execution_id();
        dispatcher.start_monitoring(m1);
        dispatcher.start_monitoring(m2);

        dispatcher.stop_monitoring(id1);

        // Token 2 still has m2; only token 1 is released
        assert!(transport.calls().contains(&"unsubscribe:[1]".to_string()));
        let mut remaining = dispatcher.subscribed_tokens();
        remaining.sort_unstable();
        assert_eq!(remaining, vec![2, 3]);
    }

    #[test]
    fn test_batch_delivered_once_per_monitor() {
        let transport = Arc::new(RecordingTransport::default());
        let dispatcher = TickDispatcher::new("user-1", transport);

        // Both ticks belong to the same monitor: one delivery
        let m1 = monitor_with_legs(&[1, 2]);
        dispatcher.start_monitoring(Arc::clone(&m1));

        dispatcher.on_tick_batch(&[Tick::new(1, 101.0), Tick::new(2, 102.0)]);
        assert_eq!(dispatcher.stats().batches_dispatched, 1);
        assert_eq!(m1.legs()[0].current_price(), 101.0);
        assert_eq!(m1.legs()[1].current_price(), 102.0);
    }

    #[test]
    fn test_unknown_token_batch_goes_nowhere() {
        let transport = Arc::new(RecordingTransport::default());
        let dispatcher = TickDispatcher::new("user-1", transport);
        dispatcher.start_monitoring(monitor_with_legs(&[1]));

        dispatcher.on_tick_batch(&[Tick::new(42, 9.0)]);
        assert_eq!(dispatcher.stats().batches_dispatched, 0);
    }

    #[test]
    fn test_live_subscription_gate() {
        let transport = Arc::new(RecordingTransport::default());
        let dispatcher = TickDispatcher::new("user-1", transport.clone());
        dispatcher.set_live_subscriptions(false);

        dispatcher.start_monitoring(monitor_with_legs(&[1, 2]));
        assert!(transport.calls().is_empty(), "no network while disabled");

        // Ticks still flow to the monitor
        dispatcher.on_tick_batch(&[Tick::new(1, 105.0)]);
        assert_eq!(dispatcher.stats().batches_dispatched, 1);
    }

    #[test]
    fn test_reconnect_retries_then_succeeds() {
        let transport = Arc::new(RecordingTransport::default());
        transport.fail_connects.store(3, Ordering::SeqCst);

        let dispatcher =
            TickDispatcher::with_backoff("user-1", transport.clone(), BackoffConfig::aggressive());
        dispatcher.start_monitoring(monitor_with_legs(&[1]));

        dispatcher.reconnect().unwrap();
        assert_eq!(dispatcher.state(), ConnectionState::Connected);
        assert_eq!(dispatcher.stats().reconnect_attempts, 4);

        // Resubscription happened after the successful connect
        let calls = transport.calls();
        let connect_pos = calls.iter().position(|c| c == "connect").unwrap();
        assert!(calls[connect_pos..].iter().any(|c| c.starts_with("subscribe")));
    }

    #[test]
    fn test_reconnect_gives_up_after_max_attempts() {
        let transport = Arc::new(RecordingTransport::default());
        transport.fail_connects.store(usize::MAX, Ordering::SeqCst);

        let dispatcher =
            TickDispatcher::with_backoff("user-1", transport, BackoffConfig::aggressive());
        assert!(dispatcher.reconnect().is_err());
        assert_eq!(dispatcher.state(), ConnectionState::Failed);
        // aggressive config allows 5 retries + the initial try
        assert_eq!(dispatcher.stats().reconnect_attempts, 6);
    }

    #[test]
    fn test_connect_is_idempotent() {
        let transport = Arc::new(RecordingTransport::default());
        let dispatcher = TickDispatcher::new("user-1", transport.clone());

        dispatcher.connect().unwrap();
        dispatcher.connect().unwrap();
        let connects = transport.calls().iter().filter(|c| *c == "connect").count();
        assert_eq!(connects, 1);
    }

    #[test]
    fn test_add_instrument_mid_flight() {
        let transport = Arc::new(RecordingTransport::default());
        let dispatcher = TickDispatcher::new("user-1", transport.clone());

        let m1 = monitor_with_legs(&[1]);
        let id = m1.execution_id();
        dispatcher.start_monitoring(m1);

        dispatcher.add_instrument_to_monitoring(id, 7);
        assert!(transport.calls().contains(&"subscribe:[7]".to_string()));

        let mut tokens = dispatcher.subscribed_tokens();
        tokens.sort_unstable();
        assert_eq!(tokens, vec![1, 7]);
    }
}
