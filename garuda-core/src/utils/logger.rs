//! Tracing initialization
//!
//! One global subscriber for the whole process, shared by the binaries.
//! `RUST_LOG` wins when set; otherwise the given level applies with the
//! metrics server's hyper internals turned down so tick-path logs stay
//! readable.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Install the global tracing subscriber.
///
/// `json_logs` switches to line-JSON for log shippers. The human format
/// shows thread names so the engine's worker threads (metrics-server,
/// journal writer, restart timers, basket legs) are tellable apart.
pub fn init_logger(log_level: &str, json_logs: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{},hyper=warn,h2=warn", log_level)));

    let registry = tracing_subscriber::registry().with(filter);
    if json_logs {
        registry
            .with(fmt::layer().json().with_current_span(false))
            .init();
    } else {
        registry
            .with(fmt::layer().with_target(false).with_thread_names(true))
            .init();
    }
}
