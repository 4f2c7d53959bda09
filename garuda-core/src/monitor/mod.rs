//! Position monitoring
//!
//! - `position`: the monitor itself (leg set, hot path, dispatch)
//! - `context`: the reusable per-tick evaluation snapshot
//! - `dispatcher`: per-user token -> monitor tick fan-out

pub mod context;
pub mod dispatcher;
pub mod position;

pub use context::ExitContext;
pub use dispatcher::{TickDispatcher, TickerTransport};
pub use position::{
    LegReplacementRequest, MonitorCallbacks, MonitorConfig, PositionMonitor, PremiumExitConfig,
    TrailingConfig,
};
