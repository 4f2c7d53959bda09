//! Observability: Prometheus metrics and the scrape endpoint

pub mod metrics;
pub mod runtime;
pub mod server;

pub use metrics::MetricsRegistry;
pub use runtime::spawn_metrics_server;
pub use server::{MetricsServer, MetricsServerConfig};
