//! Background thread hosting the metrics server
//!
//! The engine itself is thread-based; the hyper server gets its own
//! single-threaded tokio runtime so binaries can opt in with one call.

use super::{MetricsRegistry, MetricsServer, MetricsServerConfig};
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::error;

/// Spawn the metrics server on a dedicated thread. The thread runs for
/// the life of the process; the handle is returned for completeness.
pub fn spawn_metrics_server(
    config: MetricsServerConfig,
    registry: Arc<MetricsRegistry>,
) -> JoinHandle<()> {
    std::thread::Builder::new()
        .name("metrics-server".into())
        .spawn(move || {
            let runtime = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(runtime) => runtime,
                Err(e) => {
                    error!("failed to build metrics runtime: {}", e);
                    return;
                }
            };

            let server = MetricsServer::new(config, registry);
            if let Err(e) = runtime.block_on(server.serve()) {
                error!("metrics server exited: {}", e);
            }
        })
        .expect("failed to spawn metrics-server thread")
}
