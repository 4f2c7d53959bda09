//! Global panic handler for graceful shutdown
//!
//! Installed by the binaries. This does NOT catch panics - it only
//! guarantees the location and message reach the logs before the
//! process terminates.

use std::panic;
use std::process;
use tracing::error;

/// Install a global panic handler that logs before exiting.
pub fn install_panic_handler() {
    let default_hook = panic::take_hook();

    panic::set_hook(Box::new(move |panic_info| {
        let location = panic_info
            .location()
            .map(|loc| format!("{}:{}:{}", loc.file(), loc.line(), loc.column()))
            .unwrap_or_else(|| "<unknown location>".to_string());

        let message = if let Some(s) = panic_info.payload().downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = panic_info.payload().downcast_ref::<String>() {
            s.clone()
        } else {
            "<no message>".to_string()
        };

        error!(
            location = %location,
            message = %message,
            "PANIC: engine crashed, shutting down"
        );

        // stderr backup in case tracing is misconfigured
        eprintln!("FATAL PANIC at {}: {}", location, message);

        default_hook(panic_info);

        // Give tracing time to flush
        std::thread::sleep(std::time::Duration::from_millis(100));
        process::exit(1);
    }));
}
