//! Resilience utilities: reconnect backoff and panic containment

pub mod backoff;
pub mod panic;

pub use backoff::{BackoffConfig, ExponentialBackoff};
pub use panic::install_panic_handler;
