//! Logging setup.
//!
//! The storages only emit `tracing` events; installing a subscriber is left
//! to the embedding application, which may call [`init_logging`].

use tracing_subscriber::EnvFilter;

/// Install a `fmt` subscriber filtered by `RUST_LOG`.
///
/// Defaults to `rbac_store=info` when `RUST_LOG` is not set. Later calls are
/// ignored, so tests may call it freely.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("rbac_store=info"));

    // try_init so double-init in tests doesn't panic
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .try_init();
}
