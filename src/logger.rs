//! Logging support.

use std::sync::OnceLock;
use tracing_subscriber::{fmt, EnvFilter};

const DEFAULT_LOG_LEVEL: &str = "debug";

/// Initializes the global tracing subscriber.
///
/// The level is taken from `RUST_LOG` when set, falling back to
/// [`DEFAULT_LOG_LEVEL`]. Repeated calls are no-ops.
pub fn init() {
    static LOGGER: OnceLock<()> = OnceLock::new();
    LOGGER.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_LEVEL));
        fmt()
            .with_env_filter(filter)
            .with_thread_names(true)
            .with_file(true)
            .with_line_number(true)
            .init();
    });
}
