//! Logging initialization.

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Default directives when `RUST_LOG` is unset.
const DEFAULT_FILTER: &str = "info,vkframe=debug,vkframe_renderer=debug,vkframe_rhi=info";

/// Initialize the logging system with tracing.
///
/// Filtering follows `RUST_LOG` when it is set and falls back to
/// [`DEFAULT_FILTER`] otherwise. Validation-layer messages are routed through
/// the same subscriber, so `RUST_LOG=vkframe_rhi=debug` surfaces them all.
///
/// # Example
/// ```
/// vkframe_core::init_logging();
/// tracing::info!("Viewer starting");
/// ```
pub fn init_logging() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    // A second call (e.g. from several doctests) keeps the first subscriber.
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .try_init();
}
