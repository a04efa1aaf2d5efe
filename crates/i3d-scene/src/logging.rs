//! Logging and tracing utilities for the exporter
//!
//! Structured logging goes through the `tracing` crate. Libraries only emit
//! events; the binary (or a test) installs the subscriber once.

use std::sync::atomic::{AtomicBool, Ordering};

/// Whether tracing has been initialized
static TRACING_INITIALIZED: AtomicBool = AtomicBool::new(false);

/// Default filter when `RUST_LOG` is not set
pub const DEFAULT_FILTER: &str = "warn,i3d=info";

/// Initialize the default tracing subscriber
///
/// This should be called once at application startup. Multiple calls are safe
/// and will be ignored.
pub fn init_default() {
    init_with_config(TracingConfig::default());
}

/// Initialize tracing with a custom configuration
pub fn init_with_config(config: TracingConfig) {
    if TRACING_INITIALIZED
        .compare_exchange(false, true, Ordering::SeqCst, Ordering::Relaxed)
        .is_ok()
    {
        use tracing_subscriber::{fmt, prelude::*, EnvFilter};

        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(&config.default_level));

        let fmt_layer = fmt::layer()
            .with_target(config.show_target)
            .with_file(config.show_file)
            .with_line_number(config.show_line_number)
            .with_writer(std::io::stderr);

        tracing_subscriber::registry()
            .with(fmt_layer)
            .with(filter)
            .init();
    }
}

/// Filter directive for a CLI verbosity count (`-v`, `-vv`, ...)
pub fn filter_for_verbosity(verbosity: u8) -> String {
    match verbosity {
        0 => DEFAULT_FILTER.to_string(),
        1 => "info,i3d=debug".to_string(),
        2 => "debug".to_string(),
        _ => "trace".to_string(),
    }
}

/// Configuration for tracing initialization
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// Default log level filter (e.g., "info", "debug", "warn")
    pub default_level: String,
    /// Show the target (module path) in log output
    pub show_target: bool,
    /// Show source file in log output
    pub show_file: bool,
    /// Show line number in log output
    pub show_line_number: bool,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            default_level: DEFAULT_FILTER.to_string(),
            show_target: true,
            show_file: false,
            show_line_number: false,
        }
    }
}

impl TracingConfig {
    /// Configuration for a CLI verbosity count
    pub fn for_verbosity(verbosity: u8) -> Self {
        Self {
            default_level: filter_for_verbosity(verbosity),
            show_file: verbosity >= 2,
            show_line_number: verbosity >= 2,
            ..Default::default()
        }
    }
}

/// Macros for common logging patterns
#[macro_export]
macro_rules! log_export_start {
    ($scene:expr, $path:expr) => {
        tracing::info!(
            scene = %$scene,
            path = %$path.display(),
            "Starting export"
        );
    };
}

#[macro_export]
macro_rules! log_export_complete {
    ($scene:expr, $duration:expr, $nodes:expr) => {
        tracing::info!(
            scene = %$scene,
            duration_ms = %$duration.as_millis(),
            nodes = %$nodes,
            "Export complete"
        );
    };
}

#[macro_export]
macro_rules! log_export_error {
    ($scene:expr, $error:expr) => {
        tracing::error!(
            scene = %$scene,
            error = %$error,
            "Export failed"
        );
    };
}

/// Run one export phase inside an `info` span and log its duration
pub fn instrument_phase<T, F>(name: &str, f: F) -> T
where
    F: FnOnce() -> T,
{
    let span = tracing::info_span!("phase", phase = %name);
    let _guard = span.enter();

    let start = std::time::Instant::now();
    let result = f();
    let duration = start.elapsed();

    tracing::debug!(duration_ms = %duration.as_millis(), "Phase complete");

    result
}
