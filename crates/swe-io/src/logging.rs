//! Logging initialization.
//!
//! `RUST_LOG` selects verbosity the same way `OMP_NUM_THREADS` governs
//! thread count: an environment variable read once at startup. Batch
//! runs additionally get a non-blocking file appender so a full trace
//! survives even when stdout is reserved for progress output.

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

/// Initialize stdout-only logging, for short-lived CLI invocations
/// (e.g. a one-shot config validation) that don't need a trace file.
pub fn init_stdout() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// Initialize logging for a full simulation run: stdout at the configured
/// filter level plus a non-blocking file appender under `log_dir`. The
/// returned [`WorkerGuard`] must be held for the lifetime of the run; once
/// dropped, buffered log lines are no longer flushed.
pub fn init_with_file_appender(log_dir: impl AsRef<Path>, file_prefix: &str) -> WorkerGuard {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let file_appender = tracing_appender::rolling::never(log_dir, file_prefix);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(false)
        .try_init();

    guard
}
