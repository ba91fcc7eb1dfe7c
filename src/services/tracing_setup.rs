//! Tracing subscriber setup.
//!
//! Shared between the binary and the tests: file-based logging with
//! environment-based filtering (`RUST_LOG`), defaulting to INFO.

use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

/// Initialize the global subscriber logging to `log_file_path`. Returns
/// false if the log file could not be created or a subscriber was already
/// installed.
pub fn init_global(log_file_path: &Path) -> bool {
    let Ok(log_file) = File::create(log_file_path) else {
        return false;
    };
    build_subscriber(log_file).try_init().is_ok()
}

/// The core subscriber configuration shared between production and tests.
pub fn build_subscriber(log_file: File) -> impl tracing::Subscriber + Send + Sync {
    let env_filter = EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into());
    let fmt_layer = fmt::layer().with_ansi(false).with_writer(Arc::new(log_file));
    tracing_subscriber::registry().with(fmt_layer).with(env_filter)
}
