//! Process-wide tracing setup.

/// Initialize process-wide observability (JSON logs filtered by `RUST_LOG`).
///
/// This is safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    tracing::init(LogFormat::Json);
}

/// Tracing configuration (filters, formats).
pub mod tracing;

pub use tracing::{init_for_tests, LogFormat};
