//! Tracing and logging (shared process setup).

pub use tracing::LogFormat;

/// Initialize process-wide observability (tracing/logging).
///
/// Output format comes from `SPROUT_LOG_FORMAT`. This is safe to call multiple
/// times; subsequent calls become no-ops.
pub fn init() {
    tracing::init(LogFormat::from_env());
}

/// Tracing configuration (filters, layers).
pub mod tracing;
