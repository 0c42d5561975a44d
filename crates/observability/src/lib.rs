//! Tracing and logging setup shared by binaries.

/// Initialize process-wide tracing.
///
/// This is safe to call multiple times; subsequent calls become no-ops.
pub fn init(debug: bool) {
    tracing::init(debug);
}

/// Tracing configuration (filters, layers).
pub mod tracing;
