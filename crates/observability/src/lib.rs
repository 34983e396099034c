//! Tracing and logging setup shared by binaries and tests.

/// Tracing configuration (filters, layers).
pub mod tracing;

/// Initialize process-wide tracing: JSON lines, `RUST_LOG` filter, `info` by default.
///
/// This is safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    tracing::init();
}

/// Initialize tracing for tests: human-readable output captured by the test harness.
pub fn init_for_tests() {
    tracing::init_test();
}
