//! Tracing for tests.
//!
//! Tests that want to see the server's structured logs call
//! [`init_test_tracing`] first. Output goes through the test-harness writer,
//! so it only shows for failing tests or with `--nocapture`.

use tracing_subscriber::EnvFilter;

/// Directive used when `RUST_LOG` is unset: request-level detail from the
/// arcs crates, lifecycle events from everything else.
pub const DEFAULT_TEST_FILTER: &str = "info,arcs_core=debug";

/// Install the test subscriber with [`DEFAULT_TEST_FILTER`] or `RUST_LOG`.
///
/// Only the first call in a process installs anything.
pub fn init_test_tracing() {
    init_test_tracing_with(DEFAULT_TEST_FILTER);
}

/// Install the test subscriber with `directive` unless `RUST_LOG` is set.
///
/// ```ignore
/// arcs_test_utils::tracing_setup::init_test_tracing_with("arcs_core::manifest=trace");
/// ```
pub fn init_test_tracing_with(directive: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directive));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_test_writer()
        .try_init();
}
