//! Tracing setup for the migrator.
//!
//! Diagnostic output only: progress, skipped projects and dry-run intent go to
//! stderr and are filtered by `RUST_LOG`. What a live run changed is recorded
//! separately in the operation log (`io::oplog`), which is written regardless
//! of the log level.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the tracing subscriber.
///
/// Reads `RUST_LOG` env var. Defaults to `info` so dry-run plans are visible.
/// Output: stderr, compact format.
///
/// # Example
/// ```bash
/// RUST_LOG=billing_migrator=debug billing-migrator --migrate --target-billing-id 999-ZZZ
/// ```
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
