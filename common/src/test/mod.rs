//! Test helpers shared by every crate in the workspace.
pub mod traced_test;

use std::sync::Once;
use tracing_subscriber::{
    filter::LevelFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer,
};

static INIT: Once = Once::new();

/// Install a test-friendly global subscriber once per process.
/// Respects `RUST_LOG`, defaulting to `info`.
pub fn logger() {
    INIT.call_once(|| {
        let filter = EnvFilter::builder()
            .with_default_directive(LevelFilter::INFO.into())
            .from_env_lossy();

        let _ = tracing_subscriber::registry()
            .with(fmt::layer().with_test_writer().with_filter(filter))
            .try_init();
    })
}
