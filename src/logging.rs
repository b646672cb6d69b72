// Logging setup

use tracing_subscriber::EnvFilter;

pub const DEFAULT_DIRECTIVE: &str = "draftstream=info";

/// Install a stderr `tracing` subscriber filtered by `RUST_LOG`, falling back
/// to `default_directive`. Later calls are no-ops.
pub fn init(default_directive: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
