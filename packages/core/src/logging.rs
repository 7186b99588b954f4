use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

/// Initialize structured logging for the service.
///
/// Honors `RUST_LOG`; defaults to `info` with sqlx statement logging quieted.
/// Call once at startup.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn"));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();

    info!(
        "Logging initialized for {} {}",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION")
    );
}
