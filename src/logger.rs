use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Filter for long-running commands. `nasa` is the binary's own target.
pub const DEFAULT_DIRECTIVE: &str = "nasa_apod=info,nasa=info";

/// Filter for one-shot commands, whose real output goes to stdout.
pub const QUIET_DIRECTIVE: &str = "nasa_apod=warn,nasa=warn";

/// Installs the global subscriber. `RUST_LOG` takes precedence over `default_directive`.
pub fn init_logger(default_directive: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_file(true)
        .with_line_number(true)
        .init();
}

pub fn log_request(path: &str, status: u16, duration: Duration) {
    info!(
        path = %path,
        status = status,
        duration_ms = %duration.as_millis(),
        "Request completed"
    );
}
