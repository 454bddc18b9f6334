use crate::config::{DEFAULT_LOG_FILTER, LOG_FILTER_ENV};

/// Install the JSON tracing subscriber on stderr, leaving stdout for the
/// operator-facing progress and summary. `log` records from dependencies are
/// bridged into tracing.
pub fn init_logging() {
    let _ = tracing_log::LogTracer::init();
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var(LOG_FILTER_ENV).unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()),
        )
        .json()
        .with_target(true)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .with_writer(std::io::stderr)
        .try_init();
}
