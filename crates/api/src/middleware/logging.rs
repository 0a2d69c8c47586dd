//! Logging initialization.
//!
//! Spans (one per HTTP request, plus job ticks) are emitted on close so
//! every span record carries its duration.

use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

use crate::config::LoggingConfig;

/// `RUST_LOG` wins outright. Otherwise the configured level applies, with
/// sqlx statement logging capped at warn: every endpoint opens its own
/// transaction, so uncapped query logs drown out the request spans.
fn build_filter(config: &LoggingConfig) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{},sqlx::query=warn", config.level)))
}

/// Initializes the logging subsystem based on configuration.
///
/// The `json` format produces flattened single-line records for log
/// shipping; anything else falls back to human-readable `pretty`.
pub fn init_logging(config: &LoggingConfig) {
    let registry = tracing_subscriber::registry().with(build_filter(config));

    if config.format == "json" {
        let json_layer = fmt::layer()
            .json()
            .flatten_event(true)
            .with_span_events(FmtSpan::CLOSE)
            .with_current_span(true)
            .with_span_list(false)
            .with_target(true);
        registry.with(json_layer).init();
    } else {
        let pretty_layer = fmt::layer()
            .pretty()
            .with_span_events(FmtSpan::CLOSE)
            .with_target(true);
        registry.with(pretty_layer).init();
    }
}
