//! Structured logging setup via `tracing` + `tracing-subscriber`, with a
//! console formatter for local development and a JSON formatter for
//! production log shipping.

use tracing_subscriber::{fmt, EnvFilter};

/// Initialize the global tracing subscriber.
///
/// Reads `RUST_LOG` (falling back to `info`) for the filter, and emits
/// newline-delimited JSON when `json` is `true`.
pub fn init_tracing(json: bool) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if json {
        fmt()
            .with_env_filter(env_filter)
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .init();
    } else {
        fmt().with_env_filter(env_filter).init();
    }

    tracing::info!("tracing initialized");
}
