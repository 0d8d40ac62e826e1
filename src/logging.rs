//! Tracing subscriber setup for binaries built on this crate.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install a global `tracing` subscriber.
///
/// The filter comes from `RUST_LOG` (default `info`). Setting
/// `QUOTER_LOG_FORMAT=json` switches to JSON lines for log shipping.
/// Returns `false` if a global subscriber was already installed.
pub fn init_tracing() -> bool {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let json = std::env::var("QUOTER_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let result = if json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().json().with_current_span(true))
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_target(true))
            .try_init()
    };

    result.is_ok()
}
