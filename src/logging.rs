//! Logging and tracing setup for Barrier Gateway.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Target of the one structured event written per finalized exchange.
pub const AUDIT_TARGET: &str = "barrier_gateway::audit";

const DEFAULT_FILTER: &str = "barrier_gateway=info,tower_http=info";

/// Install the JSON subscriber for the service.
///
/// `RUST_LOG` overrides [`DEFAULT_FILTER`]. Audit events can be routed on
/// their own, e.g. `RUST_LOG=barrier_gateway=warn,barrier_gateway::audit=info`.
pub fn init() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_target(true)
                .with_file(true)
                .with_line_number(true),
        )
        .init();
}

/// Human-readable subscriber for tests. Safe to call more than once.
#[cfg(test)]
pub fn init_test() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter("barrier_gateway=debug")
        .try_init();
}
