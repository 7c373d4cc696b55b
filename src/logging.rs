//! Logging setup
//!
//! Structured logging via tracing-subscriber with an env-filter. The
//! binary calls this once at startup; library users bring their own
//! subscriber.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Registry};

/// Initialize the global subscriber.
///
/// `level` overrides the default filter; `RUST_LOG` still wins when
/// set. With `json`, events are emitted as structured JSON lines.
pub fn init(level: Option<&str>, json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.unwrap_or("info")));

    if json {
        Registry::default()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        Registry::default()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}
