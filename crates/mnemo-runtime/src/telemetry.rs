//! Tracing initialisation.
//!
//! Call [`init_tracing`] once at process startup.  Library crates only emit
//! `tracing` events; installing a subscriber is left to the embedding
//! process.
//!
//! # Environment variables
//!
//! | Variable | Effect |
//! |---|---|
//! | `RUST_LOG` | Log filter (default `"info"`). |
//! | `MNEMO_LOG_FORMAT=json` | Emit newline-delimited JSON logs. |
//!
//! # Example
//!
//! ```rust,no_run
//! mnemo_runtime::telemetry::init_tracing();
//! ```

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Output format of the console subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Compact,
    Json,
}

impl LogFormat {
    /// `json` (any case) selects JSON, everything else compact.
    pub fn parse(s: &str) -> Self {
        if s.eq_ignore_ascii_case("json") {
            LogFormat::Json
        } else {
            LogFormat::Compact
        }
    }

    fn from_env() -> Self {
        std::env::var("MNEMO_LOG_FORMAT")
            .map(|v| Self::parse(&v))
            .unwrap_or(LogFormat::Compact)
    }
}

/// Install the global `tracing` subscriber.
///
/// Returns `false` when a global subscriber was already installed; the
/// existing one is kept, so repeated calls are harmless.
pub fn init_tracing() -> bool {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let result = match LogFormat::from_env() {
        LogFormat::Json => tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .try_init(),
        LogFormat::Compact => tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().compact())
            .try_init(),
    };
    result.is_ok()
}
