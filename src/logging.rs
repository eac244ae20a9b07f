//! Logging and tracing initialization.
//!
//! Structured logging through the `tracing` ecosystem, either as human-readable
//! console output or as JSON for log collectors.

use tracing::{Level, Subscriber};
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    registry::LookupSpan,
    util::SubscriberInitExt,
};

/// Configuration for the logging system.
#[derive(Debug, Default)]
pub struct LogConfig {
    /// Output logs as JSON (for machine parsing)
    pub json: bool,
    /// Force DEBUG regardless of `LOG_LEVEL`
    pub verbose: bool,
    /// Level name taken from `LOG_LEVEL`, e.g. `DEBUG` or `warn`
    pub level: Option<String>,
}

impl LogConfig {
    /// Level used when `RUST_LOG` is not set.
    pub fn default_level(&self) -> Level {
        if self.verbose {
            return Level::DEBUG;
        }
        self.level
            .as_deref()
            .and_then(parse_level)
            .unwrap_or(Level::INFO)
    }

    /// Filter directive for this crate's events when `RUST_LOG` is unset.
    pub fn directive(&self) -> String {
        let level = self.default_level().as_str().to_ascii_lowercase();
        format!("{}={level}", env!("CARGO_CRATE_NAME"))
    }

    fn filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(self.directive()))
    }
}

/// Accepts the usual level names in any case, plus `WARNING` and `CRITICAL`.
fn parse_level(name: &str) -> Option<Level> {
    match name.trim().to_ascii_lowercase().as_str() {
        "trace" => Some(Level::TRACE),
        "debug" => Some(Level::DEBUG),
        "info" => Some(Level::INFO),
        "warn" | "warning" => Some(Level::WARN),
        "error" | "critical" => Some(Level::ERROR),
        _ => None,
    }
}

/// Install the global subscriber. Call once, early in main(); `RUST_LOG` overrides
/// the level chosen by `config`.
pub fn init(config: LogConfig) {
    tracing_subscriber::registry()
        .with(config.filter())
        .with(output_layer(config.json))
        .init();
}

/// JSON lines with span context, or compact console text.
fn output_layer<S>(json: bool) -> Box<dyn Layer<S> + Send + Sync>
where
    S: Subscriber + for<'span> LookupSpan<'span> + 'static,
{
    if json {
        return fmt::layer()
            .json()
            .with_span_events(FmtSpan::CLOSE)
            .with_current_span(true)
            .with_target(true)
            .boxed();
    }
    fmt::layer()
        .with_target(false)
        .with_file(false)
        .with_line_number(false)
        .boxed()
}
