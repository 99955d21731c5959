//! Tracing subscriber installation and metric descriptions.

use std::sync::Once;

use metrics::{Unit, describe_counter, describe_gauge, describe_histogram};
use thiserror::Error;
use tracing::Subscriber;
use tracing_error::ErrorLayer;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::cache::{METRIC_CACHE_ENTRIES, METRIC_CACHE_EXPIRED, METRIC_CACHE_HIT, METRIC_CACHE_MISS};
use crate::config::{LogFormat, LoggingSettings};
use crate::mapping::{METRIC_ACCESSOR_BUILD, METRIC_MATERIALIZE_MS, METRIC_MATERIALIZE_ROWS};

/// Directives in this variable override the configured level.
pub const LOG_ENV: &str = "ROWDRAIN_LOG";

static METRIC_DESCRIPTIONS: Once = Once::new();

#[derive(Debug, Error)]
#[error("telemetry failure: {message}")]
pub struct TelemetryError {
    message: String,
}

/// Install the subscriber from [`subscriber`] as the global default and
/// describe the crate's metrics.
///
/// Fails when a global subscriber is already set.
pub fn init(logging: &LoggingSettings) -> Result<(), TelemetryError> {
    describe_metrics();
    subscriber(logging).try_init().map_err(|err| TelemetryError {
        message: format!("failed to install tracing subscriber: {err}"),
    })
}

/// Build the subscriber stack for `logging` without installing it.
///
/// Useful with `tracing::subscriber::with_default` to scope logging to a
/// block instead of the whole process.
pub fn subscriber(logging: &LoggingSettings) -> impl Subscriber + Send + Sync + 'static {
    tracing_subscriber::registry()
        .with(level_filter(logging))
        .with(ErrorLayer::default())
        .with(output_layer(logging.format))
}

fn level_filter(logging: &LoggingSettings) -> EnvFilter {
    EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .with_env_var(LOG_ENV)
        .from_env_lossy()
}

fn output_layer<S>(format: LogFormat) -> Box<dyn Layer<S> + Send + Sync>
where
    S: Subscriber + for<'span> LookupSpan<'span> + 'static,
{
    let layer = fmt::layer().with_target(true);
    match format {
        LogFormat::Json => layer.json().with_current_span(true).with_span_list(true).boxed(),
        LogFormat::Compact => layer.compact().boxed(),
    }
}

/// Register descriptions for every metric the crate emits. Idempotent.
pub fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            METRIC_CACHE_HIT,
            Unit::Count,
            "Total number of expiring store lookups that found a live entry."
        );
        describe_counter!(
            METRIC_CACHE_MISS,
            Unit::Count,
            "Total number of expiring store lookups that found nothing usable."
        );
        describe_counter!(
            METRIC_CACHE_EXPIRED,
            Unit::Count,
            "Total number of entries evicted after idling past their window."
        );
        describe_gauge!(
            METRIC_CACHE_ENTRIES,
            Unit::Count,
            "Current number of entries held by the expiring store."
        );
        describe_counter!(
            METRIC_ACCESSOR_BUILD,
            Unit::Count,
            "Total number of accessor tables built."
        );
        describe_counter!(
            METRIC_MATERIALIZE_ROWS,
            Unit::Count,
            "Total number of rows materialized into entities."
        );
        describe_histogram!(
            METRIC_MATERIALIZE_MS,
            Unit::Milliseconds,
            "Materialization latency per call in milliseconds."
        );
    });
}

#[cfg(test)]
mod tests {
    use tracing::Level;
    use tracing::level_filters::LevelFilter;

    use super::*;

    fn warn_only(format: LogFormat) -> LoggingSettings {
        LoggingSettings {
            level: LevelFilter::WARN,
            format,
        }
    }

    #[test]
    fn scoped_subscriber_applies_configured_level() {
        if std::env::var_os(LOG_ENV).is_some() {
            return;
        }

        for format in [LogFormat::Compact, LogFormat::Json] {
            tracing::subscriber::with_default(subscriber(&warn_only(format)), || {
                assert!(tracing::enabled!(Level::WARN));
                assert!(!tracing::enabled!(Level::INFO));
            });
        }
    }

    #[test]
    fn second_install_is_reported() {
        // Whichever call runs first may win the global slot; the second never does.
        let _ = init(&warn_only(LogFormat::Compact));
        let err = init(&warn_only(LogFormat::Compact)).expect_err("subscriber already installed");
        assert!(err.to_string().contains("tracing subscriber"));
    }
}
