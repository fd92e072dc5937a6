use std::sync::Once;

use metrics::{Unit, describe_counter, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::application::catalog::{
    METRIC_CACHE_BYPASS, METRIC_CACHE_FILL_SKIPPED, METRIC_CACHE_HIT, METRIC_CACHE_MISS,
    METRIC_CACHE_WRITE_ERROR, METRIC_STORE_QUERY_MS,
};
use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Install a global tracing subscriber using the provided logging settings.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer().compact().with_target(true).boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(ErrorLayer::default())
        .with(fmt_layer)
        .try_init()
        .map_err(|err| {
            InfraError::telemetry(format!("failed to install tracing subscriber: {err}"))
        })
}

fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            METRIC_CACHE_HIT,
            Unit::Count,
            "Catalog reads answered from the cache."
        );
        describe_counter!(
            METRIC_CACHE_MISS,
            Unit::Count,
            "Catalog reads that missed the cache and went to the store."
        );
        describe_counter!(
            METRIC_CACHE_BYPASS,
            Unit::Count,
            "Catalog reads served from the store because the cache failed."
        );
        describe_counter!(
            METRIC_CACHE_WRITE_ERROR,
            Unit::Count,
            "Cache writes or invalidations that failed."
        );
        describe_counter!(
            METRIC_CACHE_FILL_SKIPPED,
            Unit::Count,
            "Read-through fills dropped because the key already held a newer entry."
        );
        describe_histogram!(
            METRIC_STORE_QUERY_MS,
            Unit::Milliseconds,
            "Record store read latency in milliseconds."
        );
    });
}
