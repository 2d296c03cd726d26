use std::sync::Once;

use metrics::{Unit, describe_counter, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
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
            "catalogd_cache_hit_total",
            Unit::Count,
            "Total number of cache hits, by operation."
        );
        describe_counter!(
            "catalogd_cache_miss_total",
            Unit::Count,
            "Total number of cache misses, by operation."
        );
        describe_counter!(
            "catalogd_cache_decode_error_total",
            Unit::Count,
            "Total number of cached payloads that failed to decode and were treated as misses."
        );
        describe_counter!(
            "catalogd_cache_write_error_total",
            Unit::Count,
            "Total number of failed cache writes."
        );
        describe_counter!(
            "catalogd_cache_evict_total",
            Unit::Count,
            "Total number of in-memory cache evictions due to capacity."
        );
        describe_counter!(
            "catalogd_coalesce_shared_total",
            Unit::Count,
            "Total number of callers served by another caller's in-flight fetch."
        );
        describe_histogram!(
            "catalogd_repository_fetch_ms",
            Unit::Milliseconds,
            "Repository fetch latency in milliseconds, by operation."
        );
    });
}
