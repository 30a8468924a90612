//! Prometheus metrics registry and instruments.
//!
//! Instruments are process-wide; every replica instance reports into the
//! same registry.

use std::sync::Once;

use lazy_static::lazy_static;
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGaugeVec, Opts, Registry, TextEncoder};

use crate::error::ReplicaError;

lazy_static! {
    /// Global Prometheus registry
    pub static ref REGISTRY: Registry = Registry::new();

    // Entity Store Metrics
    pub static ref CACHE_SIZE: IntGaugeVec = IntGaugeVec::new(
        Opts::new("feed_replica_cache_size", "Current number of records per table"),
        &["table"]
    ).expect("metric can be created");
    pub static ref CACHE_HITS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("feed_replica_cache_hits_total", "Total number of lookups that found a record"),
        &["table"]
    ).expect("metric can be created");
    pub static ref CACHE_MISSES_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("feed_replica_cache_misses_total", "Total number of lookups that found nothing"),
        &["table"]
    ).expect("metric can be created");
    pub static ref VALIDATION_REJECTIONS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("feed_replica_validation_rejections_total", "Total number of records dropped at the upsert boundary"),
        &["entity"]
    ).expect("metric can be created");

    // Observer Metrics
    pub static ref OBSERVERS_ACTIVE: IntGaugeVec = IntGaugeVec::new(
        Opts::new("feed_replica_observers_active", "Current number of registered observers"),
        &["kind"]
    ).expect("metric can be created");

    // Remote Metrics
    pub static ref REMOTE_FETCHES_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("feed_replica_remote_fetches_total", "Total number of paginated remote fetches"),
        &["source", "outcome"]
    ).expect("metric can be created");

    // Reconciliation Metrics
    pub static ref RECONCILIATION_ATTEMPTS_TOTAL: IntCounter = IntCounter::new(
        "feed_replica_reconciliation_attempts_total",
        "Total number of publication-by-hash polls"
    ).expect("metric can be created");
    pub static ref RECONCILIATION_OUTCOMES_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("feed_replica_reconciliation_outcomes_total", "Total number of finished reconciliation loops"),
        &["outcome"]
    ).expect("metric can be created");

    // Error Metrics
    pub static ref ERRORS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("feed_replica_errors_total", "Total number of errors"),
        &["kind"]
    ).expect("metric can be created");
}

static INIT: Once = Once::new();

/// Initialize metrics registry.
///
/// Safe to call more than once; registration happens on the first call.
pub fn init_metrics() {
    INIT.call_once(|| {
        REGISTRY
            .register(Box::new(CACHE_SIZE.clone()))
            .expect("CACHE_SIZE can be registered");
        REGISTRY
            .register(Box::new(CACHE_HITS_TOTAL.clone()))
            .expect("CACHE_HITS_TOTAL can be registered");
        REGISTRY
            .register(Box::new(CACHE_MISSES_TOTAL.clone()))
            .expect("CACHE_MISSES_TOTAL can be registered");
        REGISTRY
            .register(Box::new(VALIDATION_REJECTIONS_TOTAL.clone()))
            .expect("VALIDATION_REJECTIONS_TOTAL can be registered");
        REGISTRY
            .register(Box::new(OBSERVERS_ACTIVE.clone()))
            .expect("OBSERVERS_ACTIVE can be registered");
        REGISTRY
            .register(Box::new(REMOTE_FETCHES_TOTAL.clone()))
            .expect("REMOTE_FETCHES_TOTAL can be registered");
        REGISTRY
            .register(Box::new(RECONCILIATION_ATTEMPTS_TOTAL.clone()))
            .expect("RECONCILIATION_ATTEMPTS_TOTAL can be registered");
        REGISTRY
            .register(Box::new(RECONCILIATION_OUTCOMES_TOTAL.clone()))
            .expect("RECONCILIATION_OUTCOMES_TOTAL can be registered");
        REGISTRY
            .register(Box::new(ERRORS_TOTAL.clone()))
            .expect("ERRORS_TOTAL can be registered");

        tracing::info!("Metrics registry initialized");
    });
}

/// Encode every registered metric in Prometheus text format
pub fn gather_metrics() -> Result<String, ReplicaError> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| ReplicaError::Internal(e.into()))?;
    String::from_utf8(buffer).map_err(|e| ReplicaError::Internal(e.into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_is_idempotent_and_gathers_text() {
        init_metrics();
        init_metrics();

        CACHE_SIZE.with_label_values(&["publication"]).set(3);
        let text = gather_metrics().unwrap();
        assert!(text.contains("feed_replica_cache_size"));
    }
}
