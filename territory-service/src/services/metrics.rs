//! Metrics module for territory-service.
//! Provides Prometheus metrics for licensing operations and webhook handling.

use once_cell::sync::Lazy;
use prometheus::{
    histogram_opts, opts, register_histogram_vec, register_int_counter_vec, Encoder, HistogramVec,
    IntCounterVec, TextEncoder,
};
use std::sync::OnceLock;

/// Database query duration histogram
pub static DB_QUERY_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        histogram_opts!(
            "territory_db_query_duration_seconds",
            "Database query duration"
        ),
        &["operation"]
    )
    .expect("Failed to register DB_QUERY_DURATION")
});

/// Webhook events counter by type and outcome
pub static WEBHOOK_EVENTS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

/// Checkout sessions counter by flow
pub static CHECKOUT_SESSIONS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

/// Credit grants counter by reason
pub static CREDIT_GRANTS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

/// County status transitions counter
pub static COUNTY_STATUS_TRANSITIONS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

/// Auction claims counter by outcome
pub static AUCTION_CLAIMS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

/// Error counter for alerting
pub static ERRORS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

/// Initialize all metrics. Call once at startup.
pub fn init_metrics() {
    WEBHOOK_EVENTS_TOTAL.get_or_init(|| {
        register_int_counter_vec!(
            opts!(
                "territory_webhook_events_total",
                "Total webhook events by type and outcome"
            ),
            &["event_type", "outcome"]
        )
        .expect("Failed to register WEBHOOK_EVENTS_TOTAL")
    });

    CHECKOUT_SESSIONS_TOTAL.get_or_init(|| {
        register_int_counter_vec!(
            opts!(
                "territory_checkout_sessions_total",
                "Total checkout sessions created by flow"
            ),
            &["flow"]
        )
        .expect("Failed to register CHECKOUT_SESSIONS_TOTAL")
    });

    CREDIT_GRANTS_TOTAL.get_or_init(|| {
        register_int_counter_vec!(
            opts!("territory_credit_grants_total", "Total credit grants by reason"),
            &["reason"]
        )
        .expect("Failed to register CREDIT_GRANTS_TOTAL")
    });

    COUNTY_STATUS_TRANSITIONS_TOTAL.get_or_init(|| {
        register_int_counter_vec!(
            opts!(
                "territory_county_status_transitions_total",
                "County status recompute results"
            ),
            &["status"]
        )
        .expect("Failed to register COUNTY_STATUS_TRANSITIONS_TOTAL")
    });

    AUCTION_CLAIMS_TOTAL.get_or_init(|| {
        register_int_counter_vec!(
            opts!(
                "territory_auction_claims_total",
                "Total auction claim attempts by outcome"
            ),
            &["outcome"]
        )
        .expect("Failed to register AUCTION_CLAIMS_TOTAL")
    });

    ERRORS_TOTAL.get_or_init(|| {
        register_int_counter_vec!(
            opts!("territory_errors_total", "Total errors by type for alerting"),
            &["error_type", "operation"]
        )
        .expect("Failed to register ERRORS_TOTAL")
    });

    // Force initialization of lazy statics
    let _ = &*DB_QUERY_DURATION;
}

/// Get metrics in Prometheus text format.
pub fn get_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .expect("Failed to encode metrics");
    String::from_utf8(buffer).expect("Failed to convert metrics to string")
}

/// Record a webhook event outcome.
pub fn record_webhook_event(event_type: &str, outcome: &str) {
    if let Some(counter) = WEBHOOK_EVENTS_TOTAL.get() {
        counter.with_label_values(&[event_type, outcome]).inc();
    }
}

/// Record a checkout session creation.
pub fn record_checkout_session(flow: &str) {
    if let Some(counter) = CHECKOUT_SESSIONS_TOTAL.get() {
        counter.with_label_values(&[flow]).inc();
    }
}

/// Record a credit grant.
pub fn record_credit_grant(reason: &str) {
    if let Some(counter) = CREDIT_GRANTS_TOTAL.get() {
        counter.with_label_values(&[reason]).inc();
    }
}

/// Record the result of a county status recompute.
pub fn record_county_status(status: &str) {
    if let Some(counter) = COUNTY_STATUS_TRANSITIONS_TOTAL.get() {
        counter.with_label_values(&[status]).inc();
    }
}

/// Record an auction claim attempt.
pub fn record_auction_claim(outcome: &str) {
    if let Some(counter) = AUCTION_CLAIMS_TOTAL.get() {
        counter.with_label_values(&[outcome]).inc();
    }
}

/// Record an error for alerting.
pub fn record_error(error_type: &str, operation: &str) {
    if let Some(counter) = ERRORS_TOTAL.get() {
        counter.with_label_values(&[error_type, operation]).inc();
    }
}
