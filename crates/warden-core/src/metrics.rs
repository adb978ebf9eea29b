// Metrics module for the lock engine
// Provides counters, gauges, and histograms for requests, locks, sweeps and the store

use std::time::Instant;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use warden_common::LockKind;
use warden_persistence::QuerySnapshot;

/// Initialize all metric descriptions
/// Should be called once at application startup
pub fn init_metrics() {
    // Request metrics
    describe_counter!(
        "warden_requests_started_total",
        "Total number of lock requests received"
    );
    describe_counter!(
        "warden_requests_succeeded_total",
        "Total number of lock requests that succeeded"
    );
    describe_counter!(
        "warden_requests_failed_total",
        "Total number of lock requests that failed"
    );
    describe_gauge!(
        "warden_requests_in_flight",
        "Number of lock requests currently being served"
    );
    describe_histogram!(
        "warden_request_duration_seconds",
        "Lock request duration in seconds"
    );

    // Lock metrics
    describe_counter!(
        "warden_lock_acquisitions_total",
        "Total number of successful acquisitions"
    );
    describe_counter!(
        "warden_lock_conflicts_total",
        "Total number of acquisitions rejected because the key is held"
    );
    describe_counter!(
        "warden_lock_releases_total",
        "Total number of successful releases"
    );
    describe_gauge!("warden_active_locks", "Number of live lock records");
    describe_gauge!("warden_active_presences", "Number of live presence records");

    // Sweeper metrics
    describe_counter!(
        "warden_sweep_evictions_total",
        "Total number of expired records removed by the sweeper"
    );
    describe_counter!(
        "warden_sweep_failures_total",
        "Total number of sweep cycles that failed"
    );

    // Database metrics
    describe_counter!("warden_db_queries_total", "Total number of store queries");
    describe_counter!(
        "warden_db_queries_succeeded",
        "Total number of store queries that succeeded"
    );
    describe_counter!(
        "warden_db_queries_failed",
        "Total number of store queries that failed"
    );
    describe_gauge!(
        "warden_db_query_duration_max_seconds",
        "Longest store query in the last reporting window"
    );
    describe_gauge!(
        "warden_db_queries_in_flight_max",
        "Peak concurrent store queries in the last reporting window"
    );

    tracing::info!("Metrics initialized");
}

/// Record that a request started
pub fn record_request_started(operation: &'static str) {
    counter!("warden_requests_started_total", "operation" => operation).increment(1);
    gauge!("warden_requests_in_flight", "operation" => operation).increment(1.0);
}

/// Record the outcome of a request that ran to completion
pub fn record_request_outcome(operation: &'static str, error: Option<&'static str>) {
    match error {
        None => counter!("warden_requests_succeeded_total", "operation" => operation).increment(1),
        Some(kind) => {
            counter!("warden_requests_failed_total", "operation" => operation, "error" => kind)
                .increment(1)
        }
    }
}

/// Record that a request left the handler, finished or cancelled
pub fn record_request_done(operation: &'static str, duration_secs: f64) {
    gauge!("warden_requests_in_flight", "operation" => operation).decrement(1.0);
    histogram!("warden_request_duration_seconds", "operation" => operation).record(duration_secs);
}

pub fn record_acquisition(kind: LockKind) {
    counter!("warden_lock_acquisitions_total", "kind" => kind.as_str()).increment(1);
}

pub fn record_conflict() {
    counter!("warden_lock_conflicts_total").increment(1);
}

pub fn record_release() {
    counter!("warden_lock_releases_total").increment(1);
}

pub fn record_sweep(evictions: u64) {
    counter!("warden_sweep_evictions_total").increment(evictions);
}

pub fn record_sweep_failure() {
    counter!("warden_sweep_failures_total").increment(1);
}

/// Update live record gauges
pub fn set_active_counts(locks: u64, presences: u64) {
    gauge!("warden_active_locks").set(locks as f64);
    gauge!("warden_active_presences").set(presences as f64);
}

/// Publish one query monitor window
pub fn record_db_snapshot(snapshot: &QuerySnapshot) {
    counter!("warden_db_queries_total").increment(snapshot.total);
    counter!("warden_db_queries_succeeded").increment(snapshot.succeeded);
    counter!("warden_db_queries_failed").increment(snapshot.failed);
    gauge!("warden_db_query_duration_max_seconds").set(snapshot.duration_max.as_secs_f64());
    gauge!("warden_db_queries_in_flight_max").set(snapshot.in_flight_max as f64);
}

/// Timer helper for measuring operation duration
pub struct Timer {
    start: Instant,
}

impl Timer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}
