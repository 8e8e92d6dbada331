//! Metrics instrumentation for fab-dns.
//!
//! All metrics are prefixed with `fabdns.`

use metrics::{counter, gauge, histogram};
use std::time::Instant;

/// Record a DNS query.
pub fn record_query(record_type: &str, result: QueryResult, duration: std::time::Duration) {
    let result_str = match result {
        QueryResult::Success => "success",
        QueryResult::NxDomain => "nxdomain",
        QueryResult::EmptyAnswer => "empty_answer",
        QueryResult::NotImplemented => "not_implemented",
        QueryResult::Fallthrough => "fallthrough",
    };

    counter!("fabdns.query.count", "type" => record_type.to_string(), "result" => result_str)
        .increment(1);
    histogram!("fabdns.query.duration.seconds", "type" => record_type.to_string())
        .record(duration.as_secs_f64());
}

/// Query result type for metrics.
#[derive(Debug, Clone, Copy)]
pub enum QueryResult {
    /// Query returned records successfully.
    Success,
    /// Service, hostname or cluster not found.
    NxDomain,
    /// Service found, but no address of the queried family.
    EmptyAnswer,
    /// Query type other than A or AAAA.
    NotImplemented,
    /// Query delegated to the next authority in the chain.
    Fallthrough,
}

/// Record the number of addresses returned for a successful lookup.
pub fn record_answer_size(record_type: &str, count: usize) {
    histogram!("fabdns.query.answers", "type" => record_type.to_string()).record(count as f64);
}

/// Record store contents (call periodically or on change).
pub fn record_store_counts(services: usize, namespaces: usize) {
    gauge!("fabdns.store.services.count").set(services as f64);
    gauge!("fabdns.store.namespaces.count").set(namespaces as f64);
}

/// Record a handled hub API request.
pub fn record_hub_request(path: &'static str, status: u16) {
    counter!("fabdns.hub.request.count", "path" => path, "status" => status.to_string())
        .increment(1);
}

/// Record the outcome of an import cycle.
pub fn record_import_cycle(result: ImportResult) {
    let result_str = match result {
        ImportResult::Success => "success",
        ImportResult::DownloadFailed => "download_failed",
    };
    counter!("fabdns.import.cycle.count", "result" => result_str).increment(1);
}

/// Record how many services the last import carried.
pub fn record_imported_services(count: usize) {
    gauge!("fabdns.import.services.count").set(count as f64);
}

/// Import cycle outcome for metrics.
#[derive(Debug, Clone, Copy)]
pub enum ImportResult {
    /// Catalog downloaded and reconciled.
    Success,
    /// The download failed; retried on the next tick.
    DownloadFailed,
}

/// Record a cluster expiring from the registry.
pub fn record_cluster_expired() {
    counter!("fabdns.cleaner.expired_clusters.count").increment(1);
}

/// Record one revocation performed by the cleaner.
pub fn record_cleaner_revocation() {
    counter!("fabdns.cleaner.revocations.count").increment(1);
}

/// Helper for timing operations.
pub struct Timer {
    start: Instant,
}

impl Timer {
    /// Start a new timer.
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Get elapsed duration since timer start.
    pub fn elapsed(&self) -> std::time::Duration {
        self.start.elapsed()
    }
}
