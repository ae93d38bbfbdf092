//! Self-observability metrics for the allocator metrics registries.
//!
//! These describe the registry machinery itself (registrations, pull reads,
//! lifecycle violations) and are emitted through the `metrics` facade, which
//! is independent of the catalog the registries manage.
//!
//! All metrics follow Prometheus naming conventions:
//! - `allocator_metrics_` prefix
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Labels are bounded:
//! - `kind`: 4 values (counter, push_gauge, pull_gauge, timer)
//! - `status`: success, timeout, unavailable, failed
//! - `operation`: bounded by registry operations (~10 values)
//! - `error_type`: bounded by `CatalogError` variants
//!
//! Metric names never carry role or framework identifiers.

use metrics::{counter, gauge, histogram};
use std::time::Duration;

// ============================================================================
// Registration Metrics
// ============================================================================

/// Record a successful catalog registration.
///
/// Metric: `allocator_metrics_registrations_total`
/// Labels: `kind`
pub fn record_registration(kind: &'static str) {
    counter!("allocator_metrics_registrations_total", "kind" => kind).increment(1);
}

/// Record a successful catalog unregistration.
///
/// Metric: `allocator_metrics_unregistrations_total`
/// Labels: `kind`
pub fn record_unregistration(kind: &'static str) {
    counter!("allocator_metrics_unregistrations_total", "kind" => kind).increment(1);
}

/// Record a registration rejected by the catalog (naming collision or
/// malformed name).
///
/// Metric: `allocator_metrics_registrations_rejected_total`
/// Labels: `error_type`
pub fn record_registration_rejected(error_type: &'static str) {
    counter!("allocator_metrics_registrations_rejected_total", "error_type" => error_type)
        .increment(1);
}

/// Set the number of entries currently held by the catalog.
///
/// Metric: `allocator_metrics_catalog_entries`
/// Labels: none
pub fn set_catalog_entries(count: usize) {
    // usize to f64 conversion is safe for realistic catalog sizes (< 2^53)
    #[allow(clippy::cast_precision_loss)]
    gauge!("allocator_metrics_catalog_entries").set(count as f64);
}

// ============================================================================
// Lifecycle Violations
// ============================================================================

/// Record a lifecycle precondition violation.
///
/// Metric: `allocator_metrics_precondition_violations_total`
/// Labels: `operation`
///
/// ALERT: Any non-zero value indicates a bug in domain-event ordering.
pub fn record_precondition_violation(operation: &'static str) {
    counter!("allocator_metrics_precondition_violations_total", "operation" => operation)
        .increment(1);
}

// ============================================================================
// Pull Reads
// ============================================================================

/// Record the outcome and latency of a pull-gauge read.
///
/// Metrics:
/// - `allocator_metrics_pull_reads_total` (labels: `status`)
/// - `allocator_metrics_pull_read_duration_seconds` (no labels)
pub fn record_pull_read(status: &'static str, duration: Duration) {
    histogram!("allocator_metrics_pull_read_duration_seconds").record(duration.as_secs_f64());
    counter!("allocator_metrics_pull_reads_total", "status" => status).increment(1);
}

/// Record a catalog snapshot.
///
/// Metrics:
/// - `allocator_metrics_snapshot_duration_seconds` (no labels)
/// - `allocator_metrics_snapshot_unavailable_total` (no labels), incremented
///   by the number of entries omitted from the snapshot
pub fn record_snapshot(duration: Duration, unavailable: usize) {
    histogram!("allocator_metrics_snapshot_duration_seconds").record(duration.as_secs_f64());
    if unavailable > 0 {
        counter!("allocator_metrics_snapshot_unavailable_total").increment(unavailable as u64);
    }
}

// ============================================================================
// Allocator Actor
// ============================================================================

/// Set the allocator mailbox depth.
///
/// Metric: `allocator_mailbox_depth`
/// Labels: none
///
/// High values delay pull-gauge reads, since every read is queued behind
/// pending allocator events.
pub fn set_mailbox_depth(depth: usize) {
    #[allow(clippy::cast_precision_loss)]
    gauge!("allocator_mailbox_depth").set(depth as f64);
}
