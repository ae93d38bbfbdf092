//! Observability for the allocator metrics service.
//!
//! # Privacy by Default
//!
//! Role and framework names are external input. They appear in structured log
//! fields and in catalog metric names, but never as labels on the
//! self-observability metrics, which keep bounded cardinality.
//!
//! # Metrics
//!
//! | Metric | Type | Labels | Purpose |
//! |--------|------|--------|---------|
//! | `allocator_metrics_registrations_total` | Counter | `kind` | Catalog registrations |
//! | `allocator_metrics_unregistrations_total` | Counter | `kind` | Catalog unregistrations |
//! | `allocator_metrics_registrations_rejected_total` | Counter | `error_type` | Naming collisions |
//! | `allocator_metrics_catalog_entries` | Gauge | none | Live catalog size |
//! | `allocator_metrics_precondition_violations_total` | Counter | `operation` | Lifecycle bugs |
//! | `allocator_metrics_pull_reads_total` | Counter | `status` | Pull-gauge read outcomes |
//! | `allocator_metrics_pull_read_duration_seconds` | Histogram | none | Pull-gauge read latency |
//! | `allocator_metrics_snapshot_duration_seconds` | Histogram | none | Snapshot resolution time |
//! | `allocator_metrics_snapshot_unavailable_total` | Counter | none | Entries omitted from snapshots |
//! | `allocator_mailbox_depth` | Gauge | none | Allocator backlog |

pub mod metrics;

pub use metrics::{
    record_precondition_violation, record_pull_read, record_registration,
    record_registration_rejected, record_snapshot, record_unregistration, set_catalog_entries,
    set_mailbox_depth,
};
