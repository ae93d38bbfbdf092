//! Allocator Metrics Library
//!
//! Dynamic metrics lifecycle for a cluster resource allocator. Metrics whose
//! key space follows the cluster workload (roles, quotas, frameworks) are
//! registered when a key is first observed and unregistered when it is
//! retired, so the metrics catalog mirrors live allocator state.
//!
//! # Architecture
//!
//! ```text
//! AllocatorActor (single owner of allocator state)
//! ├── AllocatorMetrics (fixed, resource-kind, quota and offer-filter gauges)
//! └── FrameworkMetrics (one per framework: counters, DRF positions, suppression)
//!         │ register / unregister
//!         ▼
//!     MetricsCatalog  ◄── snapshot readers
//!         │ pull-gauge reads
//!         ▼
//!     AllocatorRef (weak sender back into the actor's mailbox)
//! ```
//!
//! # Modules
//!
//! - [`actors`] - allocator actor, handle and state
//! - [`catalog`] - catalog trait, in-memory catalog, registry binding
//! - [`config`] - service configuration from environment
//! - [`errors`] - error types
//! - [`gauge`] - counters, push/pull gauges, windowed timers
//! - [`observability`] - self-observability metrics
//! - [`registry`] - allocator and framework metrics registries

pub mod actors;
pub mod catalog;
pub mod config;
pub mod errors;
pub mod gauge;
pub mod observability;
pub mod registry;
