//! # Allocator Test Utilities
//!
//! Shared test utilities for the allocator metrics registries and actor.
//!
//! This crate provides fakes and fixtures for exercising the registries in
//! isolation, without a running allocator actor.
//!
//! ## Modules
//!
//! - `fake_allocator` - Scriptable [`AllocatorQuerySource`] for pull gauges
//! - `recording_catalog` - Catalog that records every register/unregister
//!   call and can reject chosen names
//! - `fixtures` - Pre-configured test data (frameworks, quotas, resources)
//! - `assertions` - Catalog state verification helpers
//!
//! ## Usage
//!
//! ```rust,ignore
//! use allocator_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() {
//!     // Allocator that answers every resource query with 8.0
//!     let fake = FakeAllocator::new().with_default_value(8.0);
//!
//!     let catalog = InMemoryCatalog::new();
//!     let metrics = AllocatorMetrics::new(
//!         catalog.clone(),
//!         Arc::new(fake.clone()),
//!         &resource_kinds(&["cpus", "mem"]),
//!         report_options(),
//!     )
//!     .unwrap();
//!
//!     drop(metrics);
//!     assert_catalog_empty(&catalog);
//! }
//! ```
//!
//! ## Test Patterns
//!
//! ### Unavailable Pull Gauges
//!
//! ```rust,ignore
//! let fake = FakeAllocator::new()
//!     .with_value(AllocatorQuery::EventQueueDispatches, 3.0)
//!     .with_hang(AllocatorQuery::ResourcesTotal { resource: "cpus".into() });
//!
//! // The hanging read times out and is omitted from the snapshot
//! let snapshot = catalog.snapshot().await;
//! assert!(snapshot.get("allocator/mesos/resources/cpus/total").is_none());
//! ```
//!
//! ### Name Collisions
//!
//! ```rust,ignore
//! let catalog = RecordingCatalog::new()
//!     .with_rejected_name("allocator/mesos/offer_filters/roles/a%2Fb/active");
//!
//! // Registration fails and nothing is left behind
//! assert!(metrics.add_role("a/b").is_err());
//! ```
//!
//! [`AllocatorQuerySource`]: allocator_metrics::registry::AllocatorQuerySource

pub mod assertions;
pub mod fake_allocator;
pub mod fixtures;
pub mod recording_catalog;

pub use assertions::*;
pub use fake_allocator::*;
pub use fixtures::*;
pub use recording_catalog::*;
