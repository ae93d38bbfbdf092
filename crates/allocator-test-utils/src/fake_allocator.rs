//! Scriptable allocator for pull-gauge testing.
//!
//! Answers [`AllocatorQuery`]s from a table instead of live allocator state:
//! - Per-query values or failures
//! - A default value for unscripted queries
//! - Queries that never answer (for read-timeout tests)
//! - Shutdown (every read fails with [`SourceError::Unavailable`])
//!
//! # Example
//!
//! ```rust,ignore
//! use allocator_test_utils::FakeAllocator;
//!
//! let fake = FakeAllocator::new()
//!     .with_value(AllocatorQuery::EventQueueDispatches, 2.0)
//!     .with_failure(AllocatorQuery::OfferFiltersActive { role: "web".into() }, "boom");
//!
//! let metrics = AllocatorMetrics::new(catalog, Arc::new(fake.clone()), &kinds, options)?;
//! assert_eq!(fake.query_count(), 0);
//! ```

use allocator_metrics::errors::SourceError;
use allocator_metrics::gauge::ValueFuture;
use allocator_metrics::registry::{AllocatorQuery, AllocatorQuerySource};
use futures::future::{self, FutureExt};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

/// Fake allocator answering pull-gauge queries from a table.
#[derive(Debug, Clone, Default)]
pub struct FakeAllocator {
    inner: Arc<Mutex<FakeAllocatorInner>>,
}

#[derive(Debug, Default)]
struct FakeAllocatorInner {
    /// Scripted answers per query
    answers: HashMap<AllocatorQuery, Result<f64, SourceError>>,
    /// Answer for queries without a scripted entry
    default_value: f64,
    /// Queries that never resolve
    hanging: HashSet<AllocatorQuery>,
    /// Every query received, in order
    received: Vec<AllocatorQuery>,
    /// Whether the fake has been stopped
    stopped: bool,
}

impl FakeAllocator {
    /// Create a fake that answers every query with `0.0`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer unscripted queries with `value`.
    #[must_use]
    pub fn with_default_value(self, value: f64) -> Self {
        self.inner.lock().unwrap().default_value = value;
        self
    }

    /// Answer `query` with `value`.
    #[must_use]
    pub fn with_value(self, query: AllocatorQuery, value: f64) -> Self {
        self.set_value(query, value);
        self
    }

    /// Fail `query` with [`SourceError::Failed`].
    #[must_use]
    pub fn with_failure(self, query: AllocatorQuery, reason: &str) -> Self {
        self.inner
            .lock()
            .unwrap()
            .answers
            .insert(query, Err(SourceError::Failed(reason.to_string())));
        self
    }

    /// Never answer `query`.
    #[must_use]
    pub fn with_hang(self, query: AllocatorQuery) -> Self {
        self.inner.lock().unwrap().hanging.insert(query);
        self
    }

    /// Change the answer to `query` after construction.
    pub fn set_value(&self, query: AllocatorQuery, value: f64) {
        let mut inner = self.inner.lock().unwrap();
        inner.hanging.remove(&query);
        inner.answers.insert(query, Ok(value));
    }

    /// Make every later read fail as if the allocator had stopped.
    pub fn stop(&self) {
        self.inner.lock().unwrap().stopped = true;
    }

    /// Number of queries received so far.
    #[must_use]
    pub fn query_count(&self) -> usize {
        self.inner.lock().unwrap().received.len()
    }

    /// Every query received so far, in order.
    #[must_use]
    pub fn received(&self) -> Vec<AllocatorQuery> {
        self.inner.lock().unwrap().received.clone()
    }
}

impl AllocatorQuerySource for FakeAllocator {
    fn query(&self, query: AllocatorQuery) -> ValueFuture {
        let mut inner = self.inner.lock().unwrap();
        inner.received.push(query.clone());

        if inner.stopped {
            return future::ready(Err(SourceError::Unavailable)).boxed();
        }
        if inner.hanging.contains(&query) {
            return future::pending().boxed();
        }

        let answer = inner
            .answers
            .get(&query)
            .cloned()
            .unwrap_or(Ok(inner.default_value));
        future::ready(answer).boxed()
    }
}
