//! Metrics registries owned by the allocator.
//!
//! Each registry exclusively owns the sources it creates and holds the only
//! record of which names it registered. Registration happens on the first
//! observation of a key; unregistration happens when the key is explicitly
//! retired or when the registry is dropped. Dropping a registry unregisters
//! everything it still holds, so a registry can never leak entries.
//!
//! Registries are not internally synchronized. They are mutated only from
//! the allocator actor's task, which processes one message at a time.
//!
//! - [`allocator`] - allocator-wide fixed metrics, resource kinds, quota and
//!   offer-filter gauges
//! - [`framework`] - per-framework filtered-resource counters, DRF positions
//!   and suppression gauges

pub mod allocator;
pub mod framework;

pub use allocator::{AllocatorMetrics, AllocatorQuery, AllocatorQuerySource};
pub use framework::{FilterReason, FrameworkMetrics};

use crate::catalog::{CatalogBinding, ViolationPolicy};
use crate::errors::RegistryError;
use crate::gauge::MetricSource;
use std::time::Duration;

/// Default read timeout for pull gauges.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(5);

/// Default window for allocation-run statistics.
pub const DEFAULT_STATS_WINDOW: Duration = Duration::from_secs(60 * 60);

/// Settings shared by both registries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryOptions {
    /// What to do when a lifecycle precondition is broken.
    pub policy: ViolationPolicy,
    /// Bound on every pull-gauge read.
    pub read_timeout: Duration,
    /// Window kept by allocation-run timers.
    pub stats_window: Duration,
}

impl Default for RegistryOptions {
    fn default() -> Self {
        Self {
            policy: ViolationPolicy::Abort,
            read_timeout: DEFAULT_READ_TIMEOUT,
            stats_window: DEFAULT_STATS_WINDOW,
        }
    }
}

/// A name registered by a registry together with the source it owns.
#[derive(Debug, Clone)]
pub(crate) struct Entry {
    pub(crate) name: String,
    pub(crate) source: MetricSource,
}

impl Entry {
    /// Register `source` under `name` and keep both.
    pub(crate) fn register(
        binding: &CatalogBinding,
        name: String,
        source: MetricSource,
    ) -> Result<Self, RegistryError> {
        binding.register(&name, source.clone())?;
        Ok(Self { name, source })
    }
}

/// Unregister every entry, returning the first failure.
pub(crate) fn unregister_entries<'a, I>(
    binding: &CatalogBinding,
    operation: &'static str,
    entries: I,
) -> Result<(), RegistryError>
where
    I: IntoIterator<Item = &'a Entry>,
{
    binding.unregister_all(
        operation,
        entries
            .into_iter()
            .map(|entry| (entry.name.as_str(), entry.source.kind())),
    )
}
