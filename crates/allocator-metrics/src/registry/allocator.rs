//! Allocator-wide metrics registry.
//!
//! Owns three kinds of entries:
//!
//! - Five fixed metrics registered for the registry's whole lifetime: two
//!   event-queue gauges, the allocation-run counter and two allocation-run
//!   timers.
//! - Per resource kind: `total` and `offered_or_allocated` pull gauges. The
//!   kind list is fixed at construction; kinds are not added or removed at
//!   runtime.
//! - Per role: quota gauges (`setQuota`/`removeQuota`) and an offer-filter
//!   gauge (`addRole`/`removeRole`).
//!
//! All pull gauges are answered by an [`AllocatorQuerySource`], which in the
//! service dispatches a request into the allocator actor's mailbox.

use super::{unregister_entries, Entry, RegistryOptions};
use crate::catalog::{CatalogBinding, MetricsCatalog};
use crate::errors::RegistryError;
use crate::gauge::{Counter, MetricSource, PullGauge, PushGauge, Timer, ValueFuture};
use common::metric_key::normalize;
use common::types::Quota;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

pub const EVENT_QUEUE_DISPATCHES: &str = "allocator/mesos/event_queue_dispatches";
/// Unprefixed alias of [`EVENT_QUEUE_DISPATCHES`] kept for existing dashboards.
pub const EVENT_QUEUE_DISPATCHES_UNPREFIXED: &str = "allocator/event_queue_dispatches";
pub const ALLOCATION_RUNS: &str = "allocator/mesos/allocation_runs";
pub const ALLOCATION_RUN: &str = "allocator/mesos/allocation_run";
pub const ALLOCATION_RUN_LATENCY: &str = "allocator/mesos/allocation_run_latency";

/// Number of fixed metrics registered at construction.
pub const FIXED_METRIC_COUNT: usize = 5;

#[must_use]
pub fn resource_total_name(resource: &str) -> String {
    format!("allocator/mesos/resources/{}/total", normalize(resource))
}

#[must_use]
pub fn resource_offered_or_allocated_name(resource: &str) -> String {
    format!(
        "allocator/mesos/resources/{}/offered_or_allocated",
        normalize(resource)
    )
}

#[must_use]
pub fn quota_guarantee_name(role: &str, resource: &str) -> String {
    format!(
        "allocator/mesos/quota/roles/{}/resources/{}/guarantee",
        normalize(role),
        normalize(resource)
    )
}

#[must_use]
pub fn quota_offered_or_allocated_name(role: &str, resource: &str) -> String {
    format!(
        "allocator/mesos/quota/roles/{}/resources/{}/offered_or_allocated",
        normalize(role),
        normalize(resource)
    )
}

#[must_use]
pub fn offer_filters_active_name(role: &str) -> String {
    format!(
        "allocator/mesos/offer_filters/roles/{}/active",
        normalize(role)
    )
}

/// Read-only queries the allocator answers for pull gauges.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AllocatorQuery {
    /// Number of events waiting in the allocator's queue.
    EventQueueDispatches,
    /// Total amount of a resource across all agents.
    ResourcesTotal { resource: String },
    /// Amount of a resource currently offered or allocated.
    ResourcesOfferedOrAllocated { resource: String },
    /// Amount of a resource offered or allocated to a role with quota.
    QuotaAllocated { role: String, resource: String },
    /// Number of active offer filters for a role.
    OfferFiltersActive { role: String },
}

impl AllocatorQuery {
    /// Returns the query kind as a bounded label.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            AllocatorQuery::EventQueueDispatches => "event_queue_dispatches",
            AllocatorQuery::ResourcesTotal { .. } => "resources_total",
            AllocatorQuery::ResourcesOfferedOrAllocated { .. } => "resources_offered_or_allocated",
            AllocatorQuery::QuotaAllocated { .. } => "quota_allocated",
            AllocatorQuery::OfferFiltersActive { .. } => "offer_filters_active",
        }
    }
}

/// Owner of the allocator state that pull gauges read from.
///
/// `query` must only dispatch the request; the value is computed by the
/// owner on its own task and delivered through the returned future.
pub trait AllocatorQuerySource: Send + Sync + 'static {
    fn query(&self, query: AllocatorQuery) -> ValueFuture;
}

/// Allocator-wide metrics registry.
pub struct AllocatorMetrics {
    binding: CatalogBinding,
    source: Arc<dyn AllocatorQuerySource>,
    read_timeout: Duration,

    allocation_runs: Arc<Counter>,
    allocation_run: Arc<Timer>,
    allocation_run_latency: Arc<Timer>,

    fixed: Vec<Entry>,
    resource_kinds: Vec<String>,
    resources: Vec<Entry>,

    /// Role -> resource -> guarantee gauge.
    quota_guarantee: HashMap<String, BTreeMap<String, Entry>>,
    /// Role -> resource -> allocated pull gauge.
    quota_allocated: HashMap<String, BTreeMap<String, Entry>>,
    /// Role -> offer-filter pull gauge.
    offer_filters_active: HashMap<String, Entry>,
}

impl std::fmt::Debug for AllocatorMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AllocatorMetrics")
            .field("resource_kinds", &self.resource_kinds)
            .field("quota_roles", &self.quota_allocated.len())
            .field("offer_filter_roles", &self.offer_filters_active.len())
            .finish_non_exhaustive()
    }
}

impl AllocatorMetrics {
    /// Create the registry and register the fixed and resource-kind metrics.
    ///
    /// Duplicate resource kinds are registered once.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Catalog`] if any name is rejected by the
    /// catalog (for example, a second allocator registry on the same
    /// catalog). Entries registered before the failure are unregistered.
    pub fn new(
        catalog: Arc<dyn MetricsCatalog>,
        source: Arc<dyn AllocatorQuerySource>,
        resource_kinds: &[String],
        options: RegistryOptions,
    ) -> Result<Self, RegistryError> {
        let mut metrics = Self {
            binding: CatalogBinding::new(catalog, options.policy),
            source,
            read_timeout: options.read_timeout,
            allocation_runs: Counter::new(),
            allocation_run: Timer::new(options.stats_window),
            allocation_run_latency: Timer::new(options.stats_window),
            fixed: Vec::with_capacity(FIXED_METRIC_COUNT),
            resource_kinds: Vec::new(),
            resources: Vec::new(),
            quota_guarantee: HashMap::new(),
            quota_allocated: HashMap::new(),
            offer_filters_active: HashMap::new(),
        };

        // Both queue gauges read the same value; each read is a separate query.
        let dispatches = metrics.pull(AllocatorQuery::EventQueueDispatches);
        metrics.register_fixed(EVENT_QUEUE_DISPATCHES, MetricSource::Pull(dispatches.clone()))?;
        metrics.register_fixed(EVENT_QUEUE_DISPATCHES_UNPREFIXED, MetricSource::Pull(dispatches))?;
        metrics.register_fixed(
            ALLOCATION_RUNS,
            MetricSource::Counter(Arc::clone(&metrics.allocation_runs)),
        )?;
        metrics.register_fixed(
            ALLOCATION_RUN,
            MetricSource::Timer(Arc::clone(&metrics.allocation_run)),
        )?;
        metrics.register_fixed(
            ALLOCATION_RUN_LATENCY,
            MetricSource::Timer(Arc::clone(&metrics.allocation_run_latency)),
        )?;

        for resource in resource_kinds {
            if metrics.resource_kinds.contains(resource) {
                continue;
            }

            let total = metrics.pull(AllocatorQuery::ResourcesTotal {
                resource: resource.clone(),
            });
            let entry = Entry::register(
                &metrics.binding,
                resource_total_name(resource),
                MetricSource::Pull(total),
            )?;
            metrics.resources.push(entry);

            let offered = metrics.pull(AllocatorQuery::ResourcesOfferedOrAllocated {
                resource: resource.clone(),
            });
            let entry = Entry::register(
                &metrics.binding,
                resource_offered_or_allocated_name(resource),
                MetricSource::Pull(offered),
            )?;
            metrics.resources.push(entry);

            metrics.resource_kinds.push(resource.clone());
        }

        info!(
            target: "allocator.metrics.registry",
            resource_kinds = ?metrics.resource_kinds,
            registered = metrics.fixed.len() + metrics.resources.len(),
            "Allocator metrics registered"
        );

        Ok(metrics)
    }

    fn pull(&self, query: AllocatorQuery) -> PullGauge {
        let source = Arc::clone(&self.source);
        PullGauge::new(self.read_timeout, move || source.query(query.clone()))
    }

    fn register_fixed(&mut self, name: &str, source: MetricSource) -> Result<(), RegistryError> {
        let entry = Entry::register(&self.binding, name.to_string(), source)?;
        self.fixed.push(entry);
        Ok(())
    }

    /// Register quota gauges for `role`.
    ///
    /// For every guaranteed resource, registers a guarantee gauge holding the
    /// amount at call time and a pull gauge for the amount currently offered
    /// or allocated to the role.
    ///
    /// # Errors
    ///
    /// - [`RegistryError::Precondition`] if the role already has quota gauges.
    /// - [`RegistryError::Catalog`] if a name is rejected; gauges registered
    ///   by this call are unregistered before returning.
    pub fn set_quota(&mut self, role: &str, quota: &Quota) -> Result<(), RegistryError> {
        if self.quota_allocated.contains_key(role) {
            return Err(self
                .binding
                .violation("set_quota", format!("quota already registered for role {role}")));
        }

        let mut guarantees = BTreeMap::new();
        let mut allocated = BTreeMap::new();

        if let Err(e) = self.register_quota_gauges(role, quota, &mut guarantees, &mut allocated) {
            let _ = unregister_entries(
                &self.binding,
                "set_quota_rollback",
                guarantees.values().chain(allocated.values()),
            );
            return Err(e);
        }

        debug!(
            target: "allocator.metrics.registry",
            role = %role,
            resources = allocated.len(),
            "Quota metrics registered"
        );

        self.quota_guarantee.insert(role.to_string(), guarantees);
        self.quota_allocated.insert(role.to_string(), allocated);
        Ok(())
    }

    fn register_quota_gauges(
        &self,
        role: &str,
        quota: &Quota,
        guarantees: &mut BTreeMap<String, Entry>,
        allocated: &mut BTreeMap<String, Entry>,
    ) -> Result<(), RegistryError> {
        for (resource, amount) in quota.guarantee.iter() {
            let guarantee = Entry::register(
                &self.binding,
                quota_guarantee_name(role, resource),
                MetricSource::Gauge(PushGauge::new(amount)),
            )?;
            guarantees.insert(resource.to_string(), guarantee);

            let offered = self.pull(AllocatorQuery::QuotaAllocated {
                role: role.to_string(),
                resource: resource.to_string(),
            });
            let offered = Entry::register(
                &self.binding,
                quota_offered_or_allocated_name(role, resource),
                MetricSource::Pull(offered),
            )?;
            allocated.insert(resource.to_string(), offered);
        }
        Ok(())
    }

    /// Unregister all quota gauges of `role`, allocated and guarantee alike.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Precondition`] if the role has no quota
    /// gauges, or if the catalog no longer holds one of them.
    pub fn remove_quota(&mut self, role: &str) -> Result<(), RegistryError> {
        let Some(allocated) = self.quota_allocated.remove(role) else {
            return Err(self
                .binding
                .violation("remove_quota", format!("no quota registered for role {role}")));
        };
        let guarantees = self.quota_guarantee.remove(role).unwrap_or_default();

        debug!(
            target: "allocator.metrics.registry",
            role = %role,
            resources = allocated.len(),
            "Removing quota metrics"
        );

        unregister_entries(
            &self.binding,
            "remove_quota",
            allocated.values().chain(guarantees.values()),
        )
    }

    /// Register the offer-filter gauge for `role`.
    ///
    /// # Errors
    ///
    /// - [`RegistryError::Precondition`] if the role is already tracked.
    /// - [`RegistryError::Catalog`] if the name is rejected.
    pub fn add_role(&mut self, role: &str) -> Result<(), RegistryError> {
        if self.offer_filters_active.contains_key(role) {
            return Err(self
                .binding
                .violation("add_role", format!("role already tracked: {role}")));
        }

        let gauge = self.pull(AllocatorQuery::OfferFiltersActive {
            role: role.to_string(),
        });
        let entry = Entry::register(
            &self.binding,
            offer_filters_active_name(role),
            MetricSource::Pull(gauge),
        )?;
        self.offer_filters_active.insert(role.to_string(), entry);
        Ok(())
    }

    /// Unregister the offer-filter gauge for `role`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Precondition`] if the role is not tracked.
    pub fn remove_role(&mut self, role: &str) -> Result<(), RegistryError> {
        let Some(entry) = self.offer_filters_active.remove(role) else {
            return Err(self
                .binding
                .violation("remove_role", format!("role not tracked: {role}")));
        };
        self.binding
            .unregister("remove_role", &entry.name, entry.source.kind())
    }

    /// Record a completed allocation run.
    ///
    /// `latency` is the time the run request waited before it started.
    pub fn record_allocation_run(&self, duration: Duration, latency: Duration) {
        self.allocation_runs.increment();
        self.allocation_run.record(duration);
        self.allocation_run_latency.record(latency);
    }

    /// Number of completed allocation runs.
    #[must_use]
    pub fn allocation_runs(&self) -> u64 {
        self.allocation_runs.value()
    }

    /// Resource kinds with registered gauges, in registration order.
    #[must_use]
    pub fn resource_kinds(&self) -> &[String] {
        &self.resource_kinds
    }

    /// Whether `role` has quota gauges.
    #[must_use]
    pub fn has_quota(&self, role: &str) -> bool {
        self.quota_allocated.contains_key(role)
    }

    /// Whether `role` has an offer-filter gauge.
    #[must_use]
    pub fn has_role(&self, role: &str) -> bool {
        self.offer_filters_active.contains_key(role)
    }

    /// Guarantee recorded for `role` and `resource` at `set_quota` time.
    #[must_use]
    pub fn quota_guarantee(&self, role: &str, resource: &str) -> Option<f64> {
        match self.quota_guarantee.get(role)?.get(resource)?.source {
            MetricSource::Gauge(ref gauge) => Some(gauge.value()),
            _ => None,
        }
    }

    /// Every name currently registered by this registry.
    #[must_use]
    pub fn registered_names(&self) -> Vec<String> {
        self.entries().map(|entry| entry.name.clone()).collect()
    }

    fn entries(&self) -> impl Iterator<Item = &Entry> {
        let quota = self
            .quota_guarantee
            .values()
            .chain(self.quota_allocated.values())
            .flat_map(BTreeMap::values);

        self.fixed
            .iter()
            .chain(self.resources.iter())
            .chain(quota)
            .chain(self.offer_filters_active.values())
    }
}

impl Drop for AllocatorMetrics {
    fn drop(&mut self) {
        let count = self.entries().count();
        let _ = unregister_entries(&self.binding, "drop_allocator_metrics", self.entries());

        debug!(
            target: "allocator.metrics.registry",
            unregistered = count,
            "Allocator metrics unregistered"
        );
    }
}
