//! Per-framework metrics registry.
//!
//! Every name starts with the framework prefix
//! `master/frameworks/{name}/{id}/`, both segments normalized. The id makes
//! the prefix unique, so two frameworks with the same name never collide.

use super::{unregister_entries, Entry, RegistryOptions};
use crate::catalog::{CatalogBinding, MetricsCatalog};
use crate::errors::RegistryError;
use crate::gauge::{Counter, MetricSource, PushGauge};
use common::metric_key::normalize;
use common::types::{FrameworkId, FrameworkInfo};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Why resources were withheld from a framework during allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterReason {
    /// An offer filter installed when the framework declined an offer.
    Decline,
    /// GPU resources withheld from a framework without the GPU capability.
    GpuResources,
    /// Resources in a remote region withheld from a region-unaware framework.
    RegionAware,
    /// Refined reservations withheld from a framework without the capability.
    ReservationRefinement,
    /// Revocable resources withheld from a framework that did not opt in.
    RevocableResources,
}

impl FilterReason {
    pub const ALL: [FilterReason; 5] = [
        FilterReason::Decline,
        FilterReason::GpuResources,
        FilterReason::RegionAware,
        FilterReason::ReservationRefinement,
        FilterReason::RevocableResources,
    ];

    /// Path segment appended to the aggregate counter name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            FilterReason::Decline => "decline",
            FilterReason::GpuResources => "gpu_resources",
            FilterReason::RegionAware => "region_aware",
            FilterReason::ReservationRefinement => "reservation_refinement",
            FilterReason::RevocableResources => "revocable_resources",
        }
    }
}

/// Prefix shared by every metric of a framework.
#[must_use]
pub fn metric_prefix(info: &FrameworkInfo) -> String {
    format!(
        "master/frameworks/{}/{}/",
        normalize(&info.name),
        normalize(info.id.as_str())
    )
}

#[must_use]
pub fn resources_filtered_name(prefix: &str) -> String {
    format!("{prefix}allocation/resources_filtered")
}

#[must_use]
pub fn resources_filtered_reason_name(prefix: &str, reason: FilterReason) -> String {
    format!("{prefix}allocation/resources_filtered/{}", reason.as_str())
}

#[must_use]
pub fn drf_position_min_name(prefix: &str, role: &str) -> String {
    format!(
        "{prefix}allocation/roles/{}/latest_position/min",
        normalize(role)
    )
}

#[must_use]
pub fn drf_position_max_name(prefix: &str, role: &str) -> String {
    format!(
        "{prefix}allocation/roles/{}/latest_position/max",
        normalize(role)
    )
}

#[must_use]
pub fn suppressed_name(prefix: &str, role: &str) -> String {
    format!("{prefix}roles/{}/suppressed", normalize(role))
}

struct DrfPositions {
    min: Entry,
    max: Entry,
}

impl DrfPositions {
    fn set(&self, (min, max): (f64, f64)) {
        for (entry, value) in [(&self.min, min), (&self.max, max)] {
            if let MetricSource::Gauge(gauge) = &entry.source {
                gauge.set(value);
            }
        }
    }

    fn entries(&self) -> [&Entry; 2] {
        [&self.min, &self.max]
    }
}

struct Suppression {
    entry: Entry,
    gauge: Arc<PushGauge>,
}

/// Metrics of a single framework.
pub struct FrameworkMetrics {
    binding: CatalogBinding,
    framework_id: FrameworkId,
    prefix: String,

    resources_filtered: Arc<Counter>,
    reason_counters: HashMap<FilterReason, Arc<Counter>>,
    counters: Vec<Entry>,

    drf_positions: HashMap<String, DrfPositions>,
    suppressed: HashMap<String, Suppression>,
}

impl std::fmt::Debug for FrameworkMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameworkMetrics")
            .field("framework_id", &self.framework_id)
            .field("prefix", &self.prefix)
            .field("drf_roles", &self.drf_positions.len())
            .field("suppression_roles", &self.suppressed.len())
            .finish_non_exhaustive()
    }
}

impl FrameworkMetrics {
    /// Create the registry, register the filtered-resource counters and
    /// revive every role the framework declares.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Catalog`] if a name is rejected. Entries
    /// registered before the failure are unregistered.
    pub fn new(
        catalog: Arc<dyn MetricsCatalog>,
        info: &FrameworkInfo,
        options: RegistryOptions,
    ) -> Result<Self, RegistryError> {
        let prefix = metric_prefix(info);
        let mut metrics = Self {
            binding: CatalogBinding::new(catalog, options.policy),
            framework_id: info.id.clone(),
            resources_filtered: Counter::new(),
            reason_counters: HashMap::new(),
            counters: Vec::with_capacity(FilterReason::ALL.len() + 1),
            drf_positions: HashMap::new(),
            suppressed: HashMap::new(),
            prefix,
        };

        let aggregate = Entry::register(
            &metrics.binding,
            resources_filtered_name(&metrics.prefix),
            MetricSource::Counter(Arc::clone(&metrics.resources_filtered)),
        )?;
        metrics.counters.push(aggregate);

        for reason in FilterReason::ALL {
            let counter = Counter::new();
            let entry = Entry::register(
                &metrics.binding,
                resources_filtered_reason_name(&metrics.prefix, reason),
                MetricSource::Counter(Arc::clone(&counter)),
            )?;
            metrics.counters.push(entry);
            metrics.reason_counters.insert(reason, counter);
        }

        for role in &info.roles {
            metrics.revive_role(role)?;
        }

        debug!(
            target: "allocator.metrics.registry",
            framework_id = %metrics.framework_id,
            roles = info.roles.len(),
            "Framework metrics registered"
        );

        Ok(metrics)
    }

    /// Framework this registry belongs to.
    #[must_use]
    pub fn framework_id(&self) -> &FrameworkId {
        &self.framework_id
    }

    /// Prefix shared by every name of this registry.
    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Publish the framework's DRF position range within `role`.
    ///
    /// The pair is registered on the first call for a role and updated in
    /// place afterwards.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Catalog`] if the first registration is
    /// rejected; nothing is left registered for the role in that case.
    pub fn set_drf_positions(&mut self, role: &str, positions: (f64, f64)) -> Result<(), RegistryError> {
        if let Some(existing) = self.drf_positions.get(role) {
            existing.set(positions);
            return Ok(());
        }

        let min = Entry::register(
            &self.binding,
            drf_position_min_name(&self.prefix, role),
            MetricSource::Gauge(PushGauge::new(positions.0)),
        )?;
        let max = match Entry::register(
            &self.binding,
            drf_position_max_name(&self.prefix, role),
            MetricSource::Gauge(PushGauge::new(positions.1)),
        ) {
            Ok(max) => max,
            Err(e) => {
                let _ = unregister_entries(&self.binding, "set_drf_positions_rollback", [&min]);
                return Err(e);
            }
        };

        self.drf_positions
            .insert(role.to_string(), DrfPositions { min, max });
        Ok(())
    }

    /// Unregister the DRF position pair of `role`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Precondition`] if the role has no pair.
    pub fn remove_drf_positions(&mut self, role: &str) -> Result<(), RegistryError> {
        let Some(positions) = self.drf_positions.remove(role) else {
            return Err(self.binding.violation(
                "remove_drf_positions",
                format!("no DRF positions for role {role} of framework {}", self.framework_id),
            ));
        };
        unregister_entries(&self.binding, "remove_drf_positions", positions.entries())
    }

    /// Mark `role` as not suppressed, creating the gauge if needed.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Catalog`] if the gauge cannot be registered.
    pub fn revive_role(&mut self, role: &str) -> Result<(), RegistryError> {
        self.suppression_gauge(role)?.set(0.0);
        Ok(())
    }

    /// Mark `role` as suppressed, creating the gauge if needed.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Catalog`] if the gauge cannot be registered.
    pub fn suppress_role(&mut self, role: &str) -> Result<(), RegistryError> {
        self.suppression_gauge(role)?.set(1.0);
        Ok(())
    }

    fn suppression_gauge(&mut self, role: &str) -> Result<Arc<PushGauge>, RegistryError> {
        if let Some(existing) = self.suppressed.get(role) {
            return Ok(Arc::clone(&existing.gauge));
        }

        let gauge = Arc::new(PushGauge::default());
        let entry = Entry::register(
            &self.binding,
            suppressed_name(&self.prefix, role),
            MetricSource::Gauge(Arc::clone(&gauge)),
        )?;
        self.suppressed.insert(
            role.to_string(),
            Suppression {
                entry,
                gauge: Arc::clone(&gauge),
            },
        );
        Ok(gauge)
    }

    /// Unregister the suppression gauge of `role`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Precondition`] if the role has no gauge.
    pub fn remove_suppressed_role(&mut self, role: &str) -> Result<(), RegistryError> {
        let Some(suppression) = self.suppressed.remove(role) else {
            return Err(self.binding.violation(
                "remove_suppressed_role",
                format!("no suppression gauge for role {role} of framework {}", self.framework_id),
            ));
        };
        self.binding.unregister(
            "remove_suppressed_role",
            &suppression.entry.name,
            suppression.entry.source.kind(),
        )
    }

    /// Count one filtering event, in the aggregate and per reason.
    pub fn increment_resources_filtered(&self, reason: FilterReason) {
        self.resources_filtered.increment();
        if let Some(counter) = self.reason_counters.get(&reason) {
            counter.increment();
        }
    }

    /// Total filtering events across all reasons.
    #[must_use]
    pub fn resources_filtered(&self) -> u64 {
        self.resources_filtered.value()
    }

    /// Filtering events recorded for `reason`.
    #[must_use]
    pub fn resources_filtered_by(&self, reason: FilterReason) -> u64 {
        self.reason_counters
            .get(&reason)
            .map_or(0, |counter| counter.value())
    }

    /// Current suppression value of `role`: 1 suppressed, 0 revived.
    #[must_use]
    pub fn suppression(&self, role: &str) -> Option<f64> {
        self.suppressed.get(role).map(|s| s.gauge.value())
    }

    /// Whether `role` has a DRF position pair.
    #[must_use]
    pub fn has_drf_positions(&self, role: &str) -> bool {
        self.drf_positions.contains_key(role)
    }

    /// Every name currently registered by this registry.
    #[must_use]
    pub fn registered_names(&self) -> Vec<String> {
        self.entries().map(|entry| entry.name.clone()).collect()
    }

    fn entries(&self) -> impl Iterator<Item = &Entry> {
        self.counters
            .iter()
            .chain(self.drf_positions.values().flat_map(DrfPositions::entries))
            .chain(self.suppressed.values().map(|s| &s.entry))
    }
}

impl Drop for FrameworkMetrics {
    fn drop(&mut self) {
        let _ = unregister_entries(&self.binding, "drop_framework_metrics", self.entries());
        debug!(
            target: "allocator.metrics.registry",
            framework_id = %self.framework_id,
            "Framework metrics unregistered"
        );
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::catalog::{InMemoryCatalog, ViolationPolicy};

    fn options() -> RegistryOptions {
        RegistryOptions {
            policy: ViolationPolicy::Report,
            ..RegistryOptions::default()
        }
    }

    fn info(roles: &[&str]) -> FrameworkInfo {
        FrameworkInfo::new(FrameworkId::from("fw-1"), "spark", roles.iter().copied())
    }

    fn registry(catalog: &Arc<InMemoryCatalog>, roles: &[&str]) -> FrameworkMetrics {
        FrameworkMetrics::new(catalog.clone(), &info(roles), options()).unwrap()
    }

    #[test]
    fn test_prefix_is_normalized() {
        let info = FrameworkInfo::new(FrameworkId::from("id/1"), "my app", ["r"]);
        assert_eq!(metric_prefix(&info), "master/frameworks/my%20app/id%2F1/");
    }

    #[test]
    fn test_construction_registers_counters_and_revives_roles() {
        let catalog = InMemoryCatalog::new();
        let metrics = registry(&catalog, &["r1", "r2"]);

        assert_eq!(catalog.len(), 6 + 2);
        assert_eq!(metrics.suppression("r1"), Some(0.0));
        assert_eq!(metrics.suppression("r2"), Some(0.0));
        assert!(catalog.contains("master/frameworks/spark/fw-1/allocation/resources_filtered"));
        assert!(catalog.contains(
            "master/frameworks/spark/fw-1/allocation/resources_filtered/reservation_refinement"
        ));
        assert!(catalog.contains("master/frameworks/spark/fw-1/roles/r2/suppressed"));
    }

    #[test]
    fn test_suppression_gauge_tracks_latest_call() {
        let catalog = InMemoryCatalog::new();
        let mut metrics = registry(&catalog, &[]);

        metrics.suppress_role("r1").unwrap();
        metrics.suppress_role("r1").unwrap();
        assert_eq!(metrics.suppression("r1"), Some(1.0));
        metrics.revive_role("r1").unwrap();
        assert_eq!(metrics.suppression("r1"), Some(0.0));
        metrics.suppress_role("r1").unwrap();
        assert_eq!(metrics.suppression("r1"), Some(1.0));

        let prefix = format!("{}roles/", metrics.prefix());
        assert_eq!(catalog.names_with_prefix(&prefix).len(), 1);
    }

    #[test]
    fn test_remove_suppressed_role() {
        let catalog = InMemoryCatalog::new();
        let mut metrics = registry(&catalog, &["r1"]);

        metrics.remove_suppressed_role("r1").unwrap();
        assert!(metrics.suppression("r1").is_none());
        assert!(!catalog.contains(&suppressed_name(metrics.prefix(), "r1")));

        let err = metrics.remove_suppressed_role("r1").unwrap_err();
        assert!(err.is_precondition());
    }

    #[tokio::test]
    async fn test_drf_positions_register_once_and_update() {
        let catalog = InMemoryCatalog::new();
        let mut metrics = registry(&catalog, &["r1"]);
        let min = drf_position_min_name(metrics.prefix(), "r1");
        let max = drf_position_max_name(metrics.prefix(), "r1");

        metrics.set_drf_positions("r1", (1.0, 2.0)).unwrap();
        metrics.set_drf_positions("r1", (0.0, 0.0)).unwrap();

        assert_eq!(catalog.len(), 6 + 1 + 2);
        assert_eq!(catalog.read(&min).await, Some(Ok(0.0)));
        assert_eq!(catalog.read(&max).await, Some(Ok(0.0)));
    }

    #[test]
    fn test_remove_drf_positions() {
        let catalog = InMemoryCatalog::new();
        let mut metrics = registry(&catalog, &[]);
        metrics.set_drf_positions("r1", (0.0, 1.0)).unwrap();

        metrics.remove_drf_positions("r1").unwrap();
        assert!(!metrics.has_drf_positions("r1"));
        assert_eq!(catalog.len(), 6);

        assert!(metrics.remove_drf_positions("r1").unwrap_err().is_precondition());
    }

    #[test]
    fn test_drf_positions_collision_rolls_back_min() {
        let catalog = InMemoryCatalog::new();
        let mut metrics = registry(&catalog, &[]);
        catalog
            .register(
                &drf_position_max_name(metrics.prefix(), "r1"),
                MetricSource::Gauge(PushGauge::new(0.0)),
            )
            .unwrap();

        let err = metrics.set_drf_positions("r1", (0.0, 1.0)).unwrap_err();
        assert!(matches!(err, RegistryError::Catalog(_)));
        assert!(!catalog.contains(&drf_position_min_name(metrics.prefix(), "r1")));
        assert!(!metrics.has_drf_positions("r1"));
    }

    #[test]
    fn test_increment_resources_filtered() {
        let catalog = InMemoryCatalog::new();
        let metrics = registry(&catalog, &[]);

        metrics.increment_resources_filtered(FilterReason::Decline);
        metrics.increment_resources_filtered(FilterReason::Decline);
        metrics.increment_resources_filtered(FilterReason::GpuResources);

        assert_eq!(metrics.resources_filtered(), 3);
        assert_eq!(metrics.resources_filtered_by(FilterReason::Decline), 2);
        assert_eq!(metrics.resources_filtered_by(FilterReason::GpuResources), 1);
        assert_eq!(metrics.resources_filtered_by(FilterReason::RegionAware), 0);
    }

    #[test]
    fn test_same_name_different_id_does_not_collide() {
        let catalog = InMemoryCatalog::new();
        let a = FrameworkInfo::new(FrameworkId::from("a"), "spark", ["r1"]);
        let b = FrameworkInfo::new(FrameworkId::from("b"), "spark", ["r1"]);

        let _a = FrameworkMetrics::new(catalog.clone(), &a, options()).unwrap();
        let _b = FrameworkMetrics::new(catalog.clone(), &b, options()).unwrap();
        assert_eq!(catalog.len(), 2 * (6 + 1));
    }

    #[test]
    fn test_duplicate_framework_rolls_back() {
        let catalog = InMemoryCatalog::new();
        let _first = registry(&catalog, &["r1"]);
        let before = catalog.len();

        let second = FrameworkMetrics::new(catalog.clone(), &info(&["r1"]), options());
        assert!(matches!(second, Err(RegistryError::Catalog(_))));
        assert_eq!(catalog.len(), before);
    }

    #[test]
    fn test_drop_unregisters_everything() {
        let catalog = InMemoryCatalog::new();
        {
            let mut metrics = registry(&catalog, &["r1", "r2"]);
            metrics.suppress_role("r3").unwrap();
            metrics.set_drf_positions("r1", (0.0, 0.0)).unwrap();
            metrics.set_drf_positions("r2", (1.0, 1.0)).unwrap();
            metrics.remove_drf_positions("r2").unwrap();
            metrics.remove_suppressed_role("r2").unwrap();
        }
        assert!(catalog.is_empty(), "residual entries: {:?}", catalog.names());
    }
}
