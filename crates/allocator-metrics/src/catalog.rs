//! Metrics catalog and the registries' binding to it.
//!
//! The catalog maps metric names to value sources. It holds registration
//! references only; the registry that registered a source owns its lifecycle
//! and must unregister it exactly once.
//!
//! [`InMemoryCatalog`] is the process catalog used by the service and by
//! tests. [`CatalogBinding`] is the thin adapter the registries use on top of
//! any [`MetricsCatalog`]: it turns catalog rejections into
//! [`RegistryError`]s, applies the [`ViolationPolicy`] and emits the
//! self-observability metrics.

use crate::errors::{CatalogError, RegistryError, SourceError};
use crate::gauge::MetricSource;
use crate::observability;
use common::metric_key::{is_safe_segment, PATH_DELIMITER};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::time::Instant;
use tracing::{debug, error, warn};

/// A catalog of named metric sources.
///
/// Implementations must be safe to share across threads; registries call
/// into them from the allocator task while exporters read concurrently.
pub trait MetricsCatalog: Send + Sync {
    /// Register `source` under `name`.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::DuplicateName`] if the name is already
    /// registered, or [`CatalogError::InvalidName`] if it is malformed.
    fn register(&self, name: &str, source: MetricSource) -> Result<(), CatalogError>;

    /// Remove the entry registered under `name`.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::NotFound`] if no entry is registered.
    fn unregister(&self, name: &str) -> Result<(), CatalogError>;
}

/// Checks that `name` is a slash-delimited path of safe segments.
///
/// # Errors
///
/// Returns [`CatalogError::InvalidName`] for an empty name, an empty
/// segment, or a segment with unsafe characters.
pub fn validate_name(name: &str) -> Result<(), CatalogError> {
    if name.is_empty() || !name.split(PATH_DELIMITER).all(is_safe_segment) {
        return Err(CatalogError::InvalidName(name.to_string()));
    }
    Ok(())
}

/// Values resolved from every catalog entry at one point in time.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Snapshot {
    /// Resolved values keyed by exported name.
    pub values: BTreeMap<String, f64>,
    /// Entries whose source could not produce a value, with the reason.
    /// These are omitted from `values`.
    pub unavailable: BTreeMap<String, String>,
}

impl Snapshot {
    /// Value exported under `name`, if it resolved.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<f64> {
        self.values.get(name).copied()
    }

    /// Render the resolved values as a JSON object.
    ///
    /// NaN and infinite values are written as `null`.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.values)
    }
}

/// In-memory catalog guarded by a mutex.
#[derive(Debug, Default)]
pub struct InMemoryCatalog {
    entries: Mutex<BTreeMap<String, MetricSource>>,
}

impl InMemoryCatalog {
    /// Create a new shared, empty catalog.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn entries(&self) -> MutexGuard<'_, BTreeMap<String, MetricSource>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of registered entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries().len()
    }

    /// Whether the catalog holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    /// Whether `name` is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.entries().contains_key(name)
    }

    /// All registered names in lexical order.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.entries().keys().cloned().collect()
    }

    /// Registered names starting with `prefix`.
    #[must_use]
    pub fn names_with_prefix(&self, prefix: &str) -> Vec<String> {
        self.entries()
            .range(prefix.to_string()..)
            .take_while(|(name, _)| name.starts_with(prefix))
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Source registered under `name`.
    #[must_use]
    pub fn source(&self, name: &str) -> Option<MetricSource> {
        self.entries().get(name).cloned()
    }

    /// Read the current value of a single entry.
    ///
    /// Timers read as their most recent sample. Returns `None` if `name` is
    /// not registered or a timer has no samples in its window.
    pub async fn read(&self, name: &str) -> Option<Result<f64, SourceError>> {
        let source = self.source(name)?;
        match source {
            #[allow(clippy::cast_precision_loss)]
            MetricSource::Counter(counter) => Some(Ok(counter.value() as f64)),
            MetricSource::Gauge(gauge) => Some(Ok(gauge.value())),
            MetricSource::Pull(gauge) => Some(gauge.read().await),
            MetricSource::Timer(timer) => timer.statistics().map(|stats| Ok(stats.last_ms)),
        }
    }

    /// Resolve every entry.
    ///
    /// The entry map is cloned under the lock and resolved without it, so
    /// registrations are never blocked behind a slow pull read. Pull reads
    /// run concurrently; each is bounded by its own timeout. Timers expand to
    /// `{name}_ms` plus `{name}_ms/{count,min_ms,max_ms,p50,p90,p99}`.
    pub async fn snapshot(&self) -> Snapshot {
        let started = Instant::now();
        let entries: Vec<(String, MetricSource)> = self
            .entries()
            .iter()
            .map(|(name, source)| (name.clone(), source.clone()))
            .collect();

        let mut snapshot = Snapshot::default();
        let mut pulls = Vec::new();

        for (name, source) in entries {
            match source {
                #[allow(clippy::cast_precision_loss)]
                MetricSource::Counter(counter) => {
                    snapshot.values.insert(name, counter.value() as f64);
                }
                MetricSource::Gauge(gauge) => {
                    snapshot.values.insert(name, gauge.value());
                }
                MetricSource::Timer(timer) => {
                    if let Some(stats) = timer.statistics() {
                        #[allow(clippy::cast_precision_loss)]
                        let count = stats.count as f64;
                        let base = format!("{name}_ms");
                        snapshot.values.insert(format!("{base}/count"), count);
                        snapshot.values.insert(format!("{base}/min_ms"), stats.min_ms);
                        snapshot.values.insert(format!("{base}/max_ms"), stats.max_ms);
                        snapshot.values.insert(format!("{base}/p50"), stats.p50_ms);
                        snapshot.values.insert(format!("{base}/p90"), stats.p90_ms);
                        snapshot.values.insert(format!("{base}/p99"), stats.p99_ms);
                        snapshot.values.insert(base, stats.last_ms);
                    }
                }
                MetricSource::Pull(gauge) => {
                    pulls.push(async move { (name, gauge.read().await) });
                }
            }
        }

        for (name, result) in futures::future::join_all(pulls).await {
            match result {
                Ok(value) => {
                    snapshot.values.insert(name, value);
                }
                Err(e) => {
                    debug!(
                        target: "allocator.metrics.catalog",
                        metric = %name,
                        error = %e,
                        "Omitting unavailable metric from snapshot"
                    );
                    snapshot.unavailable.insert(name, e.to_string());
                }
            }
        }

        observability::record_snapshot(started.elapsed(), snapshot.unavailable.len());
        snapshot
    }
}

impl MetricsCatalog for InMemoryCatalog {
    fn register(&self, name: &str, source: MetricSource) -> Result<(), CatalogError> {
        validate_name(name)?;

        let mut entries = self.entries();
        if entries.contains_key(name) {
            return Err(CatalogError::DuplicateName(name.to_string()));
        }
        entries.insert(name.to_string(), source);
        observability::set_catalog_entries(entries.len());
        Ok(())
    }

    fn unregister(&self, name: &str) -> Result<(), CatalogError> {
        let mut entries = self.entries();
        if entries.remove(name).is_none() {
            return Err(CatalogError::NotFound(name.to_string()));
        }
        observability::set_catalog_entries(entries.len());
        Ok(())
    }
}

/// What a registry does when a lifecycle precondition is broken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ViolationPolicy {
    /// Log the violation and abort the process. Production default: a
    /// lifecycle bug must never be masked.
    #[default]
    Abort,
    /// Return [`RegistryError::Precondition`] to the caller. Used by tests.
    Report,
}

impl ViolationPolicy {
    /// Returns the policy name as used in configuration.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            ViolationPolicy::Abort => "abort",
            ViolationPolicy::Report => "report",
        }
    }
}

/// Registry-side adapter over a [`MetricsCatalog`].
#[derive(Clone)]
pub struct CatalogBinding {
    catalog: Arc<dyn MetricsCatalog>,
    policy: ViolationPolicy,
}

impl std::fmt::Debug for CatalogBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CatalogBinding")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl CatalogBinding {
    /// Bind to `catalog` with the given violation policy.
    #[must_use]
    pub fn new(catalog: Arc<dyn MetricsCatalog>, policy: ViolationPolicy) -> Self {
        Self { catalog, policy }
    }

    /// Violation policy in effect.
    #[must_use]
    pub fn policy(&self) -> ViolationPolicy {
        self.policy
    }

    /// Register a source.
    ///
    /// A catalog rejection is a configuration error (typically two raw keys
    /// normalizing to the same name) and is returned as
    /// [`RegistryError::Catalog`]; it is never treated as fatal.
    pub fn register(&self, name: &str, source: MetricSource) -> Result<(), RegistryError> {
        let kind = source.kind();
        match self.catalog.register(name, source) {
            Ok(()) => {
                observability::record_registration(kind);
                Ok(())
            }
            Err(e) => {
                warn!(
                    target: "allocator.metrics.catalog",
                    metric = %name,
                    error = %e,
                    "Catalog rejected metric registration"
                );
                observability::record_registration_rejected(e.error_type_label());
                Err(RegistryError::Catalog(e))
            }
        }
    }

    /// Unregister a name the registry believes it owns.
    ///
    /// The catalog not holding the name means the registry's bookkeeping is
    /// wrong, so this is a precondition violation.
    pub fn unregister(
        &self,
        operation: &'static str,
        name: &str,
        kind: &'static str,
    ) -> Result<(), RegistryError> {
        match self.catalog.unregister(name) {
            Ok(()) => {
                observability::record_unregistration(kind);
                Ok(())
            }
            Err(e) => Err(self.violation(operation, e.to_string())),
        }
    }

    /// Unregister every name, continuing past failures.
    ///
    /// Used by teardown and rollback, where every remaining entry must still
    /// be attempted. Returns the first failure.
    pub fn unregister_all<'a, I>(&self, operation: &'static str, entries: I) -> Result<(), RegistryError>
    where
        I: IntoIterator<Item = (&'a str, &'static str)>,
    {
        let mut first_error = None;
        for (name, kind) in entries {
            if let Err(e) = self.unregister(operation, name, kind) {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Build a precondition violation and apply the policy.
    ///
    /// Under [`ViolationPolicy::Abort`] this does not return.
    pub fn violation(&self, operation: &'static str, detail: String) -> RegistryError {
        observability::record_precondition_violation(operation);
        error!(
            target: "allocator.metrics.registry",
            operation,
            detail = %detail,
            policy = self.policy.as_str(),
            "Metrics lifecycle precondition violated"
        );

        if self.policy == ViolationPolicy::Abort {
            std::process::abort();
        }

        RegistryError::Precondition { operation, detail }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::gauge::{Counter, PullGauge, PushGauge, Timer};
    use futures::FutureExt;
    use std::time::Duration;

    fn report_binding(catalog: &Arc<InMemoryCatalog>) -> CatalogBinding {
        CatalogBinding::new(catalog.clone(), ViolationPolicy::Report)
    }

    #[test]
    fn test_validate_name() {
        assert!(validate_name("allocator/mesos/allocation_runs").is_ok());
        assert!(validate_name("master/frameworks/spark/fw-1/roles/r%2F1/suppressed").is_ok());

        for bad in ["", "a//b", "/a", "a/", "a/ b", "a/../b", "a/./b"] {
            assert_eq!(
                validate_name(bad),
                Err(CatalogError::InvalidName(bad.to_string())),
                "expected {bad:?} to be rejected"
            );
        }
    }

    #[test]
    fn test_register_and_unregister() {
        let catalog = InMemoryCatalog::new();
        catalog
            .register("a/b", MetricSource::Counter(Counter::new()))
            .unwrap();
        assert!(catalog.contains("a/b"));
        assert_eq!(catalog.len(), 1);

        catalog.unregister("a/b").unwrap();
        assert!(catalog.is_empty());
    }

    #[test]
    fn test_register_duplicate_rejected() {
        let catalog = InMemoryCatalog::new();
        catalog
            .register("a/b", MetricSource::Counter(Counter::new()))
            .unwrap();
        assert_eq!(
            catalog.register("a/b", MetricSource::Gauge(PushGauge::new(0.0))),
            Err(CatalogError::DuplicateName("a/b".to_string()))
        );
        assert_eq!(catalog.len(), 1);
    }

    #[test]
    fn test_unregister_missing_rejected() {
        let catalog = InMemoryCatalog::new();
        assert_eq!(
            catalog.unregister("a/b"),
            Err(CatalogError::NotFound("a/b".to_string()))
        );
    }

    #[test]
    fn test_names_with_prefix() {
        let catalog = InMemoryCatalog::new();
        for name in ["a/x", "a/y", "ab/z", "b/x"] {
            catalog
                .register(name, MetricSource::Counter(Counter::new()))
                .unwrap();
        }
        assert_eq!(catalog.names_with_prefix("a/"), vec!["a/x", "a/y"]);
        assert_eq!(catalog.names_with_prefix("c/"), Vec::<String>::new());
    }

    #[tokio::test]
    async fn test_snapshot_resolves_all_sources() {
        let catalog = InMemoryCatalog::new();
        let counter = Counter::new();
        counter.increment();
        let timer = Timer::new(Duration::from_secs(3600));
        timer.record(Duration::from_millis(20));

        catalog
            .register("fixed/counter", MetricSource::Counter(counter))
            .unwrap();
        catalog
            .register("fixed/gauge", MetricSource::Gauge(PushGauge::new(4.0)))
            .unwrap();
        catalog
            .register("fixed/run", MetricSource::Timer(timer))
            .unwrap();
        catalog
            .register(
                "dynamic/pull",
                MetricSource::Pull(PullGauge::new(Duration::from_secs(1), || {
                    async { Ok::<f64, SourceError>(9.0) }.boxed()
                })),
            )
            .unwrap();

        let snapshot = catalog.snapshot().await;
        assert_eq!(snapshot.get("fixed/counter"), Some(1.0));
        assert_eq!(snapshot.get("fixed/gauge"), Some(4.0));
        assert_eq!(snapshot.get("dynamic/pull"), Some(9.0));
        assert_eq!(snapshot.get("fixed/run_ms/count"), Some(1.0));
        assert!(snapshot.get("fixed/run_ms").is_some());
        assert!(snapshot.unavailable.is_empty());
    }

    #[tokio::test]
    async fn test_snapshot_omits_failed_pulls() {
        let catalog = InMemoryCatalog::new();
        catalog
            .register(
                "dynamic/broken",
                MetricSource::Pull(PullGauge::new(Duration::from_secs(1), || {
                    async { Err::<f64, SourceError>(SourceError::Unavailable) }.boxed()
                })),
            )
            .unwrap();

        let snapshot = catalog.snapshot().await;
        assert!(snapshot.get("dynamic/broken").is_none());
        assert!(snapshot.unavailable.contains_key("dynamic/broken"));
        assert_eq!(snapshot.to_json().unwrap(), "{}");
    }

    #[test]
    fn test_snapshot_json_writes_non_finite_as_null() {
        let mut snapshot = Snapshot::default();
        snapshot.values.insert("a".to_string(), 1.5);
        snapshot.values.insert("b".to_string(), f64::NAN);
        snapshot.values.insert("c".to_string(), f64::INFINITY);

        assert_eq!(snapshot.to_json().unwrap(), r#"{"a":1.5,"b":null,"c":null}"#);
    }

    #[tokio::test]
    async fn test_read_single_entry() {
        let catalog = InMemoryCatalog::new();
        catalog
            .register("fixed/gauge", MetricSource::Gauge(PushGauge::new(2.5)))
            .unwrap();

        assert_eq!(catalog.read("fixed/gauge").await, Some(Ok(2.5)));
        assert_eq!(catalog.read("missing").await, None);
    }

    #[test]
    fn test_binding_register_rejection_is_not_precondition() {
        let catalog = InMemoryCatalog::new();
        let binding = report_binding(&catalog);
        binding
            .register("a/b", MetricSource::Counter(Counter::new()))
            .unwrap();

        let err = binding
            .register("a/b", MetricSource::Counter(Counter::new()))
            .unwrap_err();
        assert!(!err.is_precondition());
        assert_eq!(
            err,
            RegistryError::Catalog(CatalogError::DuplicateName("a/b".to_string()))
        );
    }

    #[test]
    fn test_binding_unregister_missing_is_precondition() {
        let catalog = InMemoryCatalog::new();
        let binding = report_binding(&catalog);

        let err = binding.unregister("remove_role", "a/b", "pull_gauge").unwrap_err();
        assert!(err.is_precondition());
    }

    #[test]
    fn test_binding_unregister_all_continues_past_errors() {
        let catalog = InMemoryCatalog::new();
        let binding = report_binding(&catalog);
        binding
            .register("a/x", MetricSource::Counter(Counter::new()))
            .unwrap();
        binding
            .register("a/z", MetricSource::Counter(Counter::new()))
            .unwrap();

        let result = binding.unregister_all(
            "drop",
            [("a/x", "counter"), ("a/y", "counter"), ("a/z", "counter")],
        );
        assert!(result.unwrap_err().is_precondition());
        assert!(catalog.is_empty());
    }

    #[test]
    fn test_violation_policy_default_is_abort() {
        assert_eq!(ViolationPolicy::default(), ViolationPolicy::Abort);
        assert_eq!(ViolationPolicy::Abort.as_str(), "abort");
        assert_eq!(ViolationPolicy::Report.as_str(), "report");
    }
}
