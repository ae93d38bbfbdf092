//! Catalog that records every call made to it.
//!
//! Wraps an [`InMemoryCatalog`] so tests can assert on the exact sequence of
//! registrations and unregistrations a registry performed, and inject
//! rejections for chosen names.

use allocator_metrics::catalog::{InMemoryCatalog, MetricsCatalog};
use allocator_metrics::errors::CatalogError;
use allocator_metrics::gauge::MetricSource;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

/// A single call observed by [`RecordingCatalog`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogEvent {
    /// Successful registration.
    Registered(String),
    /// Successful unregistration.
    Unregistered(String),
    /// Registration rejected by the catalog.
    Rejected(String),
}

/// Recording wrapper around [`InMemoryCatalog`].
#[derive(Debug)]
pub struct RecordingCatalog {
    catalog: Arc<InMemoryCatalog>,
    events: Mutex<Vec<CatalogEvent>>,
    rejected: Mutex<HashSet<String>>,
}

impl RecordingCatalog {
    /// Create an empty recording catalog.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            catalog: InMemoryCatalog::new(),
            events: Mutex::new(Vec::new()),
            rejected: Mutex::new(HashSet::new()),
        })
    }

    /// Reject any registration of `name` with [`CatalogError::DuplicateName`].
    #[must_use]
    pub fn with_rejected_name(self: Arc<Self>, name: &str) -> Arc<Self> {
        self.rejected.lock().unwrap().insert(name.to_string());
        self
    }

    /// The wrapped catalog, for reads and snapshots.
    #[must_use]
    pub fn inner(&self) -> &Arc<InMemoryCatalog> {
        &self.catalog
    }

    /// Every call observed so far, in order.
    #[must_use]
    pub fn events(&self) -> Vec<CatalogEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Names registered so far, in registration order.
    #[must_use]
    pub fn registered(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                CatalogEvent::Registered(name) => Some(name),
                _ => None,
            })
            .collect()
    }

    /// Names unregistered so far, in unregistration order.
    #[must_use]
    pub fn unregistered(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                CatalogEvent::Unregistered(name) => Some(name),
                _ => None,
            })
            .collect()
    }
}

impl MetricsCatalog for RecordingCatalog {
    fn register(&self, name: &str, source: MetricSource) -> Result<(), CatalogError> {
        if self.rejected.lock().unwrap().contains(name) {
            self.events
                .lock()
                .unwrap()
                .push(CatalogEvent::Rejected(name.to_string()));
            return Err(CatalogError::DuplicateName(name.to_string()));
        }

        let result = self.catalog.register(name, source);
        let event = match &result {
            Ok(()) => CatalogEvent::Registered(name.to_string()),
            Err(_) => CatalogEvent::Rejected(name.to_string()),
        };
        self.events.lock().unwrap().push(event);
        result
    }

    fn unregister(&self, name: &str) -> Result<(), CatalogError> {
        self.catalog.unregister(name)?;
        self.events
            .lock()
            .unwrap()
            .push(CatalogEvent::Unregistered(name.to_string()));
        Ok(())
    }
}
