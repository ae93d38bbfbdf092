//! Pre-configured test data fixtures for allocator testing.
//!
//! Provides builders and test data for:
//! - Registry options with the `Report` violation policy
//! - Frameworks with fixed IDs and roles
//! - Quotas and resource quantities

use allocator_metrics::catalog::ViolationPolicy;
use allocator_metrics::registry::RegistryOptions;
use common::types::{FrameworkId, FrameworkInfo, Quota, ResourceQuantities};
use std::time::Duration;

/// Read timeout used by test registries. Short enough that timeout tests
/// stay fast under a paused clock.
pub const TEST_READ_TIMEOUT: Duration = Duration::from_millis(100);

/// Registry options that report violations instead of aborting.
#[must_use]
pub fn report_options() -> RegistryOptions {
    RegistryOptions {
        policy: ViolationPolicy::Report,
        read_timeout: TEST_READ_TIMEOUT,
        ..RegistryOptions::default()
    }
}

/// Owned resource kind list from string literals.
#[must_use]
pub fn resource_kinds(kinds: &[&str]) -> Vec<String> {
    kinds.iter().map(ToString::to_string).collect()
}

/// Resource quantities from `(name, amount)` pairs.
#[must_use]
pub fn resources(amounts: &[(&str, f64)]) -> ResourceQuantities {
    amounts.iter().map(|(name, amount)| (*name, *amount)).collect()
}

/// Quota guaranteeing the given amounts.
#[must_use]
pub fn quota(guarantee: &[(&str, f64)]) -> Quota {
    Quota::new(resources(guarantee))
}

/// Test framework fixture.
#[derive(Debug, Clone)]
pub struct TestFramework {
    /// Framework ID.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Subscribed roles.
    pub roles: Vec<String>,
}

impl TestFramework {
    /// Create a test framework with the given ID, named `test-framework`
    /// and subscribed to no roles.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: "test-framework".to_string(),
            roles: Vec::new(),
        }
    }

    /// Create a test framework with a random ID.
    #[must_use]
    pub fn random() -> Self {
        Self::new(FrameworkId::new().0)
    }

    /// Set the display name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Subscribe to a role.
    #[must_use]
    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.roles.push(role.into());
        self
    }

    /// Framework ID.
    #[must_use]
    pub fn framework_id(&self) -> FrameworkId {
        FrameworkId(self.id.clone())
    }

    /// Build the [`FrameworkInfo`].
    #[must_use]
    pub fn build(&self) -> FrameworkInfo {
        FrameworkInfo::new(self.framework_id(), self.name.clone(), self.roles.clone())
    }
}

/// Framework info with the given ID, name and roles.
#[must_use]
pub fn framework_info(id: &str, name: &str, roles: &[&str]) -> FrameworkInfo {
    roles
        .iter()
        .fold(TestFramework::new(id).with_name(name), |framework, role| {
            framework.with_role(*role)
        })
        .build()
}
