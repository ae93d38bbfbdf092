//! Common domain types for the allocator components.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for a framework registered with the allocator.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FrameworkId(pub String);

impl FrameworkId {
    /// Create a new random framework ID
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Returns the raw identifier.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for FrameworkId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for FrameworkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for FrameworkId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Identity and declared roles of a framework.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameworkInfo {
    /// Framework ID assigned at subscription.
    pub id: FrameworkId,
    /// Human-readable framework name (not unique).
    pub name: String,
    /// Roles the framework subscribes to.
    pub roles: BTreeSet<String>,
}

impl FrameworkInfo {
    /// Create a framework description from its parts.
    pub fn new<I, S>(id: FrameworkId, name: impl Into<String>, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            id,
            name: name.into(),
            roles: roles.into_iter().map(Into::into).collect(),
        }
    }
}

/// Unique identifier for an agent contributing resources.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AgentId(pub String);

impl From<&str> for AgentId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Scalar resource amounts keyed by resource name (`cpus`, `mem`, ...).
///
/// Amounts never go negative: subtraction saturates at zero and entries
/// that reach zero are dropped.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceQuantities(BTreeMap<String, f64>);

impl ResourceQuantities {
    /// Create an empty set of quantities.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Amount of the named resource, zero when absent.
    #[must_use]
    pub fn get(&self, name: &str) -> f64 {
        self.0.get(name).copied().unwrap_or(0.0)
    }

    /// Whether no resource has a non-zero amount.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over `(name, amount)` pairs in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.0.iter().map(|(name, amount)| (name.as_str(), *amount))
    }

    /// Add every amount in `other` to this set.
    pub fn add(&mut self, other: &ResourceQuantities) {
        for (name, amount) in other.iter() {
            *self.0.entry(name.to_string()).or_insert(0.0) += amount;
        }
        self.0.retain(|_, amount| *amount > 0.0);
    }

    /// Subtract every amount in `other` from this set, saturating at zero.
    pub fn subtract(&mut self, other: &ResourceQuantities) {
        for (name, amount) in other.iter() {
            if let Some(current) = self.0.get_mut(name) {
                *current = (*current - amount).max(0.0);
            }
        }
        self.0.retain(|_, amount| *amount > 0.0);
    }
}

impl<S: Into<String>> FromIterator<(S, f64)> for ResourceQuantities {
    fn from_iter<T: IntoIterator<Item = (S, f64)>>(iter: T) -> Self {
        let mut quantities = Self::new();
        for (name, amount) in iter {
            if amount > 0.0 {
                *quantities.0.entry(name.into()).or_insert(0.0) += amount;
            }
        }
        quantities
    }
}

/// Quota configured for a role.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Quota {
    /// Resources guaranteed to the role.
    pub guarantee: ResourceQuantities,
}

impl Quota {
    /// Create a quota from its guaranteed quantities.
    #[must_use]
    pub fn new(guarantee: ResourceQuantities) -> Self {
        Self { guarantee }
    }
}
