//! Allocator metrics error types.
//!
//! Errors are split by who is at fault:
//!
//! - [`CatalogError`]: the catalog rejected a register/unregister call.
//! - [`SourceError`]: a pull gauge could not produce a value. Always
//!   recoverable; the exporting side omits the metric for that read.
//! - [`RegistryError`]: a registry operation failed, either because the caller
//!   broke a lifecycle precondition or because the catalog rejected a name.
//! - [`AllocatorError`]: errors returned to callers of the allocator actor.

use std::time::Duration;
use thiserror::Error;

/// Errors returned by a metrics catalog.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CatalogError {
    /// A metric with this name is already registered.
    #[error("Metric already registered: {0}")]
    DuplicateName(String),

    /// No metric with this name is registered.
    #[error("Metric not registered: {0}")]
    NotFound(String),

    /// The name is not a well-formed metric path.
    #[error("Invalid metric name: {0:?}")]
    InvalidName(String),
}

impl CatalogError {
    /// Returns a bounded label for metrics.
    #[must_use]
    pub const fn error_type_label(&self) -> &'static str {
        match self {
            CatalogError::DuplicateName(_) => "duplicate_name",
            CatalogError::NotFound(_) => "not_found",
            CatalogError::InvalidName(_) => "invalid_name",
        }
    }
}

/// Errors produced while reading a pull gauge.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceError {
    /// The owner did not answer within the read timeout.
    #[error("Read timed out after {0:?}")]
    Timeout(Duration),

    /// The owner has stopped or dropped the request.
    #[error("Value source unavailable")]
    Unavailable,

    /// The owner answered with a failure.
    #[error("Value source failed: {0}")]
    Failed(String),
}

impl SourceError {
    /// Returns a bounded label for metrics.
    #[must_use]
    pub const fn error_type_label(&self) -> &'static str {
        match self {
            SourceError::Timeout(_) => "timeout",
            SourceError::Unavailable => "unavailable",
            SourceError::Failed(_) => "failed",
        }
    }
}

/// Errors returned by the metrics registries.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// A lifecycle precondition was broken: a key was added twice, or a key
    /// with no live registration was removed. Indicates a bug in the caller's
    /// event ordering.
    #[error("Precondition violated in {operation}: {detail}")]
    Precondition {
        operation: &'static str,
        detail: String,
    },

    /// The catalog rejected a name. Stems from external naming (e.g. two
    /// roles colliding after normalization), not from lifecycle tracking.
    #[error("Catalog rejected registration: {0}")]
    Catalog(#[from] CatalogError),
}

impl RegistryError {
    /// Returns true for lifecycle precondition violations.
    #[must_use]
    pub const fn is_precondition(&self) -> bool {
        matches!(self, RegistryError::Precondition { .. })
    }

    /// Returns a bounded label for metrics.
    #[must_use]
    pub const fn error_type_label(&self) -> &'static str {
        match self {
            RegistryError::Precondition { .. } => "precondition",
            RegistryError::Catalog(_) => "catalog",
        }
    }
}

/// Errors returned by the allocator actor.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AllocatorError {
    /// Framework not known to the allocator.
    #[error("Framework not found: {0}")]
    FrameworkNotFound(String),

    /// Agent not known to the allocator.
    #[error("Agent not found: {0}")]
    AgentNotFound(String),

    /// Role has no quota configured.
    #[error("Quota not found for role: {0}")]
    QuotaNotFound(String),

    /// Conflict with existing state (duplicate framework, agent or quota).
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Metric registration failed.
    #[error("Metrics registry error: {0}")]
    Registry(#[from] RegistryError),

    /// Internal error with context (channel failures, actor gone).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AllocatorError {
    /// Returns a bounded label for metrics.
    #[must_use]
    pub const fn error_type_label(&self) -> &'static str {
        match self {
            AllocatorError::FrameworkNotFound(_) => "framework_not_found",
            AllocatorError::AgentNotFound(_) => "agent_not_found",
            AllocatorError::QuotaNotFound(_) => "quota_not_found",
            AllocatorError::Conflict(_) => "conflict",
            AllocatorError::Registry(_) => "registry",
            AllocatorError::Internal(_) => "internal",
        }
    }
}
