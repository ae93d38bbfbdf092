//! Message types for the allocator actor.
//!
//! Every request carries a oneshot `respond_to`; the actor replies after the
//! state change and its metric updates have been applied.

use crate::errors::{AllocatorError, SourceError};
use crate::registry::{AllocatorQuery, FilterReason};
use common::types::{AgentId, FrameworkId, FrameworkInfo, Quota, ResourceQuantities};
use serde::Serialize;
use std::collections::BTreeSet;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::Instant;

/// Reply channel for a request.
pub type Reply<T> = oneshot::Sender<Result<T, AllocatorError>>;

/// Messages handled by the allocator actor.
#[derive(Debug)]
pub enum AllocatorMessage {
    /// An agent joined with the given total resources.
    AddAgent {
        agent_id: AgentId,
        total: ResourceQuantities,
        respond_to: Reply<()>,
    },

    /// An agent left; its resources are no longer part of the cluster total.
    RemoveAgent {
        agent_id: AgentId,
        respond_to: Reply<()>,
    },

    /// A framework subscribed.
    AddFramework {
        info: FrameworkInfo,
        /// Roles the framework starts suppressed in.
        suppressed_roles: BTreeSet<String>,
        respond_to: Reply<()>,
    },

    /// A framework was torn down.
    RemoveFramework {
        framework_id: FrameworkId,
        respond_to: Reply<()>,
    },

    /// A framework re-subscribed with a different role set.
    UpdateFramework {
        info: FrameworkInfo,
        respond_to: Reply<()>,
    },

    SetQuota {
        role: String,
        quota: Quota,
        respond_to: Reply<()>,
    },

    RemoveQuota {
        role: String,
        respond_to: Reply<()>,
    },

    /// Stop offers to a framework for the given roles.
    SuppressRoles {
        framework_id: FrameworkId,
        roles: BTreeSet<String>,
        respond_to: Reply<()>,
    },

    /// Resume offers to a framework for the given roles.
    ReviveRoles {
        framework_id: FrameworkId,
        roles: BTreeSet<String>,
        respond_to: Reply<()>,
    },

    /// A framework declined an offer and asked not to see the agent again
    /// in `role` for `refuse_for`.
    DeclineOffer {
        framework_id: FrameworkId,
        role: String,
        agent_id: AgentId,
        refuse_for: Duration,
        respond_to: Reply<()>,
    },

    /// Resources were offered or allocated to a framework in a role.
    RecordAllocation {
        framework_id: FrameworkId,
        role: String,
        resources: ResourceQuantities,
        respond_to: Reply<()>,
    },

    /// Resources previously allocated to a framework were returned.
    RecoverResources {
        framework_id: FrameworkId,
        role: String,
        resources: ResourceQuantities,
        respond_to: Reply<()>,
    },

    /// Resources were withheld from a framework for `reason`.
    RecordResourcesFiltered {
        framework_id: FrameworkId,
        reason: FilterReason,
        respond_to: Reply<()>,
    },

    /// Run one allocation cycle.
    RunAllocation {
        /// When the run was requested; the wait until it starts is the
        /// run latency.
        requested_at: Instant,
        respond_to: Reply<AllocationRunSummary>,
    },

    /// Pull-gauge read.
    Query {
        query: AllocatorQuery,
        respond_to: oneshot::Sender<Result<f64, SourceError>>,
    },

    /// Get the current status.
    GetStatus {
        respond_to: oneshot::Sender<AllocatorStatus>,
    },

    /// Tear down every registry and stop. Replies once all metrics have been
    /// unregistered.
    Shutdown { respond_to: oneshot::Sender<()> },
}

impl AllocatorMessage {
    /// Returns the message kind as a bounded label for logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            AllocatorMessage::AddAgent { .. } => "add_agent",
            AllocatorMessage::RemoveAgent { .. } => "remove_agent",
            AllocatorMessage::AddFramework { .. } => "add_framework",
            AllocatorMessage::RemoveFramework { .. } => "remove_framework",
            AllocatorMessage::UpdateFramework { .. } => "update_framework",
            AllocatorMessage::SetQuota { .. } => "set_quota",
            AllocatorMessage::RemoveQuota { .. } => "remove_quota",
            AllocatorMessage::SuppressRoles { .. } => "suppress_roles",
            AllocatorMessage::ReviveRoles { .. } => "revive_roles",
            AllocatorMessage::DeclineOffer { .. } => "decline_offer",
            AllocatorMessage::RecordAllocation { .. } => "record_allocation",
            AllocatorMessage::RecoverResources { .. } => "recover_resources",
            AllocatorMessage::RecordResourcesFiltered { .. } => "record_resources_filtered",
            AllocatorMessage::RunAllocation { .. } => "run_allocation",
            AllocatorMessage::Query { .. } => "query",
            AllocatorMessage::GetStatus { .. } => "get_status",
            AllocatorMessage::Shutdown { .. } => "shutdown",
        }
    }
}

/// Result of one allocation run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AllocationRunSummary {
    /// Roles whose DRF positions were published.
    pub roles: usize,
    /// Frameworks that received a position.
    pub frameworks: usize,
    /// Time spent in the run.
    pub duration: Duration,
    /// Time the request waited before the run started.
    pub latency: Duration,
}

/// Allocator status snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AllocatorStatus {
    pub agents: usize,
    pub frameworks: usize,
    /// Roles with at least one subscribed framework.
    pub tracked_roles: usize,
    pub quota_roles: usize,
    /// Messages waiting in the mailbox.
    pub queue_depth: usize,
}
