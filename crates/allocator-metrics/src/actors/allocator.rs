//! `AllocatorActor` - single owner of allocator state and its metrics.
//!
//! The actor processes one message at a time on its own task:
//!
//! - Domain events mutate [`AllocatorState`] and drive the registries
//!   (role tracking, quota gauges, per-framework suppression and DRF
//!   positions).
//! - Pull-gauge reads arrive as [`AllocatorMessage::Query`] and are answered
//!   from the current state.
//!
//! Pull gauges reach the actor through an [`AllocatorRef`], which holds only a
//! weak sender. The catalog therefore never keeps the actor alive, and a read
//! after the actor stopped resolves to [`SourceError::Unavailable`].
//!
//! # Shutdown
//!
//! On [`AllocatorMessage::Shutdown`], cancellation, or when every handle is
//! dropped, the actor stops receiving, drops every framework registry and
//! then the allocator registry, and only then acknowledges shutdown. All
//! unregistrations have completed by the time `shutdown()` returns.

use super::mailbox::MailboxMonitor;
use super::messages::{AllocationRunSummary, AllocatorMessage, AllocatorStatus, Reply};
use super::state::{AllocatorState, RoleChanges};
use crate::catalog::MetricsCatalog;
use crate::errors::{AllocatorError, SourceError};
use crate::gauge::ValueFuture;
use crate::registry::{
    AllocatorMetrics, AllocatorQuery, AllocatorQuerySource, FilterReason, FrameworkMetrics,
    RegistryOptions,
};
use common::types::{AgentId, FrameworkId, FrameworkInfo, Quota, ResourceQuantities};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Default channel buffer size for the allocator mailbox.
pub const DEFAULT_MAILBOX_CAPACITY: usize = 1000;

/// Settings for spawning the allocator actor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllocatorOptions {
    /// Instance id used in logs.
    pub allocator_id: String,
    /// Resource kinds with `total`/`offered_or_allocated` gauges.
    pub resource_kinds: Vec<String>,
    pub registry: RegistryOptions,
    pub mailbox_capacity: usize,
}

impl Default for AllocatorOptions {
    fn default() -> Self {
        Self {
            allocator_id: "allocator".to_string(),
            resource_kinds: vec!["cpus".to_string(), "mem".to_string(), "disk".to_string()],
            registry: RegistryOptions::default(),
            mailbox_capacity: DEFAULT_MAILBOX_CAPACITY,
        }
    }
}

/// Weak reference to the allocator used by pull gauges.
#[derive(Debug, Clone)]
pub struct AllocatorRef {
    sender: mpsc::WeakSender<AllocatorMessage>,
}

impl AllocatorQuerySource for AllocatorRef {
    fn query(&self, query: AllocatorQuery) -> ValueFuture {
        let sender = self.sender.clone();
        Box::pin(async move {
            let sender = sender.upgrade().ok_or(SourceError::Unavailable)?;
            let (tx, rx) = oneshot::channel();
            sender
                .send(AllocatorMessage::Query {
                    query,
                    respond_to: tx,
                })
                .await
                .map_err(|_| SourceError::Unavailable)?;
            drop(sender);

            rx.await.map_err(|_| SourceError::Unavailable)?
        })
    }
}

/// Handle to the `AllocatorActor`.
///
/// All methods are async and return results via oneshot channels.
#[derive(Clone)]
pub struct AllocatorActorHandle {
    sender: mpsc::Sender<AllocatorMessage>,
    cancel_token: CancellationToken,
}

impl AllocatorActorHandle {
    /// Register the allocator metrics and spawn the actor task.
    ///
    /// # Errors
    ///
    /// Returns [`AllocatorError::Registry`] if the allocator metrics cannot
    /// be registered (for example, another allocator already registered
    /// them on the same catalog).
    pub fn spawn(
        options: AllocatorOptions,
        catalog: Arc<dyn MetricsCatalog>,
    ) -> Result<(Self, JoinHandle<()>), AllocatorError> {
        let (sender, receiver) = mpsc::channel(options.mailbox_capacity.max(1));
        let cancel_token = CancellationToken::new();

        let source = AllocatorRef {
            sender: sender.downgrade(),
        };
        let metrics = AllocatorMetrics::new(
            Arc::clone(&catalog),
            Arc::new(source),
            &options.resource_kinds,
            options.registry,
        )?;

        let mailbox = MailboxMonitor::new(options.allocator_id.clone());
        let actor = AllocatorActor {
            allocator_id: options.allocator_id,
            receiver,
            cancel_token: cancel_token.clone(),
            state: AllocatorState::new(),
            catalog,
            registry_options: options.registry,
            metrics,
            frameworks: HashMap::new(),
            mailbox,
        };
        let task = tokio::spawn(actor.run());

        Ok((
            Self {
                sender,
                cancel_token,
            },
            task,
        ))
    }

    /// Query source bound to this actor, holding only a weak reference.
    #[must_use]
    pub fn query_source(&self) -> AllocatorRef {
        AllocatorRef {
            sender: self.sender.downgrade(),
        }
    }

    async fn request<T>(
        &self,
        message: impl FnOnce(Reply<T>) -> AllocatorMessage,
    ) -> Result<T, AllocatorError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(message(tx))
            .await
            .map_err(|e| AllocatorError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| AllocatorError::Internal(format!("response receive failed: {e}")))?
    }

    pub async fn add_agent(&self, agent_id: AgentId, total: ResourceQuantities) -> Result<(), AllocatorError> {
        self.request(|respond_to| AllocatorMessage::AddAgent {
            agent_id,
            total,
            respond_to,
        })
        .await
    }

    pub async fn remove_agent(&self, agent_id: AgentId) -> Result<(), AllocatorError> {
        self.request(|respond_to| AllocatorMessage::RemoveAgent {
            agent_id,
            respond_to,
        })
        .await
    }

    /// Add a framework, optionally starting suppressed in some of its roles.
    pub async fn add_framework(
        &self,
        info: FrameworkInfo,
        suppressed_roles: BTreeSet<String>,
    ) -> Result<(), AllocatorError> {
        self.request(|respond_to| AllocatorMessage::AddFramework {
            info,
            suppressed_roles,
            respond_to,
        })
        .await
    }

    pub async fn remove_framework(&self, framework_id: FrameworkId) -> Result<(), AllocatorError> {
        self.request(|respond_to| AllocatorMessage::RemoveFramework {
            framework_id,
            respond_to,
        })
        .await
    }

    pub async fn update_framework(&self, info: FrameworkInfo) -> Result<(), AllocatorError> {
        self.request(|respond_to| AllocatorMessage::UpdateFramework { info, respond_to })
            .await
    }

    pub async fn set_quota(&self, role: impl Into<String>, quota: Quota) -> Result<(), AllocatorError> {
        let role = role.into();
        self.request(|respond_to| AllocatorMessage::SetQuota {
            role,
            quota,
            respond_to,
        })
        .await
    }

    pub async fn remove_quota(&self, role: impl Into<String>) -> Result<(), AllocatorError> {
        let role = role.into();
        self.request(|respond_to| AllocatorMessage::RemoveQuota { role, respond_to })
            .await
    }

    pub async fn suppress_roles(
        &self,
        framework_id: FrameworkId,
        roles: BTreeSet<String>,
    ) -> Result<(), AllocatorError> {
        self.request(|respond_to| AllocatorMessage::SuppressRoles {
            framework_id,
            roles,
            respond_to,
        })
        .await
    }

    pub async fn revive_roles(
        &self,
        framework_id: FrameworkId,
        roles: BTreeSet<String>,
    ) -> Result<(), AllocatorError> {
        self.request(|respond_to| AllocatorMessage::ReviveRoles {
            framework_id,
            roles,
            respond_to,
        })
        .await
    }

    pub async fn decline_offer(
        &self,
        framework_id: FrameworkId,
        role: impl Into<String>,
        agent_id: AgentId,
        refuse_for: Duration,
    ) -> Result<(), AllocatorError> {
        let role = role.into();
        self.request(|respond_to| AllocatorMessage::DeclineOffer {
            framework_id,
            role,
            agent_id,
            refuse_for,
            respond_to,
        })
        .await
    }

    pub async fn record_allocation(
        &self,
        framework_id: FrameworkId,
        role: impl Into<String>,
        resources: ResourceQuantities,
    ) -> Result<(), AllocatorError> {
        let role = role.into();
        self.request(|respond_to| AllocatorMessage::RecordAllocation {
            framework_id,
            role,
            resources,
            respond_to,
        })
        .await
    }

    pub async fn recover_resources(
        &self,
        framework_id: FrameworkId,
        role: impl Into<String>,
        resources: ResourceQuantities,
    ) -> Result<(), AllocatorError> {
        let role = role.into();
        self.request(|respond_to| AllocatorMessage::RecoverResources {
            framework_id,
            role,
            resources,
            respond_to,
        })
        .await
    }

    pub async fn record_resources_filtered(
        &self,
        framework_id: FrameworkId,
        reason: FilterReason,
    ) -> Result<(), AllocatorError> {
        self.request(|respond_to| AllocatorMessage::RecordResourcesFiltered {
            framework_id,
            reason,
            respond_to,
        })
        .await
    }

    /// Run one allocation cycle and publish DRF positions.
    pub async fn run_allocation(&self) -> Result<AllocationRunSummary, AllocatorError> {
        let requested_at = Instant::now();
        self.request(|respond_to| AllocatorMessage::RunAllocation {
            requested_at,
            respond_to,
        })
        .await
    }

    pub async fn get_status(&self) -> Result<AllocatorStatus, AllocatorError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(AllocatorMessage::GetStatus { respond_to: tx })
            .await
            .map_err(|e| AllocatorError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| AllocatorError::Internal(format!("response receive failed: {e}")))
    }

    /// Stop the actor and wait until every metric has been unregistered.
    pub async fn shutdown(&self) -> Result<(), AllocatorError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(AllocatorMessage::Shutdown { respond_to: tx })
            .await
            .map_err(|e| AllocatorError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| AllocatorError::Internal(format!("response receive failed: {e}")))
    }

    /// Cancel the actor without waiting.
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    /// Child token cancelled together with the actor.
    #[must_use]
    pub fn child_token(&self) -> CancellationToken {
        self.cancel_token.child_token()
    }
}

/// The allocator actor.
///
/// Owns the allocator state and both kinds of registries.
pub struct AllocatorActor {
    allocator_id: String,
    receiver: mpsc::Receiver<AllocatorMessage>,
    cancel_token: CancellationToken,
    state: AllocatorState,
    catalog: Arc<dyn MetricsCatalog>,
    registry_options: RegistryOptions,
    metrics: AllocatorMetrics,
    frameworks: HashMap<FrameworkId, FrameworkMetrics>,
    mailbox: MailboxMonitor,
}

impl AllocatorActor {
    /// Run the actor message loop.
    #[instrument(skip_all, name = "allocator.actor", fields(allocator_id = %self.allocator_id))]
    async fn run(mut self) {
        info!(
            target: "allocator.actor",
            allocator_id = %self.allocator_id,
            resource_kinds = ?self.metrics.resource_kinds(),
            "AllocatorActor started"
        );

        let mut shutdown_waiters = Vec::new();

        loop {
            tokio::select! {
                () = self.cancel_token.cancelled() => {
                    info!(
                        target: "allocator.actor",
                        allocator_id = %self.allocator_id,
                        "AllocatorActor received cancellation signal"
                    );
                    break;
                }

                msg = self.receiver.recv() => {
                    match msg {
                        Some(AllocatorMessage::Shutdown { respond_to }) => {
                            shutdown_waiters.push(respond_to);
                            break;
                        }
                        Some(message) => {
                            self.mailbox.observe(self.receiver.len());
                            self.handle_message(message);
                            self.mailbox.record_processed();
                        }
                        None => {
                            info!(
                                target: "allocator.actor",
                                allocator_id = %self.allocator_id,
                                "AllocatorActor channel closed, exiting"
                            );
                            break;
                        }
                    }
                }
            }
        }

        self.receiver.close();
        // Requests still queued are dropped unanswered; a second shutdown
        // request is acknowledged with the first.
        while let Ok(message) = self.receiver.try_recv() {
            if let AllocatorMessage::Shutdown { respond_to } = message {
                shutdown_waiters.push(respond_to);
            }
        }

        let Self {
            allocator_id,
            metrics,
            frameworks,
            mailbox,
            ..
        } = self;

        let framework_count = frameworks.len();
        drop(frameworks);
        drop(metrics);

        info!(
            target: "allocator.actor",
            allocator_id = %allocator_id,
            frameworks_unregistered = framework_count,
            messages_processed = mailbox.messages_processed(),
            "AllocatorActor stopped"
        );

        for waiter in shutdown_waiters {
            let _ = waiter.send(());
        }
    }

    fn handle_message(&mut self, message: AllocatorMessage) {
        let kind = message.kind();
        match message {
            AllocatorMessage::AddAgent {
                agent_id,
                total,
                respond_to,
            } => {
                let result = self.state.add_agent(agent_id, total);
                self.reply(kind, respond_to, result);
            }
            AllocatorMessage::RemoveAgent {
                agent_id,
                respond_to,
            } => {
                let result = self.state.remove_agent(&agent_id);
                self.reply(kind, respond_to, result);
            }
            AllocatorMessage::AddFramework {
                info,
                suppressed_roles,
                respond_to,
            } => {
                let result = self.add_framework(info, suppressed_roles);
                self.reply(kind, respond_to, result);
            }
            AllocatorMessage::RemoveFramework {
                framework_id,
                respond_to,
            } => {
                let result = self.remove_framework(&framework_id);
                self.reply(kind, respond_to, result);
            }
            AllocatorMessage::UpdateFramework { info, respond_to } => {
                let result = self.update_framework(info);
                self.reply(kind, respond_to, result);
            }
            AllocatorMessage::SetQuota {
                role,
                quota,
                respond_to,
            } => {
                let result = self.set_quota(role, quota);
                self.reply(kind, respond_to, result);
            }
            AllocatorMessage::RemoveQuota { role, respond_to } => {
                let result = self.remove_quota(&role);
                self.reply(kind, respond_to, result);
            }
            AllocatorMessage::SuppressRoles {
                framework_id,
                roles,
                respond_to,
            } => {
                let result = self.suppress_roles(&framework_id, &roles);
                self.reply(kind, respond_to, result);
            }
            AllocatorMessage::ReviveRoles {
                framework_id,
                roles,
                respond_to,
            } => {
                let result = self.revive_roles(&framework_id, &roles);
                self.reply(kind, respond_to, result);
            }
            AllocatorMessage::DeclineOffer {
                framework_id,
                role,
                agent_id,
                refuse_for,
                respond_to,
            } => {
                let result = self.state.decline_offer(
                    &framework_id,
                    &role,
                    &agent_id,
                    refuse_for,
                    Instant::now(),
                );
                self.reply(kind, respond_to, result);
            }
            AllocatorMessage::RecordAllocation {
                framework_id,
                role,
                resources,
                respond_to,
            } => {
                let result = self.state.record_allocation(&framework_id, &role, &resources);
                self.reply(kind, respond_to, result);
            }
            AllocatorMessage::RecoverResources {
                framework_id,
                role,
                resources,
                respond_to,
            } => {
                let result = self.state.recover_resources(&framework_id, &role, &resources);
                self.reply(kind, respond_to, result);
            }
            AllocatorMessage::RecordResourcesFiltered {
                framework_id,
                reason,
                respond_to,
            } => {
                let result = match self.frameworks.get(&framework_id) {
                    Some(metrics) => {
                        metrics.increment_resources_filtered(reason);
                        Ok(())
                    }
                    None => Err(AllocatorError::FrameworkNotFound(framework_id.to_string())),
                };
                self.reply(kind, respond_to, result);
            }
            AllocatorMessage::RunAllocation {
                requested_at,
                respond_to,
            } => {
                let result = Ok(self.run_allocation(requested_at));
                self.reply(kind, respond_to, result);
            }
            AllocatorMessage::Query { query, respond_to } => {
                let _ = respond_to.send(Ok(self.answer(&query)));
            }
            AllocatorMessage::GetStatus { respond_to } => {
                let _ = respond_to.send(self.status());
            }
            AllocatorMessage::Shutdown { respond_to } => {
                // Handled by the run loop; answer anyway if one slips through.
                let _ = respond_to.send(());
            }
        }
    }

    fn reply<T>(&self, kind: &'static str, respond_to: Reply<T>, result: Result<T, AllocatorError>) {
        if let Err(e) = &result {
            debug!(
                target: "allocator.actor",
                allocator_id = %self.allocator_id,
                message = kind,
                error_type = e.error_type_label(),
                error = %e,
                "Allocator request failed"
            );
        }
        let _ = respond_to.send(result);
    }

    fn add_framework(
        &mut self,
        info: FrameworkInfo,
        suppressed_roles: BTreeSet<String>,
    ) -> Result<(), AllocatorError> {
        if self.state.contains_framework(&info.id) {
            return Err(AllocatorError::Conflict(format!(
                "framework already added: {}",
                info.id
            )));
        }

        let mut metrics =
            FrameworkMetrics::new(Arc::clone(&self.catalog), &info, self.registry_options)?;
        for role in suppressed_roles.intersection(&info.roles) {
            metrics.suppress_role(role)?;
        }

        let framework_id = info.id.clone();
        let changes = self.state.add_framework(info, suppressed_roles);
        self.frameworks.insert(framework_id.clone(), metrics);
        self.apply_tracking(&changes)?;

        info!(
            target: "allocator.actor",
            allocator_id = %self.allocator_id,
            framework_id = %framework_id,
            roles = changes.joined.len(),
            "Framework added"
        );
        Ok(())
    }

    fn remove_framework(&mut self, framework_id: &FrameworkId) -> Result<(), AllocatorError> {
        let (_, changes) = self.state.remove_framework(framework_id)?;
        // Dropping the registry unregisters all of its metrics.
        self.frameworks.remove(framework_id);
        self.apply_tracking(&changes)?;

        info!(
            target: "allocator.actor",
            allocator_id = %self.allocator_id,
            framework_id = %framework_id,
            roles_untracked = changes.untracked.len(),
            "Framework removed"
        );
        Ok(())
    }

    fn update_framework(&mut self, info: FrameworkInfo) -> Result<(), AllocatorError> {
        let framework_id = info.id.clone();
        let changes = self.state.update_framework(info)?;

        if let Some(metrics) = self.frameworks.get_mut(&framework_id) {
            for role in &changes.left {
                if metrics.has_drf_positions(role) {
                    metrics.remove_drf_positions(role)?;
                }
                if metrics.suppression(role).is_some() {
                    metrics.remove_suppressed_role(role)?;
                }
            }
            for role in &changes.joined {
                metrics.revive_role(role)?;
            }
        }
        self.apply_tracking(&changes)?;

        debug!(
            target: "allocator.actor",
            allocator_id = %self.allocator_id,
            framework_id = %framework_id,
            joined = ?changes.joined,
            left = ?changes.left,
            "Framework updated"
        );
        Ok(())
    }

    /// Register offer-filter gauges for newly tracked roles and remove them
    /// for roles that lost their last framework.
    ///
    /// A role whose gauge could not be registered stays tracked without one,
    /// so removal only touches roles that have a gauge.
    fn apply_tracking(&mut self, changes: &RoleChanges) -> Result<(), AllocatorError> {
        for role in &changes.tracked {
            if let Err(e) = self.metrics.add_role(role) {
                if e.is_precondition() {
                    return Err(e.into());
                }
                warn!(
                    target: "allocator.actor",
                    allocator_id = %self.allocator_id,
                    role = %role,
                    error = %e,
                    "Role tracked without offer filter metrics"
                );
            }
        }
        for role in &changes.untracked {
            if self.metrics.has_role(role) {
                self.metrics.remove_role(role)?;
            }
        }
        Ok(())
    }

    fn set_quota(&mut self, role: String, quota: Quota) -> Result<(), AllocatorError> {
        if self.state.has_quota(&role) {
            return Err(AllocatorError::Conflict(format!(
                "quota already set for role {role}"
            )));
        }
        self.metrics.set_quota(&role, &quota)?;
        self.state.set_quota(&role, quota)?;

        info!(
            target: "allocator.actor",
            allocator_id = %self.allocator_id,
            role = %role,
            "Quota set"
        );
        Ok(())
    }

    fn remove_quota(&mut self, role: &str) -> Result<(), AllocatorError> {
        self.state.remove_quota(role)?;
        self.metrics.remove_quota(role)?;

        info!(
            target: "allocator.actor",
            allocator_id = %self.allocator_id,
            role = %role,
            "Quota removed"
        );
        Ok(())
    }

    fn suppress_roles(
        &mut self,
        framework_id: &FrameworkId,
        roles: &BTreeSet<String>,
    ) -> Result<(), AllocatorError> {
        self.state.suppress_roles(framework_id, roles)?;
        let metrics = self.framework_metrics(framework_id)?;
        for role in roles {
            metrics.suppress_role(role)?;
        }
        Ok(())
    }

    fn revive_roles(
        &mut self,
        framework_id: &FrameworkId,
        roles: &BTreeSet<String>,
    ) -> Result<(), AllocatorError> {
        self.state.revive_roles(framework_id, roles)?;
        let metrics = self.framework_metrics(framework_id)?;
        for role in roles {
            metrics.revive_role(role)?;
        }
        Ok(())
    }

    fn framework_metrics(&mut self, framework_id: &FrameworkId) -> Result<&mut FrameworkMetrics, AllocatorError> {
        self.frameworks
            .get_mut(framework_id)
            .ok_or_else(|| AllocatorError::FrameworkNotFound(framework_id.to_string()))
    }

    fn run_allocation(&mut self, requested_at: Instant) -> AllocationRunSummary {
        let started = Instant::now();
        let latency = started.saturating_duration_since(requested_at);

        self.state.expire_offer_filters(started);
        for framework_id in self.state.filtered_frameworks(started) {
            if let Some(metrics) = self.frameworks.get(&framework_id) {
                metrics.increment_resources_filtered(FilterReason::Decline);
            }
        }

        let positions = self.state.drf_positions();
        let mut published = 0;
        for (role, ranked) in &positions {
            for position in ranked {
                let Some(metrics) = self.frameworks.get_mut(&position.framework_id) else {
                    continue;
                };
                match metrics.set_drf_positions(role, (position.min, position.max)) {
                    Ok(()) => published += 1,
                    Err(e) => warn!(
                        target: "allocator.actor",
                        allocator_id = %self.allocator_id,
                        framework_id = %position.framework_id,
                        role = %role,
                        error = %e,
                        "Failed to publish DRF positions"
                    ),
                }
            }
        }

        let duration = started.elapsed();
        self.metrics.record_allocation_run(duration, latency);

        debug!(
            target: "allocator.actor",
            allocator_id = %self.allocator_id,
            roles = positions.len(),
            frameworks = published,
            duration_ms = duration.as_millis(),
            latency_ms = latency.as_millis(),
            "Allocation run complete"
        );

        AllocationRunSummary {
            roles: positions.len(),
            frameworks: published,
            duration,
            latency,
        }
    }

    #[allow(clippy::cast_precision_loss)]
    fn answer(&self, query: &AllocatorQuery) -> f64 {
        match query {
            AllocatorQuery::EventQueueDispatches => self.receiver.len() as f64,
            AllocatorQuery::ResourcesTotal { resource } => self.state.total(resource),
            AllocatorQuery::ResourcesOfferedOrAllocated { resource } => {
                self.state.offered_or_allocated(resource)
            }
            AllocatorQuery::QuotaAllocated { role, resource } => {
                self.state.quota_allocated(role, resource)
            }
            AllocatorQuery::OfferFiltersActive { role } => {
                self.state.offer_filters_active(role, Instant::now()) as f64
            }
        }
    }

    fn status(&self) -> AllocatorStatus {
        AllocatorStatus {
            agents: self.state.agent_count(),
            frameworks: self.state.framework_count(),
            tracked_roles: self.state.tracked_roles().len(),
            quota_roles: self.state.quota_count(),
            queue_depth: self.receiver.len(),
        }
    }
}
