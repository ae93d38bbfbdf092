//! Allocator bookkeeping owned by the allocator actor.
//!
//! Holds just enough cluster state to answer the pull-gauge queries and to
//! order frameworks for DRF positions. Every method is synchronous; the actor
//! calls them from its own task only.

use crate::errors::AllocatorError;
use common::types::{AgentId, FrameworkId, FrameworkInfo, Quota, ResourceQuantities};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::time::Duration;
use tokio::time::Instant;

/// Longest time an offer filter stays active. Longer refusals are clamped.
pub const MAX_OFFER_FILTER_DURATION: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// A temporary exclusion of an agent's resources from a framework in a role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OfferFilter {
    pub framework_id: FrameworkId,
    pub role: String,
    pub agent_id: AgentId,
    pub expires_at: Instant,
}

/// Per-framework state.
#[derive(Debug, Clone)]
pub struct FrameworkState {
    pub info: FrameworkInfo,
    /// Resources offered or allocated, by role.
    pub allocated: BTreeMap<String, ResourceQuantities>,
    /// Roles the framework is currently suppressed in.
    pub suppressed: BTreeSet<String>,
}

impl FrameworkState {
    fn dominant_share(&self, role: &str, totals: &ResourceQuantities) -> f64 {
        self.allocated.get(role).map_or(0.0, |allocated| {
            allocated
                .iter()
                .filter_map(|(resource, amount)| {
                    let total = totals.get(resource);
                    (total > 0.0).then(|| amount / total)
                })
                .fold(0.0, f64::max)
        })
    }
}

/// Role membership changes caused by a framework event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoleChanges {
    /// Roles the framework joined.
    pub joined: Vec<String>,
    /// Roles the framework left.
    pub left: Vec<String>,
    /// Roles that gained their first framework.
    pub tracked: Vec<String>,
    /// Roles that lost their last framework.
    pub untracked: Vec<String>,
}

/// DRF position range of one framework within a role.
#[derive(Debug, Clone, PartialEq)]
pub struct DrfPosition {
    pub framework_id: FrameworkId,
    pub min: f64,
    pub max: f64,
}

/// Cluster state tracked by the allocator.
#[derive(Debug, Default)]
pub struct AllocatorState {
    agents: HashMap<AgentId, ResourceQuantities>,
    frameworks: HashMap<FrameworkId, FrameworkState>,
    quotas: BTreeMap<String, Quota>,
    offer_filters: Vec<OfferFilter>,
    role_frameworks: BTreeMap<String, BTreeSet<FrameworkId>>,
}

impl AllocatorState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_agent(&mut self, agent_id: AgentId, total: ResourceQuantities) -> Result<(), AllocatorError> {
        if self.agents.contains_key(&agent_id) {
            return Err(AllocatorError::Conflict(format!(
                "agent already added: {agent_id}"
            )));
        }
        self.agents.insert(agent_id, total);
        Ok(())
    }

    /// Remove an agent and every offer filter that refers to it.
    pub fn remove_agent(&mut self, agent_id: &AgentId) -> Result<(), AllocatorError> {
        if self.agents.remove(agent_id).is_none() {
            return Err(AllocatorError::AgentNotFound(agent_id.to_string()));
        }
        self.offer_filters.retain(|filter| filter.agent_id != *agent_id);
        Ok(())
    }

    #[must_use]
    pub fn contains_framework(&self, framework_id: &FrameworkId) -> bool {
        self.frameworks.contains_key(framework_id)
    }

    #[must_use]
    pub fn framework(&self, framework_id: &FrameworkId) -> Option<&FrameworkState> {
        self.frameworks.get(framework_id)
    }

    fn framework_mut(&mut self, framework_id: &FrameworkId) -> Result<&mut FrameworkState, AllocatorError> {
        self.frameworks
            .get_mut(framework_id)
            .ok_or_else(|| AllocatorError::FrameworkNotFound(framework_id.to_string()))
    }

    /// Add a framework. The caller must have checked it is not present.
    pub fn add_framework(&mut self, info: FrameworkInfo, suppressed: BTreeSet<String>) -> RoleChanges {
        let mut changes = RoleChanges {
            joined: info.roles.iter().cloned().collect(),
            ..RoleChanges::default()
        };
        for role in &info.roles {
            if self.subscribe(role, &info.id) {
                changes.tracked.push(role.clone());
            }
        }

        let suppressed = suppressed.intersection(&info.roles).cloned().collect();
        self.frameworks.insert(
            info.id.clone(),
            FrameworkState {
                info,
                allocated: BTreeMap::new(),
                suppressed,
            },
        );
        changes
    }

    /// Remove a framework, its allocations and its offer filters.
    pub fn remove_framework(
        &mut self,
        framework_id: &FrameworkId,
    ) -> Result<(FrameworkState, RoleChanges), AllocatorError> {
        let framework = self
            .frameworks
            .remove(framework_id)
            .ok_or_else(|| AllocatorError::FrameworkNotFound(framework_id.to_string()))?;

        let mut changes = RoleChanges {
            left: framework.info.roles.iter().cloned().collect(),
            ..RoleChanges::default()
        };
        for role in &framework.info.roles {
            if self.unsubscribe(role, framework_id) {
                changes.untracked.push(role.clone());
            }
        }
        self.offer_filters
            .retain(|filter| filter.framework_id != *framework_id);

        Ok((framework, changes))
    }

    /// Replace a framework's info, moving it between roles.
    ///
    /// Allocations, suppression and offer filters in roles the framework
    /// left are dropped.
    pub fn update_framework(&mut self, info: FrameworkInfo) -> Result<RoleChanges, AllocatorError> {
        let framework_id = info.id.clone();
        let old_roles = self.framework_mut(&framework_id)?.info.roles.clone();

        let mut changes = RoleChanges {
            joined: info.roles.difference(&old_roles).cloned().collect(),
            left: old_roles.difference(&info.roles).cloned().collect(),
            ..RoleChanges::default()
        };

        for role in &changes.joined {
            if self.subscribe(role, &framework_id) {
                changes.tracked.push(role.clone());
            }
        }
        for role in &changes.left {
            if self.unsubscribe(role, &framework_id) {
                changes.untracked.push(role.clone());
            }
        }
        self.offer_filters.retain(|filter| {
            filter.framework_id != framework_id || !changes.left.contains(&filter.role)
        });

        let framework = self.framework_mut(&framework_id)?;
        for role in &changes.left {
            framework.allocated.remove(role);
            framework.suppressed.remove(role);
        }
        framework.info = info;

        Ok(changes)
    }

    /// Returns true if `role` had no framework before.
    fn subscribe(&mut self, role: &str, framework_id: &FrameworkId) -> bool {
        let frameworks = self.role_frameworks.entry(role.to_string()).or_default();
        let first = frameworks.is_empty();
        frameworks.insert(framework_id.clone());
        first
    }

    /// Returns true if `role` has no framework left.
    fn unsubscribe(&mut self, role: &str, framework_id: &FrameworkId) -> bool {
        let Some(frameworks) = self.role_frameworks.get_mut(role) else {
            return false;
        };
        frameworks.remove(framework_id);
        if frameworks.is_empty() {
            self.role_frameworks.remove(role);
            return true;
        }
        false
    }

    fn check_subscribed(&self, framework_id: &FrameworkId, roles: &BTreeSet<String>) -> Result<(), AllocatorError> {
        let framework = self
            .frameworks
            .get(framework_id)
            .ok_or_else(|| AllocatorError::FrameworkNotFound(framework_id.to_string()))?;
        if let Some(role) = roles.difference(&framework.info.roles).next() {
            return Err(AllocatorError::Conflict(format!(
                "framework {framework_id} is not subscribed to role {role}"
            )));
        }
        Ok(())
    }

    pub fn suppress_roles(&mut self, framework_id: &FrameworkId, roles: &BTreeSet<String>) -> Result<(), AllocatorError> {
        self.check_subscribed(framework_id, roles)?;
        let framework = self.framework_mut(framework_id)?;
        framework.suppressed.extend(roles.iter().cloned());
        Ok(())
    }

    /// Revive roles and clear the framework's offer filters in them.
    pub fn revive_roles(&mut self, framework_id: &FrameworkId, roles: &BTreeSet<String>) -> Result<(), AllocatorError> {
        self.check_subscribed(framework_id, roles)?;
        let framework = self.framework_mut(framework_id)?;
        for role in roles {
            framework.suppressed.remove(role);
        }
        self.offer_filters.retain(|filter| {
            filter.framework_id != *framework_id || !roles.contains(&filter.role)
        });
        Ok(())
    }

    pub fn set_quota(&mut self, role: &str, quota: Quota) -> Result<(), AllocatorError> {
        if self.quotas.contains_key(role) {
            return Err(AllocatorError::Conflict(format!(
                "quota already set for role {role}"
            )));
        }
        self.quotas.insert(role.to_string(), quota);
        Ok(())
    }

    pub fn remove_quota(&mut self, role: &str) -> Result<Quota, AllocatorError> {
        self.quotas
            .remove(role)
            .ok_or_else(|| AllocatorError::QuotaNotFound(role.to_string()))
    }

    #[must_use]
    pub fn has_quota(&self, role: &str) -> bool {
        self.quotas.contains_key(role)
    }

    /// Install an offer filter for a declined offer.
    ///
    /// `refuse_for` is clamped to [`MAX_OFFER_FILTER_DURATION`].
    pub fn decline_offer(
        &mut self,
        framework_id: &FrameworkId,
        role: &str,
        agent_id: &AgentId,
        refuse_for: Duration,
        now: Instant,
    ) -> Result<(), AllocatorError> {
        self.check_subscribed(framework_id, &BTreeSet::from([role.to_string()]))?;
        if !self.agents.contains_key(agent_id) {
            return Err(AllocatorError::AgentNotFound(agent_id.to_string()));
        }
        let expires_at = now
            .checked_add(refuse_for.min(MAX_OFFER_FILTER_DURATION))
            .ok_or_else(|| {
                AllocatorError::Conflict(format!(
                    "offer filter for {framework_id} on {agent_id} expires past the clock range"
                ))
            })?;
        self.offer_filters.push(OfferFilter {
            framework_id: framework_id.clone(),
            role: role.to_string(),
            agent_id: agent_id.clone(),
            expires_at,
        });
        Ok(())
    }

    pub fn record_allocation(
        &mut self,
        framework_id: &FrameworkId,
        role: &str,
        resources: &ResourceQuantities,
    ) -> Result<(), AllocatorError> {
        self.check_subscribed(framework_id, &BTreeSet::from([role.to_string()]))?;
        let framework = self.framework_mut(framework_id)?;
        framework
            .allocated
            .entry(role.to_string())
            .or_default()
            .add(resources);
        Ok(())
    }

    pub fn recover_resources(
        &mut self,
        framework_id: &FrameworkId,
        role: &str,
        resources: &ResourceQuantities,
    ) -> Result<(), AllocatorError> {
        let framework = self.framework_mut(framework_id)?;
        if let Some(allocated) = framework.allocated.get_mut(role) {
            allocated.subtract(resources);
            if allocated.is_empty() {
                framework.allocated.remove(role);
            }
        }
        Ok(())
    }

    /// Drop filters that expired at or before `now`.
    pub fn expire_offer_filters(&mut self, now: Instant) {
        self.offer_filters.retain(|filter| filter.expires_at > now);
    }

    fn cluster_totals(&self) -> ResourceQuantities {
        let mut totals = ResourceQuantities::new();
        for total in self.agents.values() {
            totals.add(total);
        }
        totals
    }

    #[must_use]
    pub fn total(&self, resource: &str) -> f64 {
        self.agents.values().map(|total| total.get(resource)).sum()
    }

    #[must_use]
    pub fn offered_or_allocated(&self, resource: &str) -> f64 {
        self.frameworks
            .values()
            .flat_map(|framework| framework.allocated.values())
            .map(|allocated| allocated.get(resource))
            .sum()
    }

    #[must_use]
    pub fn quota_allocated(&self, role: &str, resource: &str) -> f64 {
        self.frameworks
            .values()
            .filter_map(|framework| framework.allocated.get(role))
            .map(|allocated| allocated.get(resource))
            .sum()
    }

    /// Unexpired offer filters in `role`.
    #[must_use]
    pub fn offer_filters_active(&self, role: &str, now: Instant) -> usize {
        self.offer_filters
            .iter()
            .filter(|filter| filter.role == role && filter.expires_at > now)
            .count()
    }

    /// Framework of every unexpired offer filter, once per filter.
    #[must_use]
    pub fn filtered_frameworks(&self, now: Instant) -> Vec<FrameworkId> {
        self.offer_filters
            .iter()
            .filter(|filter| filter.expires_at > now)
            .map(|filter| filter.framework_id.clone())
            .collect()
    }

    /// Order every tracked role's frameworks by dominant share.
    ///
    /// Positions are zero-based, lowest share first. Frameworks with equal
    /// shares get the same `[min, max]` range spanning all their positions.
    #[must_use]
    pub fn drf_positions(&self) -> BTreeMap<String, Vec<DrfPosition>> {
        let totals = self.cluster_totals();
        let mut positions = BTreeMap::new();

        for (role, members) in &self.role_frameworks {
            let mut shares: Vec<(f64, &FrameworkId)> = members
                .iter()
                .filter_map(|id| {
                    let framework = self.frameworks.get(id)?;
                    Some((framework.dominant_share(role, &totals), id))
                })
                .collect();
            shares.sort_by(|a, b| a.0.total_cmp(&b.0).then_with(|| a.1.cmp(b.1)));

            let mut ranked = Vec::with_capacity(shares.len());
            let mut start = 0;
            while start < shares.len() {
                let share = shares.get(start).map_or(0.0, |(share, _)| *share);
                let end = shares
                    .iter()
                    .skip(start)
                    .take_while(|(s, _)| s.total_cmp(&share).is_eq())
                    .count()
                    + start;

                #[allow(clippy::cast_precision_loss)]
                let (min, max) = (start as f64, (end - 1) as f64);
                for (_, id) in shares.iter().take(end).skip(start) {
                    ranked.push(DrfPosition {
                        framework_id: (*id).clone(),
                        min,
                        max,
                    });
                }
                start = end;
            }
            positions.insert(role.clone(), ranked);
        }

        positions
    }

    #[must_use]
    pub fn agent_count(&self) -> usize {
        self.agents.len()
    }

    #[must_use]
    pub fn framework_count(&self) -> usize {
        self.frameworks.len()
    }

    /// Roles with at least one subscribed framework.
    #[must_use]
    pub fn tracked_roles(&self) -> Vec<String> {
        self.role_frameworks.keys().cloned().collect()
    }

    #[must_use]
    pub fn quota_count(&self) -> usize {
        self.quotas.len()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn resources(entries: &[(&str, f64)]) -> ResourceQuantities {
        entries.iter().map(|(name, amount)| (*name, *amount)).collect()
    }

    fn framework(id: &str, roles: &[&str]) -> FrameworkInfo {
        FrameworkInfo::new(FrameworkId::from(id), id, roles.iter().copied())
    }

    #[test]
    fn test_role_tracking_first_and_last_framework() {
        let mut state = AllocatorState::new();

        let changes = state.add_framework(framework("a", &["r1", "r2"]), BTreeSet::new());
        assert_eq!(changes.tracked, vec!["r1", "r2"]);

        let changes = state.add_framework(framework("b", &["r1"]), BTreeSet::new());
        assert!(changes.tracked.is_empty());

        let (_, changes) = state.remove_framework(&FrameworkId::from("a")).unwrap();
        assert_eq!(changes.untracked, vec!["r2"]);
        assert_eq!(state.tracked_roles(), vec!["r1"]);

        let (_, changes) = state.remove_framework(&FrameworkId::from("b")).unwrap();
        assert_eq!(changes.untracked, vec!["r1"]);
        assert!(state.tracked_roles().is_empty());
    }

    #[test]
    fn test_update_framework_moves_roles() {
        let mut state = AllocatorState::new();
        state.add_framework(framework("a", &["r1", "r2"]), BTreeSet::new());
        state
            .record_allocation(&FrameworkId::from("a"), "r1", &resources(&[("cpus", 1.0)]))
            .unwrap();

        let changes = state.update_framework(framework("a", &["r2", "r3"])).unwrap();
        assert_eq!(changes.joined, vec!["r3"]);
        assert_eq!(changes.left, vec!["r1"]);
        assert_eq!(changes.tracked, vec!["r3"]);
        assert_eq!(changes.untracked, vec!["r1"]);
        assert!(state.offered_or_allocated("cpus").abs() < f64::EPSILON);
    }

    #[test]
    fn test_unknown_framework_errors() {
        let mut state = AllocatorState::new();
        let id = FrameworkId::from("missing");
        assert!(matches!(
            state.remove_framework(&id),
            Err(AllocatorError::FrameworkNotFound(_))
        ));
        assert!(matches!(
            state.update_framework(framework("missing", &[])),
            Err(AllocatorError::FrameworkNotFound(_))
        ));
    }

    #[test]
    fn test_suppress_requires_subscription() {
        let mut state = AllocatorState::new();
        state.add_framework(framework("a", &["r1"]), BTreeSet::new());
        let id = FrameworkId::from("a");

        state.suppress_roles(&id, &BTreeSet::from(["r1".to_string()])).unwrap();
        assert!(state.framework(&id).unwrap().suppressed.contains("r1"));

        let err = state
            .suppress_roles(&id, &BTreeSet::from(["r9".to_string()]))
            .unwrap_err();
        assert!(matches!(err, AllocatorError::Conflict(_)));
    }

    #[test]
    fn test_quota_conflicts() {
        let mut state = AllocatorState::new();
        state.set_quota("r1", Quota::default()).unwrap();
        assert!(matches!(
            state.set_quota("r1", Quota::default()),
            Err(AllocatorError::Conflict(_))
        ));
        state.remove_quota("r1").unwrap();
        assert!(matches!(
            state.remove_quota("r1"),
            Err(AllocatorError::QuotaNotFound(_))
        ));
    }

    #[test]
    fn test_resource_queries() {
        let mut state = AllocatorState::new();
        state
            .add_agent(AgentId::from("s1"), resources(&[("cpus", 8.0), ("mem", 1024.0)]))
            .unwrap();
        state
            .add_agent(AgentId::from("s2"), resources(&[("cpus", 4.0)]))
            .unwrap();
        state.add_framework(framework("a", &["r1"]), BTreeSet::new());
        state.add_framework(framework("b", &["r1", "r2"]), BTreeSet::new());

        state
            .record_allocation(&FrameworkId::from("a"), "r1", &resources(&[("cpus", 2.0)]))
            .unwrap();
        state
            .record_allocation(&FrameworkId::from("b"), "r2", &resources(&[("cpus", 1.0)]))
            .unwrap();
        state
            .recover_resources(&FrameworkId::from("a"), "r1", &resources(&[("cpus", 0.5)]))
            .unwrap();

        assert!((state.total("cpus") - 12.0).abs() < f64::EPSILON);
        assert!((state.offered_or_allocated("cpus") - 2.5).abs() < f64::EPSILON);
        assert!((state.quota_allocated("r1", "cpus") - 1.5).abs() < f64::EPSILON);
        assert!(state.quota_allocated("r1", "mem").abs() < f64::EPSILON);
    }

    #[tokio::test(start_paused = true)]
    async fn test_offer_filters_expire() {
        let mut state = AllocatorState::new();
        state.add_agent(AgentId::from("s1"), ResourceQuantities::new()).unwrap();
        state.add_framework(framework("a", &["r1"]), BTreeSet::new());
        let id = FrameworkId::from("a");
        let now = Instant::now();

        state
            .decline_offer(&id, "r1", &AgentId::from("s1"), Duration::from_secs(5), now)
            .unwrap();
        state
            .decline_offer(&id, "r1", &AgentId::from("s1"), Duration::from_secs(60), now)
            .unwrap();
        assert_eq!(state.offer_filters_active("r1", now), 2);
        assert_eq!(state.offer_filters_active("r1", now + Duration::from_secs(10)), 1);
        assert_eq!(state.filtered_frameworks(now + Duration::from_secs(10)), vec![id.clone()]);

        state.expire_offer_filters(now + Duration::from_secs(10));
        state
            .revive_roles(&id, &BTreeSet::from(["r1".to_string()]))
            .unwrap();
        assert_eq!(state.offer_filters_active("r1", now), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unbounded_refusal_clamped() {
        let mut state = AllocatorState::new();
        state.add_agent(AgentId::from("s1"), ResourceQuantities::new()).unwrap();
        state.add_framework(framework("a", &["r1"]), BTreeSet::new());
        let id = FrameworkId::from("a");
        let now = Instant::now();

        state
            .decline_offer(&id, "r1", &AgentId::from("s1"), Duration::MAX, now)
            .unwrap();

        assert_eq!(state.offer_filters_active("r1", now + Duration::from_secs(86_400)), 1);
        assert_eq!(
            state.offer_filters_active("r1", now + MAX_OFFER_FILTER_DURATION),
            0
        );
    }

    #[test]
    fn test_drf_positions_with_ties() {
        let mut state = AllocatorState::new();
        state
            .add_agent(AgentId::from("s1"), resources(&[("cpus", 10.0), ("mem", 100.0)]))
            .unwrap();
        for id in ["a", "b", "c", "d"] {
            state.add_framework(framework(id, &["r1"]), BTreeSet::new());
        }
        // a: 0.1, b: 0.5 (mem), c: 0.1, d: 0.0
        state
            .record_allocation(&FrameworkId::from("a"), "r1", &resources(&[("cpus", 1.0)]))
            .unwrap();
        state
            .record_allocation(&FrameworkId::from("b"), "r1", &resources(&[("cpus", 1.0), ("mem", 50.0)]))
            .unwrap();
        state
            .record_allocation(&FrameworkId::from("c"), "r1", &resources(&[("mem", 10.0)]))
            .unwrap();

        let positions = state.drf_positions();
        let r1 = positions.get("r1").unwrap();
        let by_id: BTreeMap<&str, (f64, f64)> = r1
            .iter()
            .map(|p| (p.framework_id.as_str(), (p.min, p.max)))
            .collect();

        assert_eq!(by_id.get("d"), Some(&(0.0, 0.0)));
        assert_eq!(by_id.get("a"), Some(&(1.0, 2.0)));
        assert_eq!(by_id.get("c"), Some(&(1.0, 2.0)));
        assert_eq!(by_id.get("b"), Some(&(3.0, 3.0)));
    }
}
