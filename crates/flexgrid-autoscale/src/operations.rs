//! Cluster scaling operations.
//!
//! `ClusterScaler` is the seam between the rebalancer and whatever
//! actually launches or tears down worker nodes. `RegistryScaler` is the
//! in-process implementation: it records the request in the task registry
//! and leaves the launch and kill paths to pick the tasks up from there.

use anyhow::{Context, anyhow};
use tracing::{debug, info};

use flexgrid_core::NodeProfile;
use flexgrid_metrics::BoxFuture;
use flexgrid_state::{Cluster, NodeTask, TaskRegistry, TaskState};

/// Order in which flex-down picks victims. Tasks that never started go
/// first; running ones go last.
const FLEX_DOWN_ORDER: [TaskState; 4] = [
    TaskState::Pending,
    TaskState::Lost,
    TaskState::Staging,
    TaskState::Active,
];

/// Performs flex requests on behalf of the rebalancer.
///
/// Both operations return how many nodes were actually requested, which
/// may be fewer than asked for. Zero means nothing was issued.
pub trait ClusterScaler: Send + Sync {
    fn flex_up<'a>(
        &'a self,
        cluster_id: &'a str,
        count: u32,
        profile: &'a str,
    ) -> BoxFuture<'a, anyhow::Result<u32>>;

    fn flex_down<'a>(&'a self, cluster: &'a Cluster, count: u32) -> BoxFuture<'a, anyhow::Result<u32>>;
}

/// Scales clusters by editing the task registry.
#[derive(Clone)]
pub struct RegistryScaler {
    registry: TaskRegistry,
    profiles: Vec<NodeProfile>,
}

impl RegistryScaler {
    pub fn new(registry: TaskRegistry) -> Self {
        Self {
            registry,
            profiles: NodeProfile::builtin(),
        }
    }

    /// Replace the built-in profile table.
    pub fn with_profiles(mut self, profiles: Vec<NodeProfile>) -> Self {
        self.profiles = profiles;
        self
    }

    fn profile(&self, name: &str) -> Option<&NodeProfile> {
        self.profiles.iter().find(|p| p.name == name)
    }

    /// Add `count` Pending tasks of `profile` to `cluster_id`.
    pub fn grow(&self, cluster_id: &str, count: u32, profile: &str) -> anyhow::Result<u32> {
        let profile = self
            .profile(profile)
            .cloned()
            .ok_or_else(|| anyhow!("unknown node profile: {profile}"))?;
        let cluster = self
            .registry
            .cluster(cluster_id)
            .ok_or_else(|| anyhow!("cluster not found: {cluster_id}"))?;

        let nodes: Vec<NodeTask> = (0..count)
            .map(|_| {
                NodeTask::new(
                    format!("{cluster_id}-{}", uuid::Uuid::new_v4()),
                    cluster_id,
                    profile.clone(),
                )
                .with_attributes(cluster.attributes.clone())
            })
            .collect();

        self.registry
            .add_nodes(cluster_id, nodes)
            .with_context(|| format!("adding nodes to {cluster_id}"))?;

        info!(cluster = %cluster_id, count, profile = %profile.name, "flex up requested");
        Ok(count)
    }

    /// Mark up to `count` members Killable without dropping the live
    /// member count below the cluster's `min_quota`.
    pub fn shrink(&self, cluster_id: &str, count: u32) -> anyhow::Result<u32> {
        let cluster = self
            .registry
            .cluster(cluster_id)
            .ok_or_else(|| anyhow!("cluster not found: {cluster_id}"))?;

        let live = FLEX_DOWN_ORDER
            .iter()
            .map(|state| self.registry.cluster_tasks(cluster_id, *state).len())
            .sum::<usize>();
        let floor = cluster.min_quota.max(0.0).ceil() as usize;
        let budget = live.saturating_sub(floor).min(count as usize);

        if budget == 0 {
            debug!(cluster = %cluster_id, live, floor, "flex down blocked by min quota");
            return Ok(0);
        }

        let victims: Vec<NodeTask> = FLEX_DOWN_ORDER
            .iter()
            .flat_map(|state| self.registry.cluster_tasks(cluster_id, *state))
            .take(budget)
            .collect();

        for task in &victims {
            self.registry
                .make_task_killable(&task.task_id)
                .with_context(|| format!("marking {} killable", task.task_id))?;
        }

        info!(cluster = %cluster_id, requested = victims.len(), live, floor, "flex down requested");
        Ok(victims.len() as u32)
    }
}

impl ClusterScaler for RegistryScaler {
    fn flex_up<'a>(
        &'a self,
        cluster_id: &'a str,
        count: u32,
        profile: &'a str,
    ) -> BoxFuture<'a, anyhow::Result<u32>> {
        Box::pin(async move { self.grow(cluster_id, count, profile) })
    }

    fn flex_down<'a>(&'a self, cluster: &'a Cluster, count: u32) -> BoxFuture<'a, anyhow::Result<u32>> {
        Box::pin(async move { self.shrink(&cluster.id, count) })
    }
}
