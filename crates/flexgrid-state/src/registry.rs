//! TaskRegistry: the lifecycle state machine for worker tasks.
//!
//! Owns the identity map, the five lifecycle state sets, the cluster map
//! with each cluster's member list, and the per-cluster rebalance locks.
//! The registry is `Clone` + `Send` + `Sync` and is shared between the
//! rebalancer, the offer-acceptance path and the status-update path.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::error::{RegistryError, RegistryResult};
use crate::lock::{LockPhase, RebalanceLocks, StaleLock};
use crate::types::*;

/// One ID set per lifecycle state, indexed by `TaskState::index`.
#[derive(Debug, Default)]
struct StateSets {
    sets: [HashSet<TaskId>; 5],
}

impl StateSets {
    fn state_of(&self, task_id: &str) -> Option<TaskState> {
        TaskState::ALL
            .into_iter()
            .find(|s| self.sets[s.index()].contains(task_id))
    }

    /// Evict `task_id` from every set, then add it to `state`'s set.
    fn move_to(&mut self, task_id: &str, state: TaskState) {
        for set in &mut self.sets {
            set.remove(task_id);
        }
        self.sets[state.index()].insert(task_id.to_string());
    }

    fn remove(&mut self, task_id: &str) {
        for set in &mut self.sets {
            set.remove(task_id);
        }
    }

    fn ids(&self, state: TaskState) -> &HashSet<TaskId> {
        &self.sets[state.index()]
    }
}

/// Registry-side view of a cluster. Members are stored by ID and joined
/// against the identity map on read.
#[derive(Debug)]
struct ClusterRecord {
    resource_manager: ResourceManagerAddress,
    min_quota: f64,
    attributes: HashMap<String, String>,
    members: Vec<TaskId>,
}

#[derive(Debug, Default)]
struct Inner {
    tasks: HashMap<TaskId, NodeTask>,
    states: StateSets,
    clusters: HashMap<ClusterId, ClusterRecord>,
    framework_id: Option<String>,
}

impl Inner {
    fn materialize(&self, id: &str, record: &ClusterRecord) -> Cluster {
        Cluster {
            id: id.to_string(),
            resource_manager: record.resource_manager.clone(),
            min_quota: record.min_quota,
            attributes: record.attributes.clone(),
            nodes: record
                .members
                .iter()
                .filter_map(|task_id| self.tasks.get(task_id).cloned())
                .collect(),
        }
    }

    /// Reject a batch of new nodes before anything is written.
    fn check_new_nodes(&self, cluster_id: &str, nodes: &[NodeTask]) -> RegistryResult<()> {
        let mut batch = HashSet::new();
        for node in nodes {
            if node.task_id.is_empty() {
                return Err(RegistryError::InvalidArgument(
                    "task_id cannot be empty".to_string(),
                ));
            }
            if node.cluster_id != cluster_id {
                return Err(RegistryError::InvalidArgument(format!(
                    "task {} belongs to cluster {}, not {cluster_id}",
                    node.task_id, node.cluster_id
                )));
            }
            if self.tasks.contains_key(&node.task_id) || !batch.insert(node.task_id.as_str()) {
                return Err(RegistryError::TaskExists(node.task_id.clone()));
            }
        }
        Ok(())
    }

    /// Append already-checked nodes to a cluster as Pending tasks.
    fn insert_nodes(&mut self, cluster_id: &str, nodes: Vec<NodeTask>) {
        for node in nodes {
            let task_id = node.task_id.clone();
            self.states.move_to(&task_id, TaskState::Pending);
            self.tasks.insert(task_id.clone(), node);
            if let Some(record) = self.clusters.get_mut(cluster_id) {
                record.members.push(task_id);
            }
        }
    }
}

fn require_id(kind: &str, id: &str) -> RegistryResult<()> {
    if id.is_empty() {
        return Err(RegistryError::InvalidArgument(format!(
            "{kind} cannot be empty"
        )));
    }
    Ok(())
}

/// Thread-safe task registry.
#[derive(Clone, Default)]
pub struct TaskRegistry {
    inner: Arc<RwLock<Inner>>,
    locks: Arc<RebalanceLocks>,
}

impl TaskRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    // ── Clusters ───────────────────────────────────────────────────

    /// Register a new cluster and add its initial nodes as Pending tasks.
    pub fn register_cluster(&self, cluster: Cluster) -> RegistryResult<()> {
        require_id("cluster_id", &cluster.id)?;

        let mut inner = self.write();
        if inner.clusters.contains_key(&cluster.id) {
            return Err(RegistryError::ClusterExists(cluster.id));
        }
        inner.check_new_nodes(&cluster.id, &cluster.nodes)?;

        let node_count = cluster.nodes.len();
        inner.clusters.insert(
            cluster.id.clone(),
            ClusterRecord {
                resource_manager: cluster.resource_manager,
                min_quota: cluster.min_quota,
                attributes: cluster.attributes,
                members: Vec::with_capacity(node_count),
            },
        );
        inner.insert_nodes(&cluster.id, cluster.nodes);

        info!(cluster = %cluster.id, nodes = node_count, "cluster registered");
        Ok(())
    }

    /// Append nodes to a registered cluster as Pending tasks.
    pub fn add_nodes(&self, cluster_id: &str, nodes: Vec<NodeTask>) -> RegistryResult<()> {
        require_id("cluster_id", cluster_id)?;

        let mut inner = self.write();
        if !inner.clusters.contains_key(cluster_id) {
            return Err(RegistryError::ClusterNotFound(cluster_id.to_string()));
        }
        inner.check_new_nodes(cluster_id, &nodes)?;

        let node_count = nodes.len();
        inner.insert_nodes(cluster_id, nodes);

        debug!(cluster = %cluster_id, nodes = node_count, "nodes added");
        Ok(())
    }

    /// Mark every member Killable and drop the cluster record.
    ///
    /// Task records stay queryable until `remove_task`, so the kill path can
    /// still enumerate them. Returns the IDs that were marked.
    pub fn delete_cluster(&self, cluster_id: &str) -> RegistryResult<Vec<TaskId>> {
        require_id("cluster_id", cluster_id)?;

        let killed = {
            let mut inner = self.write();
            let record = inner
                .clusters
                .remove(cluster_id)
                .ok_or_else(|| RegistryError::ClusterNotFound(cluster_id.to_string()))?;

            let mut killed = Vec::with_capacity(record.members.len());
            for task_id in record.members {
                if inner.tasks.contains_key(&task_id) {
                    inner.states.move_to(&task_id, TaskState::Killable);
                    killed.push(task_id);
                }
            }
            killed
        };
        self.locks.release(cluster_id);

        info!(cluster = %cluster_id, killable = killed.len(), "cluster deleted");
        Ok(killed)
    }

    pub fn cluster(&self, cluster_id: &str) -> Option<Cluster> {
        let inner = self.read();
        inner
            .clusters
            .get(cluster_id)
            .map(|record| inner.materialize(cluster_id, record))
    }

    /// All registered clusters, ordered by ID.
    pub fn clusters(&self) -> Vec<Cluster> {
        let inner = self.read();
        let mut clusters: Vec<Cluster> = inner
            .clusters
            .iter()
            .map(|(id, record)| inner.materialize(id, record))
            .collect();
        clusters.sort_by(|a, b| a.id.cmp(&b.id));
        clusters
    }

    pub fn cluster_count(&self) -> usize {
        self.read().clusters.len()
    }

    /// Members of `cluster_id` currently in `state`, in registration order.
    pub fn cluster_tasks(&self, cluster_id: &str, state: TaskState) -> Vec<NodeTask> {
        let inner = self.read();
        let Some(record) = inner.clusters.get(cluster_id) else {
            return Vec::new();
        };
        let ids = inner.states.ids(state);
        record
            .members
            .iter()
            .filter(|task_id| ids.contains(*task_id))
            .filter_map(|task_id| inner.tasks.get(task_id).cloned())
            .collect()
    }

    // ── Tasks ──────────────────────────────────────────────────────

    /// Move a task into `state`, evicting it from every other state set.
    ///
    /// No-op if the task is already in `state`.
    pub fn transition(&self, task_id: &str, state: TaskState) -> RegistryResult<()> {
        require_id("task_id", task_id)?;

        let mut inner = self.write();
        if !inner.tasks.contains_key(task_id) {
            return Err(RegistryError::TaskNotFound(task_id.to_string()));
        }
        let from = inner.states.state_of(task_id);
        if from == Some(state) {
            return Ok(());
        }
        inner.states.move_to(task_id, state);

        debug!(task = %task_id, ?from, to = %state, "task transitioned");
        Ok(())
    }

    pub fn make_task_pending(&self, task_id: &str) -> RegistryResult<()> {
        self.transition(task_id, TaskState::Pending)
    }

    pub fn make_task_staging(&self, task_id: &str) -> RegistryResult<()> {
        self.transition(task_id, TaskState::Staging)
    }

    pub fn make_task_active(&self, task_id: &str) -> RegistryResult<()> {
        self.transition(task_id, TaskState::Active)
    }

    pub fn make_task_lost(&self, task_id: &str) -> RegistryResult<()> {
        self.transition(task_id, TaskState::Lost)
    }

    pub fn make_task_killable(&self, task_id: &str) -> RegistryResult<()> {
        self.transition(task_id, TaskState::Killable)
    }

    /// Purge a task from every state set, the identity map and its
    /// cluster's member list. Unknown IDs are a no-op.
    pub fn remove_task(&self, task_id: &str) -> Option<NodeTask> {
        let mut inner = self.write();
        inner.states.remove(task_id);
        let task = inner.tasks.remove(task_id)?;
        if let Some(record) = inner.clusters.get_mut(&task.cluster_id) {
            record.members.retain(|id| id != task_id);
        }
        debug!(task = %task_id, cluster = %task.cluster_id, "task removed");
        Some(task)
    }

    /// Record the host an accepted offer placed the task on.
    pub fn set_task_hostname(&self, task_id: &str, hostname: &str) -> RegistryResult<()> {
        require_id("task_id", task_id)?;
        require_id("hostname", hostname)?;

        let mut inner = self.write();
        let task = inner
            .tasks
            .get_mut(task_id)
            .ok_or_else(|| RegistryError::TaskNotFound(task_id.to_string()))?;
        task.hostname = Some(hostname.to_string());
        Ok(())
    }

    pub fn task(&self, task_id: &str) -> Option<NodeTask> {
        self.read().tasks.get(task_id).cloned()
    }

    pub fn task_state(&self, task_id: &str) -> Option<TaskState> {
        self.read().states.state_of(task_id)
    }

    /// Snapshot of the IDs currently in `state`.
    pub fn task_ids(&self, state: TaskState) -> HashSet<TaskId> {
        self.read().states.ids(state).clone()
    }

    /// Active task descriptors: the Active ID set joined with the identity map.
    pub fn active_tasks(&self) -> Vec<NodeTask> {
        let inner = self.read();
        inner
            .states
            .ids(TaskState::Active)
            .iter()
            .filter_map(|task_id| inner.tasks.get(task_id).cloned())
            .collect()
    }

    pub fn task_count(&self) -> usize {
        self.read().tasks.len()
    }

    // ── Framework ──────────────────────────────────────────────────

    pub fn framework_id(&self) -> Option<String> {
        self.read().framework_id.clone()
    }

    pub fn set_framework_id(&self, framework_id: impl Into<String>) {
        self.write().framework_id = Some(framework_id.into());
    }

    // ── Rebalance locks ────────────────────────────────────────────

    /// Lock `cluster_id` for a rebalance pass iff it is unlocked.
    pub fn acquire_lock(&self, cluster_id: &str) -> bool {
        self.locks.acquire(cluster_id)
    }

    /// Unconditionally unlock `cluster_id`. Always returns true.
    pub fn release_lock(&self, cluster_id: &str) -> bool {
        self.locks.release(cluster_id)
    }

    /// Record that the holder issued a flex request and is now waiting on
    /// its confirmation. Returns false if the cluster is not locked.
    pub fn mark_scale_requested(&self, cluster_id: &str) -> bool {
        self.locks.mark_requested(cluster_id)
    }

    pub fn is_locked(&self, cluster_id: &str) -> bool {
        self.locks.is_locked(cluster_id)
    }

    pub fn lock_phase(&self, cluster_id: &str) -> Option<LockPhase> {
        self.locks.phase(cluster_id)
    }

    pub fn lock_held_since(&self, cluster_id: &str) -> Option<Instant> {
        self.locks.held_since(cluster_id)
    }

    /// Close a two-phase scale request: release the lock only if it is
    /// waiting on a confirmation. Returns how long it was held.
    pub fn confirm_scale_request(&self, cluster_id: &str) -> Option<Duration> {
        self.locks.release_requested(cluster_id)
    }

    /// Force-release locks held for at least `max_hold`.
    pub fn release_stale_locks(&self, max_hold: Duration) -> Vec<StaleLock> {
        self.locks.release_stale(max_hold)
    }
}
