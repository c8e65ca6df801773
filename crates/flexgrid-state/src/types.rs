//! Domain types for the task registry.
//!
//! These describe the worker tasks flexgrid launches, the clusters they
//! belong to, and the lifecycle states a task moves through.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use flexgrid_core::NodeProfile;

/// Unique identifier for a worker task.
pub type TaskId = String;

/// Unique identifier for a managed cluster.
pub type ClusterId = String;

// ── Task ──────────────────────────────────────────────────────────

/// A single worker node launched (or to be launched) into a cluster.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NodeTask {
    pub task_id: TaskId,
    pub cluster_id: ClusterId,
    /// Host the task was placed on. Unset until an offer is accepted.
    pub hostname: Option<String>,
    /// Placement constraints an offer's attributes must match.
    pub attributes: HashMap<String, String>,
    /// Resources the task asks for.
    pub profile: NodeProfile,
}

impl NodeTask {
    pub fn new(
        task_id: impl Into<TaskId>,
        cluster_id: impl Into<ClusterId>,
        profile: NodeProfile,
    ) -> Self {
        Self {
            task_id: task_id.into(),
            cluster_id: cluster_id.into(),
            hostname: None,
            attributes: HashMap::new(),
            profile,
        }
    }

    pub fn with_hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = Some(hostname.into());
        self
    }

    pub fn with_attributes(mut self, attributes: HashMap<String, String>) -> Self {
        self.attributes = attributes;
        self
    }
}

// ── Lifecycle ─────────────────────────────────────────────────────

/// Lifecycle state of a worker task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    /// Registered, not yet offered for placement.
    Pending,
    /// Placement accepted, launch in flight.
    Staging,
    /// Confirmed running.
    Active,
    /// Launch or runtime failure detected.
    Lost,
    /// Marked for teardown; the kill path may reclaim it.
    Killable,
}

impl TaskState {
    pub const ALL: [TaskState; 5] = [
        TaskState::Pending,
        TaskState::Staging,
        TaskState::Active,
        TaskState::Lost,
        TaskState::Killable,
    ];

    /// Position of this state's set in a `[_; 5]` table.
    pub const fn index(self) -> usize {
        match self {
            TaskState::Pending => 0,
            TaskState::Staging => 1,
            TaskState::Active => 2,
            TaskState::Lost => 3,
            TaskState::Killable => 4,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            TaskState::Pending => "pending",
            TaskState::Staging => "staging",
            TaskState::Active => "active",
            TaskState::Lost => "lost",
            TaskState::Killable => "killable",
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Cluster ───────────────────────────────────────────────────────

/// Where a cluster's ResourceManager REST API listens.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResourceManagerAddress {
    pub host: String,
    pub port: u16,
}

impl ResourceManagerAddress {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// `host:port`, as used for the TCP connect and the Host header.
    pub fn authority(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.authority())
    }
}

/// A managed cluster and its worker tasks.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Cluster {
    pub id: ClusterId,
    pub resource_manager: ResourceManagerAddress,
    /// Minimum number of live workers the cluster keeps.
    pub min_quota: f64,
    /// Placement constraints given to workers added by a flex-up.
    pub attributes: HashMap<String, String>,
    /// Member tasks in registration order.
    pub nodes: Vec<NodeTask>,
}

impl Cluster {
    pub fn new(id: impl Into<ClusterId>, resource_manager: ResourceManagerAddress) -> Self {
        Self {
            id: id.into(),
            resource_manager,
            min_quota: 0.0,
            attributes: HashMap::new(),
            nodes: Vec::new(),
        }
    }

    pub fn with_min_quota(mut self, min_quota: f64) -> Self {
        self.min_quota = min_quota;
        self
    }

    pub fn with_attributes(mut self, attributes: HashMap<String, String>) -> Self {
        self.attributes = attributes;
        self
    }

    pub fn with_nodes(mut self, nodes: Vec<NodeTask>) -> Self {
        self.nodes = nodes;
        self
    }
}
