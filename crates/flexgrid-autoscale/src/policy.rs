//! Rebalance policy.
//!
//! Pure functions over a cluster's load figures. No I/O, no locking.

use tracing::{debug, info};

use flexgrid_core::DEFAULT_PROFILE;
use flexgrid_metrics::{AppsResponse, ClusterMetrics};

/// Nodes added or removed by a single decision.
pub const FLEX_STEP: u32 = 1;

/// Load figures for one cluster, gathered from both metrics queries.
///
/// A query that failed or returned nothing contributes zeros.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClusterLoad {
    pub available_mb: i64,
    pub allocated_mb: i64,
    pub reserved_mb: i64,
    pub active_nodes: u32,
    pub unhealthy_nodes: u32,
    pub apps_pending: u32,
    pub apps_running: u32,
    /// Applications admitted by the scheduler but not yet running.
    pub accepted_apps: usize,
}

impl ClusterLoad {
    pub fn from_reports(metrics: Option<&ClusterMetrics>, apps: Option<&AppsResponse>) -> Self {
        let m = metrics.cloned().unwrap_or_default();
        Self {
            available_mb: m.available_mb,
            allocated_mb: m.allocated_mb,
            reserved_mb: m.reserved_mb,
            active_nodes: m.active_nodes,
            unhealthy_nodes: m.unhealthy_nodes,
            apps_pending: m.apps_pending,
            apps_running: m.apps_running,
            accepted_apps: apps.map_or(0, AppsResponse::count),
        }
    }
}

/// What a rebalance pass should do with a cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RebalanceDecision {
    /// Request `count` more nodes of `profile`.
    FlexUp { count: u32, profile: String },
    /// Request `count` fewer nodes.
    FlexDown { count: u32 },
    /// Leave the cluster alone.
    NoChange,
}

/// Apply the rebalance rules to `load`. The first matching rule wins.
pub fn evaluate(cluster_id: &str, load: &ClusterLoad) -> RebalanceDecision {
    debug!(
        cluster = %cluster_id,
        available_mb = load.available_mb,
        allocated_mb = load.allocated_mb,
        reserved_mb = load.reserved_mb,
        active_nodes = load.active_nodes,
        unhealthy_nodes = load.unhealthy_nodes,
        apps_pending = load.apps_pending,
        apps_running = load.apps_running,
        accepted_apps = load.accepted_apps,
        "evaluating cluster load"
    );

    if load.active_nodes == 0 && load.apps_pending > 0 {
        info!(
            cluster = %cluster_id,
            apps_pending = load.apps_pending,
            "no active nodes but applications pending, flexing up"
        );
        return flex_up();
    }

    if load.apps_pending == 0 && load.apps_running == 0 && load.active_nodes > 0 {
        info!(
            cluster = %cluster_id,
            active_nodes = load.active_nodes,
            "cluster idle, flexing down"
        );
        return RebalanceDecision::FlexDown { count: FLEX_STEP };
    }

    if load.accepted_apps > 0 {
        info!(
            cluster = %cluster_id,
            accepted_apps = load.accepted_apps,
            "applications waiting in ACCEPTED, flexing up"
        );
        return flex_up();
    }

    info!(cluster = %cluster_id, "nothing to rebalance");
    RebalanceDecision::NoChange
}

fn flex_up() -> RebalanceDecision {
    RebalanceDecision::FlexUp {
        count: FLEX_STEP,
        profile: DEFAULT_PROFILE.to_string(),
    }
}
