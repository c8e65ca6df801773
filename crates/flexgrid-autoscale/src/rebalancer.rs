//! Rebalancer: the periodic per-cluster control loop.
//!
//! Each tick releases stale locks, then runs one pass per registered
//! cluster concurrently. A pass that cannot take its cluster's lock is
//! skipped; a pass whose metrics are unavailable proceeds on zeros.
//!
//! Only a `NoChange` decision releases the lock inside the pass. Once a
//! flex is decided the lock moves to `RequestIssued` whatever the scaler
//! reports, and stays there until `confirm_scaling` or the watchdog.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use flexgrid_metrics::{AppsResponse, BoxFuture, ClusterMetrics, MetricsSource};
use flexgrid_state::{Cluster, ClusterId, TaskRegistry};

use crate::operations::ClusterScaler;
use crate::policy::{ClusterLoad, RebalanceDecision, evaluate};

/// Result of one cluster's rebalance pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PassOutcome {
    /// Another pass or an unconfirmed request holds the lock.
    Skipped,
    /// A flex-up was issued; the lock awaits confirmation. `requested`
    /// may be zero if the scaler had nothing to add.
    FlexedUp { requested: u32, profile: String },
    /// A flex-down was issued; the lock awaits confirmation. `requested`
    /// may be zero if the scaler had nothing to remove.
    FlexedDown { requested: u32 },
    /// Nothing to do. Lock released.
    NoChange,
    /// The scaler returned an error. The lock still awaits confirmation.
    ScaleFailed,
}

/// Drives rebalance passes over every registered cluster.
#[derive(Clone)]
pub struct Rebalancer {
    registry: TaskRegistry,
    metrics: Arc<dyn MetricsSource>,
    scaler: Arc<dyn ClusterScaler>,
    metrics_timeout: Duration,
    scale_timeout: Duration,
    lock_timeout: Duration,
}

impl Rebalancer {
    pub fn new(
        registry: TaskRegistry,
        metrics: Arc<dyn MetricsSource>,
        scaler: Arc<dyn ClusterScaler>,
    ) -> Self {
        Self {
            registry,
            metrics,
            scaler,
            metrics_timeout: Duration::from_secs(10),
            scale_timeout: Duration::from_secs(10),
            lock_timeout: Duration::from_secs(300),
        }
    }

    /// Bound on each metrics query.
    pub fn with_metrics_timeout(mut self, timeout: Duration) -> Self {
        self.metrics_timeout = timeout;
        self
    }

    /// How long a pass waits on a flex call before treating it as issued.
    pub fn with_scale_timeout(mut self, timeout: Duration) -> Self {
        self.scale_timeout = timeout;
        self
    }

    /// How long a lock may stay held before the watchdog releases it.
    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    /// Run one rebalancing tick over every registered cluster.
    ///
    /// Outcomes are returned ordered by cluster ID. A pass that panicked
    /// has no entry; its lock is left for the watchdog.
    pub async fn tick(&self) -> Vec<(ClusterId, PassOutcome)> {
        for stale in self.registry.release_stale_locks(self.lock_timeout) {
            warn!(
                cluster = %stale.cluster_id,
                phase = ?stale.phase,
                held_secs = stale.held_for.as_secs(),
                "rebalance lock held past timeout, force released"
            );
        }

        let clusters = self.registry.clusters();
        if clusters.is_empty() {
            info!("no clusters registered, nothing to rebalance");
            return Vec::new();
        }

        let mut passes = JoinSet::new();
        for cluster in clusters {
            let this = self.clone();
            passes.spawn(async move {
                let outcome = this.rebalance_cluster(&cluster).await;
                (cluster.id, outcome)
            });
        }

        let mut outcomes = Vec::with_capacity(passes.len());
        while let Some(joined) = passes.join_next().await {
            match joined {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => error!(error = %e, "rebalance pass aborted"),
            }
        }
        outcomes.sort_by(|a, b| a.0.cmp(&b.0));
        outcomes
    }

    /// Run a single rebalance pass for `cluster`.
    pub async fn rebalance_cluster(&self, cluster: &Cluster) -> PassOutcome {
        if !self.registry.acquire_lock(&cluster.id) {
            info!(cluster = %cluster.id, "rebalance already in progress, skipping");
            return PassOutcome::Skipped;
        }

        let load = self.fetch_load(cluster).await;

        let decision = evaluate(&cluster.id, &load);
        let requested = match &decision {
            RebalanceDecision::NoChange => {
                self.registry.release_lock(&cluster.id);
                return PassOutcome::NoChange;
            }
            RebalanceDecision::FlexUp { count, profile } => {
                let call = self.scaler.flex_up(&cluster.id, *count, profile);
                self.bounded_scale(&cluster.id, *count, call).await
            }
            RebalanceDecision::FlexDown { count } => {
                let call = self.scaler.flex_down(cluster, *count);
                self.bounded_scale(&cluster.id, *count, call).await
            }
        };

        if !self.registry.mark_scale_requested(&cluster.id) {
            debug!(cluster = %cluster.id, "lock gone before request was recorded, cluster likely deleted");
        }

        let requested = match requested {
            Ok(0) => {
                warn!(cluster = %cluster.id, "scaler issued no request, awaiting confirmation or watchdog");
                0
            }
            Ok(requested) => {
                debug!(cluster = %cluster.id, requested, "awaiting scaling confirmation");
                requested
            }
            Err(e) => {
                warn!(cluster = %cluster.id, error = %e, "scaling action failed, awaiting confirmation or watchdog");
                return PassOutcome::ScaleFailed;
            }
        };

        match decision {
            RebalanceDecision::FlexUp { profile, .. } => PassOutcome::FlexedUp { requested, profile },
            RebalanceDecision::FlexDown { .. } => PassOutcome::FlexedDown { requested },
            RebalanceDecision::NoChange => PassOutcome::NoChange,
        }
    }

    /// Await a flex call for at most `scale_timeout`. A call still running
    /// at the deadline is dropped and counted as issued for `count` nodes.
    async fn bounded_scale(
        &self,
        cluster_id: &str,
        count: u32,
        call: BoxFuture<'_, anyhow::Result<u32>>,
    ) -> anyhow::Result<u32> {
        match tokio::time::timeout(self.scale_timeout, call).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    cluster = %cluster_id,
                    count,
                    timeout_ms = self.scale_timeout.as_millis() as u64,
                    "flex call did not return in time, treating as issued"
                );
                Ok(count)
            }
        }
    }

    /// Close the lock left by a flex request once scaling completes.
    ///
    /// Returns false if the cluster had no outstanding request.
    pub fn confirm_scaling(&self, cluster_id: &str) -> bool {
        match self.registry.confirm_scale_request(cluster_id) {
            Some(held_for) => {
                info!(
                    cluster = %cluster_id,
                    held_ms = held_for.as_millis() as u64,
                    "scaling confirmed, lock released"
                );
                true
            }
            None => {
                debug!(cluster = %cluster_id, "no outstanding scaling request to confirm");
                false
            }
        }
    }

    /// Query both metrics endpoints concurrently; failures count as zero.
    async fn fetch_load(&self, cluster: &Cluster) -> ClusterLoad {
        let (metrics, apps) = tokio::join!(
            tokio::time::timeout(self.metrics_timeout, self.metrics.cluster_metrics(cluster)),
            tokio::time::timeout(self.metrics_timeout, self.metrics.accepted_apps(cluster)),
        );

        let metrics: Option<ClusterMetrics> = match metrics {
            Ok(Ok(Some(m))) => Some(m),
            Ok(Ok(None)) => {
                warn!(cluster = %cluster.id, "metrics response had no clusterMetrics, using zeros");
                None
            }
            Ok(Err(e)) => {
                warn!(cluster = %cluster.id, error = %e, "cluster metrics unavailable, using zeros");
                None
            }
            Err(_) => {
                warn!(
                    cluster = %cluster.id,
                    timeout_ms = self.metrics_timeout.as_millis() as u64,
                    "cluster metrics query timed out, using zeros"
                );
                None
            }
        };

        let apps: Option<AppsResponse> = match apps {
            Ok(Ok(apps)) => Some(apps),
            Ok(Err(e)) => {
                warn!(cluster = %cluster.id, error = %e, "accepted applications unavailable, using zero");
                None
            }
            Err(_) => {
                warn!(
                    cluster = %cluster.id,
                    timeout_ms = self.metrics_timeout.as_millis() as u64,
                    "accepted applications query timed out, using zero"
                );
                None
            }
        };

        ClusterLoad::from_reports(metrics.as_ref(), apps.as_ref())
    }

    /// Run the rebalancer loop until `shutdown` changes.
    pub async fn run(&self, interval: Duration, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        info!(
            interval_secs = interval.as_secs(),
            scale_timeout_secs = self.scale_timeout.as_secs(),
            lock_timeout_secs = self.lock_timeout.as_secs(),
            "rebalancer started"
        );

        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {
                    let outcomes = self.tick().await;
                    debug!(clusters = outcomes.len(), "rebalance tick complete");
                }
                _ = shutdown.changed() => {
                    info!("rebalancer shutting down");
                    break;
                }
            }
        }
    }
}
