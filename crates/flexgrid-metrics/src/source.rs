//! The metrics collaborator seam.

use flexgrid_state::Cluster;

use crate::error::MetricsResult;
use crate::types::{AppsResponse, ClusterMetrics};

/// Boxed future returned by collaborator traits.
pub type BoxFuture<'a, T> =
    std::pin::Pin<Box<dyn std::future::Future<Output = T> + Send + 'a>>;

/// Source of live load figures for a cluster.
///
/// Either query may fail or return partial data; callers treat anything
/// missing as zero.
pub trait MetricsSource: Send + Sync {
    /// Node, memory and application counters. `None` when the endpoint
    /// answered without a metrics object.
    fn cluster_metrics<'a>(
        &'a self,
        cluster: &'a Cluster,
    ) -> BoxFuture<'a, MetricsResult<Option<ClusterMetrics>>>;

    /// Applications submitted but not yet scheduled (state `ACCEPTED`).
    fn accepted_apps<'a>(&'a self, cluster: &'a Cluster) -> BoxFuture<'a, MetricsResult<AppsResponse>>;
}
