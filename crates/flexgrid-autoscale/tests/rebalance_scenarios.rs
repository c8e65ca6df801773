//! End-to-end rebalance passes against in-memory collaborators.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use flexgrid_autoscale::{ClusterScaler, PassOutcome, Rebalancer, RegistryScaler};
use flexgrid_core::NodeProfile;
use flexgrid_metrics::{
    AppSummary, AppsResponse, BoxFuture, ClusterMetrics, MetricsError, MetricsResult, MetricsSource,
};
use flexgrid_state::{Cluster, LockPhase, NodeTask, ResourceManagerAddress, TaskRegistry, TaskState};

// ── Collaborators ─────────────────────────────────────────────────

#[derive(Clone)]
enum Reply {
    Metrics(ClusterMetrics, AppsResponse),
    Fail,
    Hang,
}

/// Canned ResourceManager replies keyed by cluster ID.
#[derive(Default)]
struct MockMetrics {
    replies: HashMap<String, Reply>,
}

impl MockMetrics {
    fn with(mut self, cluster_id: &str, reply: Reply) -> Self {
        self.replies.insert(cluster_id.to_string(), reply);
        self
    }

    fn reply(&self, cluster: &Cluster) -> Reply {
        self.replies.get(&cluster.id).cloned().unwrap_or(Reply::Fail)
    }
}

impl MetricsSource for MockMetrics {
    fn cluster_metrics<'a>(
        &'a self,
        cluster: &'a Cluster,
    ) -> BoxFuture<'a, MetricsResult<Option<ClusterMetrics>>> {
        Box::pin(async move {
            match self.reply(cluster) {
                Reply::Metrics(m, _) => Ok(Some(m)),
                Reply::Fail => Err(MetricsError::Connect(cluster.resource_manager.authority(), "refused".into())),
                Reply::Hang => std::future::pending().await,
            }
        })
    }

    fn accepted_apps<'a>(&'a self, cluster: &'a Cluster) -> BoxFuture<'a, MetricsResult<AppsResponse>> {
        Box::pin(async move {
            match self.reply(cluster) {
                Reply::Metrics(_, apps) => Ok(apps),
                Reply::Fail => Err(MetricsError::Status {
                    status: 500,
                    uri: "/ws/v1/cluster/apps".into(),
                }),
                Reply::Hang => std::future::pending().await,
            }
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Call {
    Up { cluster: String, count: u32, profile: String },
    Down { cluster: String, count: u32 },
}

/// Records every flex request and reports it as fully issued.
#[derive(Default)]
struct RecordingScaler {
    calls: Mutex<Vec<Call>>,
}

impl RecordingScaler {
    fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }
}

impl ClusterScaler for RecordingScaler {
    fn flex_up<'a>(
        &'a self,
        cluster_id: &'a str,
        count: u32,
        profile: &'a str,
    ) -> BoxFuture<'a, anyhow::Result<u32>> {
        self.calls.lock().unwrap().push(Call::Up {
            cluster: cluster_id.to_string(),
            count,
            profile: profile.to_string(),
        });
        Box::pin(async move { Ok(count) })
    }

    fn flex_down<'a>(&'a self, cluster: &'a Cluster, count: u32) -> BoxFuture<'a, anyhow::Result<u32>> {
        self.calls.lock().unwrap().push(Call::Down {
            cluster: cluster.id.clone(),
            count,
        });
        Box::pin(async move { Ok(count) })
    }
}

// ── Helpers ───────────────────────────────────────────────────────

fn metrics(active: u32, pending: u32, running: u32) -> ClusterMetrics {
    ClusterMetrics {
        active_nodes: active,
        apps_pending: pending,
        apps_running: running,
        ..ClusterMetrics::default()
    }
}

fn accepted(n: usize) -> AppsResponse {
    AppsResponse::from_apps(
        (0..n)
            .map(|i| AppSummary {
                id: format!("application_{i}"),
                state: "ACCEPTED".into(),
                ..AppSummary::default()
            })
            .collect(),
    )
}

fn register(registry: &TaskRegistry, id: &str, nodes: usize) -> Cluster {
    let small = NodeProfile::new("small", 1.0, 1100);
    let nodes = (0..nodes)
        .map(|i| NodeTask::new(format!("{id}-t{i}"), id, small.clone()))
        .collect();
    let cluster = Cluster::new(id, ResourceManagerAddress::new(format!("{id}.rm"), 8088)).with_nodes(nodes);
    registry.register_cluster(cluster).unwrap();
    registry.cluster(id).unwrap()
}

fn rebalancer(registry: &TaskRegistry, metrics: MockMetrics, scaler: Arc<RecordingScaler>) -> Rebalancer {
    Rebalancer::new(registry.clone(), Arc::new(metrics), scaler)
        .with_metrics_timeout(Duration::from_millis(200))
        .with_lock_timeout(Duration::from_secs(60))
}

// ── Scenarios ─────────────────────────────────────────────────────

#[tokio::test]
async fn empty_cluster_with_pending_apps_flexes_up_small() {
    let registry = TaskRegistry::new();
    let cluster = register(&registry, "c1", 0);
    let scaler = Arc::new(RecordingScaler::default());
    let mock = MockMetrics::default().with("c1", Reply::Metrics(metrics(0, 3, 0), accepted(0)));
    let rebalancer = rebalancer(&registry, mock, scaler.clone());

    rebalancer.rebalance_cluster(&cluster).await;

    assert_eq!(
        scaler.calls(),
        vec![Call::Up {
            cluster: "c1".into(),
            count: 1,
            profile: "small".into()
        }]
    );
    assert!(registry.is_locked("c1"));
    assert_eq!(registry.lock_phase("c1"), Some(LockPhase::RequestIssued));
}

#[tokio::test]
async fn idle_cluster_flexes_down_one() {
    let registry = TaskRegistry::new();
    let cluster = register(&registry, "c1", 2);
    let scaler = Arc::new(RecordingScaler::default());
    let mock = MockMetrics::default().with("c1", Reply::Metrics(metrics(2, 0, 0), accepted(0)));
    let rebalancer = rebalancer(&registry, mock, scaler.clone());

    let outcome = rebalancer.rebalance_cluster(&cluster).await;

    assert_eq!(outcome, PassOutcome::FlexedDown { requested: 1 });
    assert_eq!(
        scaler.calls(),
        vec![Call::Down {
            cluster: "c1".into(),
            count: 1
        }]
    );
    assert!(registry.is_locked("c1"));
}

#[tokio::test]
async fn busy_cluster_with_nothing_waiting_releases_lock() {
    let registry = TaskRegistry::new();
    let cluster = register(&registry, "c1", 2);
    let scaler = Arc::new(RecordingScaler::default());
    let mock = MockMetrics::default().with("c1", Reply::Metrics(metrics(2, 0, 1), accepted(0)));
    let rebalancer = rebalancer(&registry, mock, scaler.clone());

    let outcome = rebalancer.rebalance_cluster(&cluster).await;

    assert_eq!(outcome, PassOutcome::NoChange);
    assert!(scaler.calls().is_empty());
    assert!(!registry.is_locked("c1"));
}

#[tokio::test]
async fn null_application_list_counts_as_zero() {
    let registry = TaskRegistry::new();
    let cluster = register(&registry, "c1", 2);
    let scaler = Arc::new(RecordingScaler::default());
    let mock = MockMetrics::default().with("c1", Reply::Metrics(metrics(2, 0, 1), AppsResponse { apps: None }));
    let rebalancer = rebalancer(&registry, mock, scaler.clone());

    assert_eq!(rebalancer.rebalance_cluster(&cluster).await, PassOutcome::NoChange);
    assert!(scaler.calls().is_empty());
}

#[tokio::test]
async fn accepted_apps_flex_up() {
    let registry = TaskRegistry::new();
    let cluster = register(&registry, "c1", 2);
    let scaler = Arc::new(RecordingScaler::default());
    let mock = MockMetrics::default().with("c1", Reply::Metrics(metrics(2, 0, 1), accepted(3)));
    let rebalancer = rebalancer(&registry, mock, scaler.clone());

    let outcome = rebalancer.rebalance_cluster(&cluster).await;
    assert_eq!(
        outcome,
        PassOutcome::FlexedUp {
            requested: 1,
            profile: "small".into()
        }
    );
}

#[tokio::test]
async fn unreachable_resource_manager_degrades_to_zero() {
    let registry = TaskRegistry::new();
    let cluster = register(&registry, "c1", 1);
    let scaler = Arc::new(RecordingScaler::default());
    let rebalancer = rebalancer(&registry, MockMetrics::default(), scaler.clone());

    // All zeros matches no flex rule.
    assert_eq!(rebalancer.rebalance_cluster(&cluster).await, PassOutcome::NoChange);
    assert!(scaler.calls().is_empty());
    assert!(!registry.is_locked("c1"));
}

#[tokio::test]
async fn locked_cluster_is_skipped_by_tick() {
    let registry = TaskRegistry::new();
    register(&registry, "c1", 0);
    let scaler = Arc::new(RecordingScaler::default());
    let mock = MockMetrics::default().with("c1", Reply::Metrics(metrics(0, 3, 0), accepted(0)));
    let rebalancer = rebalancer(&registry, mock, scaler.clone());

    assert!(registry.acquire_lock("c1"));
    let outcomes = rebalancer.tick().await;

    assert_eq!(outcomes, vec![("c1".to_string(), PassOutcome::Skipped)]);
    assert!(scaler.calls().is_empty());
}

#[tokio::test]
async fn slow_cluster_does_not_block_others() {
    let registry = TaskRegistry::new();
    register(&registry, "fast", 0);
    register(&registry, "slow", 2);
    let scaler = Arc::new(RecordingScaler::default());
    let mock = MockMetrics::default()
        .with("fast", Reply::Metrics(metrics(0, 1, 0), accepted(0)))
        .with("slow", Reply::Hang);
    let rebalancer = rebalancer(&registry, mock, scaler.clone());

    let outcomes = tokio::time::timeout(Duration::from_secs(5), rebalancer.tick())
        .await
        .unwrap();

    assert_eq!(
        outcomes,
        vec![
            (
                "fast".to_string(),
                PassOutcome::FlexedUp {
                    requested: 1,
                    profile: "small".into()
                }
            ),
            ("slow".to_string(), PassOutcome::NoChange),
        ]
    );
    assert!(!registry.is_locked("slow"));
}

#[tokio::test]
async fn confirmation_reopens_cluster_for_next_tick() {
    let registry = TaskRegistry::new();
    register(&registry, "c1", 0);
    let scaler = Arc::new(RecordingScaler::default());
    let mock = MockMetrics::default().with("c1", Reply::Metrics(metrics(0, 3, 0), accepted(0)));
    let rebalancer = rebalancer(&registry, mock, scaler.clone());

    rebalancer.tick().await;
    assert_eq!(rebalancer.tick().await[0].1, PassOutcome::Skipped);

    assert!(rebalancer.confirm_scaling("c1"));
    assert!(matches!(rebalancer.tick().await[0].1, PassOutcome::FlexedUp { .. }));
    assert_eq!(scaler.calls().len(), 2);
}

#[tokio::test]
async fn watchdog_releases_unconfirmed_request() {
    let registry = TaskRegistry::new();
    register(&registry, "c1", 0);
    let scaler = Arc::new(RecordingScaler::default());
    let mock = MockMetrics::default().with("c1", Reply::Metrics(metrics(0, 3, 0), accepted(0)));
    let rebalancer = rebalancer(&registry, mock, scaler.clone()).with_lock_timeout(Duration::from_millis(50));

    rebalancer.tick().await;
    assert_eq!(registry.lock_phase("c1"), Some(LockPhase::RequestIssued));

    tokio::time::sleep(Duration::from_millis(100)).await;
    let outcomes = rebalancer.tick().await;

    assert!(matches!(outcomes[0].1, PassOutcome::FlexedUp { .. }));
    assert_eq!(scaler.calls().len(), 2);
}

#[tokio::test]
async fn registry_scaler_grows_and_shrinks_cluster() {
    let registry = TaskRegistry::new();
    let cluster = register(&registry, "c1", 0);
    let scaler = Arc::new(RegistryScaler::new(registry.clone()));
    let mock = MockMetrics::default().with("c1", Reply::Metrics(metrics(0, 2, 0), accepted(0)));
    let rebalancer = Rebalancer::new(registry.clone(), Arc::new(mock), scaler);

    rebalancer.rebalance_cluster(&cluster).await;
    let pending = registry.cluster_tasks("c1", TaskState::Pending);
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].profile.name, "small");

    assert!(rebalancer.confirm_scaling("c1"));
    registry.make_task_active(&pending[0].task_id).unwrap();

    let mock = MockMetrics::default().with("c1", Reply::Metrics(metrics(1, 0, 0), accepted(0)));
    let rebalancer = Rebalancer::new(
        registry.clone(),
        Arc::new(mock),
        Arc::new(RegistryScaler::new(registry.clone())),
    );
    let cluster = registry.cluster("c1").unwrap();
    assert_eq!(
        rebalancer.rebalance_cluster(&cluster).await,
        PassOutcome::FlexedDown { requested: 1 }
    );
    assert_eq!(registry.task_state(&pending[0].task_id), Some(TaskState::Killable));
}

#[tokio::test]
async fn idle_flex_down_holds_lock_even_when_nothing_can_be_removed() {
    let registry = TaskRegistry::new();
    let cluster = register(&registry, "c1", 0);
    let mock = MockMetrics::default().with("c1", Reply::Metrics(metrics(2, 0, 0), accepted(0)));
    let rebalancer = Rebalancer::new(
        registry.clone(),
        Arc::new(mock),
        Arc::new(RegistryScaler::new(registry.clone())),
    );

    let outcome = rebalancer.rebalance_cluster(&cluster).await;

    assert_eq!(outcome, PassOutcome::FlexedDown { requested: 0 });
    assert_eq!(registry.lock_phase("c1"), Some(LockPhase::RequestIssued));
}

/// Never completes a flex call.
struct HangingScaler;

impl ClusterScaler for HangingScaler {
    fn flex_up<'a>(&'a self, _: &'a str, _: u32, _: &'a str) -> BoxFuture<'a, anyhow::Result<u32>> {
        Box::pin(std::future::pending())
    }

    fn flex_down<'a>(&'a self, _: &'a Cluster, _: u32) -> BoxFuture<'a, anyhow::Result<u32>> {
        Box::pin(std::future::pending())
    }
}

#[tokio::test]
async fn hung_scaler_does_not_stall_the_tick() {
    let registry = TaskRegistry::new();
    register(&registry, "a", 0);
    register(&registry, "b", 0);
    let mock = MockMetrics::default()
        .with("a", Reply::Metrics(metrics(0, 2, 0), accepted(0)))
        .with("b", Reply::Metrics(metrics(0, 2, 0), accepted(0)));
    let rebalancer = Rebalancer::new(registry.clone(), Arc::new(mock), Arc::new(HangingScaler))
        .with_metrics_timeout(Duration::from_millis(200))
        .with_scale_timeout(Duration::from_millis(100));

    let outcomes = tokio::time::timeout(Duration::from_secs(2), rebalancer.tick())
        .await
        .unwrap();

    assert_eq!(outcomes.len(), 2);
    for (id, outcome) in &outcomes {
        assert!(matches!(outcome, PassOutcome::FlexedUp { requested: 1, .. }), "{id}: {outcome:?}");
        assert_eq!(registry.lock_phase(id), Some(LockPhase::RequestIssued));
    }
}
