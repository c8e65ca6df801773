//! ResourceManager REST payloads.
//!
//! Every field defaults when absent so a partial payload still decodes.

use serde::{Deserialize, Deserializer, Serialize};

/// Body of `GET /ws/v1/cluster/metrics`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsResponse {
    #[serde(rename = "clusterMetrics", default)]
    pub cluster_metrics: Option<ClusterMetrics>,
}

/// Cluster-wide counters reported by the ResourceManager.
///
/// Memory figures are signed: an over-allocated cluster reports negative
/// `availableMB`. Node and application counts clamp into `u32`, with
/// negative or null values read as zero, so one odd field never rejects
/// the whole body.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterMetrics {
    #[serde(rename = "availableMB")]
    pub available_mb: i64,
    #[serde(rename = "allocatedMB")]
    pub allocated_mb: i64,
    #[serde(rename = "reservedMB")]
    pub reserved_mb: i64,
    #[serde(rename = "activeNodes", deserialize_with = "lenient_count")]
    pub active_nodes: u32,
    #[serde(rename = "unhealthyNodes", deserialize_with = "lenient_count")]
    pub unhealthy_nodes: u32,
    #[serde(rename = "appsPending", deserialize_with = "lenient_count")]
    pub apps_pending: u32,
    #[serde(rename = "appsRunning", deserialize_with = "lenient_count")]
    pub apps_running: u32,
}

fn lenient_count<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
    let raw = Option::<i64>::deserialize(deserializer)?.unwrap_or(0);
    Ok(u32::try_from(raw.max(0)).unwrap_or(u32::MAX))
}

/// Body of `GET /ws/v1/cluster/apps`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppsResponse {
    #[serde(default)]
    pub apps: Option<AppList>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppList {
    #[serde(default)]
    pub app: Option<Vec<AppSummary>>,
}

/// The subset of an application report flexgrid logs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSummary {
    pub id: String,
    pub name: String,
    pub state: String,
    pub queue: String,
}

impl AppsResponse {
    pub fn from_apps(apps: Vec<AppSummary>) -> Self {
        Self {
            apps: Some(AppList { app: Some(apps) }),
        }
    }

    /// Number of listed applications; a missing list counts as zero.
    pub fn count(&self) -> usize {
        self.apps
            .as_ref()
            .and_then(|list| list.app.as_ref())
            .map_or(0, Vec::len)
    }
}
