//! ResourceManager REST client.
//!
//! One short-lived HTTP/1.1 connection per query, bounded by a timeout
//! covering connect, request and body.

use std::time::Duration;

use http_body_util::BodyExt;
use serde::de::DeserializeOwned;
use tracing::debug;

use flexgrid_state::{Cluster, ResourceManagerAddress};

use crate::error::{MetricsError, MetricsResult};
use crate::source::{BoxFuture, MetricsSource};
use crate::types::{AppsResponse, ClusterMetrics, MetricsResponse};

const METRICS_PATH: &str = "/ws/v1/cluster/metrics";
const ACCEPTED_APPS_PATH: &str = "/ws/v1/cluster/apps?states=ACCEPTED";

/// Queries a cluster's ResourceManager for its live metrics.
#[derive(Debug, Clone)]
pub struct ResourceManagerClient {
    timeout: Duration,
}

impl Default for ResourceManagerClient {
    fn default() -> Self {
        Self::new(Duration::from_secs(10))
    }
}

impl ResourceManagerClient {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Fetch `path` from the ResourceManager and decode the JSON body.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        rm: &ResourceManagerAddress,
        path: &str,
    ) -> MetricsResult<T> {
        let uri = format!("{}{path}", rm.base_url());

        let body = tokio::time::timeout(self.timeout, fetch(rm, path, &uri))
            .await
            .map_err(|_| MetricsError::Timeout(uri.clone()))??;

        serde_json::from_slice(&body).map_err(|e| MetricsError::Decode {
            uri,
            reason: e.to_string(),
        })
    }
}

async fn fetch(rm: &ResourceManagerAddress, path: &str, uri: &str) -> MetricsResult<bytes::Bytes> {
    let authority = rm.authority();

    let stream = tokio::net::TcpStream::connect(&authority)
        .await
        .map_err(|e| MetricsError::Connect(authority.clone(), e.to_string()))?;

    let io = hyper_util::rt::TokioIo::new(stream);
    let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
        .await
        .map_err(|e| MetricsError::Connect(authority.clone(), e.to_string()))?;

    // Drive the connection in the background.
    tokio::spawn(async move {
        let _ = conn.await;
    });

    let req = http::Request::builder()
        .method("GET")
        .uri(path)
        .header("host", &authority)
        .header("accept", "application/json")
        .header("user-agent", "flexgrid-metrics/0.1")
        .body(http_body_util::Empty::<bytes::Bytes>::new())
        .map_err(|e| MetricsError::Http(e.to_string()))?;

    let resp = sender
        .send_request(req)
        .await
        .map_err(|e| MetricsError::Http(e.to_string()))?;

    let status = resp.status();
    if !status.is_success() {
        return Err(MetricsError::Status {
            status: status.as_u16(),
            uri: uri.to_string(),
        });
    }

    let body = resp
        .into_body()
        .collect()
        .await
        .map_err(|e| MetricsError::Http(e.to_string()))?
        .to_bytes();
    debug!(%uri, bytes = body.len(), "resource manager responded");
    Ok(body)
}

impl MetricsSource for ResourceManagerClient {
    fn cluster_metrics<'a>(
        &'a self,
        cluster: &'a Cluster,
    ) -> BoxFuture<'a, MetricsResult<Option<ClusterMetrics>>> {
        Box::pin(async move {
            let resp: MetricsResponse = self
                .get_json(&cluster.resource_manager, METRICS_PATH)
                .await?;
            Ok(resp.cluster_metrics)
        })
    }

    fn accepted_apps<'a>(&'a self, cluster: &'a Cluster) -> BoxFuture<'a, MetricsResult<AppsResponse>> {
        Box::pin(async move {
            self.get_json(&cluster.resource_manager, ACCEPTED_APPS_PATH)
                .await
        })
    }
}
