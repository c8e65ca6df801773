//! Startup registration of configured clusters.

use anyhow::{Context, anyhow};
use tracing::debug;

use flexgrid_core::{ClusterConfig, FlexConfig};
use flexgrid_state::{Cluster, NodeTask, ResourceManagerAddress, TaskRegistry};

/// Register every configured cluster. Returns how many were registered.
pub fn register_clusters(registry: &TaskRegistry, config: &FlexConfig) -> anyhow::Result<usize> {
    for cluster_config in &config.clusters {
        let cluster = build_cluster(config, cluster_config)?;
        registry
            .register_cluster(cluster)
            .with_context(|| format!("registering cluster {}", cluster_config.id))?;
    }
    Ok(config.clusters.len())
}

fn build_cluster(config: &FlexConfig, cc: &ClusterConfig) -> anyhow::Result<Cluster> {
    let profile = config
        .profile(&cc.profile)
        .ok_or_else(|| anyhow!("cluster {}: unknown profile {}", cc.id, cc.profile))?;

    let nodes = (0..cc.initial_nodes)
        .map(|i| {
            NodeTask::new(format!("{}-init-{i}", cc.id), cc.id.clone(), profile.clone())
                .with_attributes(cc.attributes.clone())
        })
        .collect();

    debug!(
        cluster = %cc.id,
        initial_nodes = cc.initial_nodes,
        profile = %profile.name,
        "cluster configured"
    );

    Ok(Cluster::new(
        cc.id.clone(),
        ResourceManagerAddress::new(cc.resource_manager_host.clone(), cc.resource_manager_port),
    )
    .with_min_quota(cc.min_quota)
    .with_attributes(cc.attributes.clone())
    .with_nodes(nodes))
}
