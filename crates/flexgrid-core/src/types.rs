//! Shared types used across flexgrid crates.

use serde::{Deserialize, Serialize};

/// Name of the profile the rebalancer grows clusters with.
pub const DEFAULT_PROFILE: &str = "small";

/// Sizing profile for a worker node launched into a cluster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeProfile {
    pub name: String,
    /// CPU shares requested from an offer.
    pub cpus: f64,
    /// Memory requested from an offer, in MB.
    pub memory_mb: u64,
}

impl NodeProfile {
    pub fn new(name: impl Into<String>, cpus: f64, memory_mb: u64) -> Self {
        Self {
            name: name.into(),
            cpus,
            memory_mb,
        }
    }

    /// The built-in profile table used when a config declares none.
    pub fn builtin() -> Vec<NodeProfile> {
        vec![
            NodeProfile::new("zero", 0.0, 0),
            NodeProfile::new("small", 1.0, 1100),
            NodeProfile::new("medium", 2.0, 2048),
            NodeProfile::new("large", 4.0, 4096),
        ]
    }
}
