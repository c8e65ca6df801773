//! flexd.toml configuration parser.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, bail};

use crate::types::{DEFAULT_PROFILE, NodeProfile};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FlexConfig {
    #[serde(default)]
    pub rebalancer: RebalancerConfig,
    /// Node profiles keyed by name. Falls back to the built-in table when empty.
    #[serde(default)]
    pub profiles: HashMap<String, ProfileConfig>,
    /// Clusters registered at daemon startup.
    #[serde(default)]
    pub clusters: Vec<ClusterConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RebalancerConfig {
    /// Tick length, e.g. "30s".
    #[serde(default = "default_interval")]
    pub interval: String,
    /// Upper bound on a single metrics query.
    #[serde(default = "default_metrics_timeout")]
    pub metrics_timeout: String,
    /// Upper bound on a single flex call.
    #[serde(default = "default_scale_timeout")]
    pub scale_timeout: String,
    /// How long a lock may stay held awaiting a scaling confirmation.
    #[serde(default = "default_lock_timeout")]
    pub lock_timeout: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileConfig {
    pub cpus: f64,
    pub memory_mb: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    pub id: String,
    pub resource_manager_host: String,
    #[serde(default = "default_rm_port")]
    pub resource_manager_port: u16,
    #[serde(default)]
    pub min_quota: f64,
    /// Worker nodes registered together with the cluster.
    #[serde(default)]
    pub initial_nodes: u32,
    #[serde(default = "default_profile")]
    pub profile: String,
    /// Placement constraints every worker of this cluster carries.
    #[serde(default)]
    pub attributes: HashMap<String, String>,
}

fn default_interval() -> String {
    "30s".to_string()
}

fn default_metrics_timeout() -> String {
    "10s".to_string()
}

fn default_scale_timeout() -> String {
    "10s".to_string()
}

fn default_lock_timeout() -> String {
    "5m".to_string()
}

fn default_rm_port() -> u16 {
    8088
}

fn default_profile() -> String {
    DEFAULT_PROFILE.to_string()
}

impl Default for RebalancerConfig {
    fn default() -> Self {
        Self {
            interval: default_interval(),
            metrics_timeout: default_metrics_timeout(),
            scale_timeout: default_scale_timeout(),
            lock_timeout: default_lock_timeout(),
        }
    }
}

impl RebalancerConfig {
    pub fn interval(&self) -> anyhow::Result<Duration> {
        non_zero_duration("rebalancer.interval", &self.interval)
    }

    pub fn metrics_timeout(&self) -> anyhow::Result<Duration> {
        non_zero_duration("rebalancer.metrics_timeout", &self.metrics_timeout)
    }

    pub fn scale_timeout(&self) -> anyhow::Result<Duration> {
        non_zero_duration("rebalancer.scale_timeout", &self.scale_timeout)
    }

    pub fn lock_timeout(&self) -> anyhow::Result<Duration> {
        non_zero_duration("rebalancer.lock_timeout", &self.lock_timeout)
    }
}

impl FlexConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let config = Self::parse(&content)?;
        Ok(config)
    }

    /// Parse and validate a TOML document.
    pub fn parse(content: &str) -> anyhow::Result<Self> {
        let config: FlexConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// All known profiles, configured or built-in.
    pub fn profiles(&self) -> Vec<NodeProfile> {
        if self.profiles.is_empty() {
            return NodeProfile::builtin();
        }
        let mut profiles: Vec<NodeProfile> = self
            .profiles
            .iter()
            .map(|(name, p)| NodeProfile::new(name.clone(), p.cpus, p.memory_mb))
            .collect();
        profiles.sort_by(|a, b| a.name.cmp(&b.name));
        profiles
    }

    pub fn profile(&self, name: &str) -> Option<NodeProfile> {
        self.profiles().into_iter().find(|p| p.name == name)
    }

    /// Check cross-field constraints that serde cannot express.
    pub fn validate(&self) -> anyhow::Result<()> {
        self.rebalancer.interval()?;
        let metrics_timeout = self.rebalancer.metrics_timeout()?;
        let scale_timeout = self.rebalancer.scale_timeout()?;
        let lock_timeout = self.rebalancer.lock_timeout()?;
        // A pass still waiting on metrics or a flex call must never look stale.
        if metrics_timeout
            .checked_add(scale_timeout)
            .is_none_or(|pass_budget| lock_timeout <= pass_budget)
        {
            bail!(
                "rebalancer.lock_timeout must exceed rebalancer.metrics_timeout + rebalancer.scale_timeout"
            );
        }

        for (name, profile) in &self.profiles {
            if profile.cpus < 0.0 {
                bail!("profile {name}: cpus must not be negative");
            }
        }

        let mut seen = HashSet::new();
        for cluster in &self.clusters {
            if cluster.id.trim().is_empty() {
                bail!("cluster id must not be empty");
            }
            if !seen.insert(cluster.id.as_str()) {
                bail!("duplicate cluster id: {}", cluster.id);
            }
            if cluster.resource_manager_host.trim().is_empty() {
                bail!("cluster {}: resource_manager_host must not be empty", cluster.id);
            }
            if cluster.min_quota < 0.0 {
                bail!("cluster {}: min_quota must not be negative", cluster.id);
            }
            if self.profile(&cluster.profile).is_none() {
                bail!("cluster {}: unknown profile {}", cluster.id, cluster.profile);
            }
        }

        // The rebalancer always grows with the default profile.
        if self.profile(DEFAULT_PROFILE).is_none() {
            bail!("profile {DEFAULT_PROFILE} must be defined");
        }
        Ok(())
    }
}

/// Parse a duration string like "500ms", "5s", "2m", "1h" or bare seconds.
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if let Some(ms) = s.strip_suffix("ms") {
        ms.parse::<u64>().ok().map(Duration::from_millis)
    } else if let Some(secs) = s.strip_suffix('s') {
        secs.parse::<u64>().ok().map(Duration::from_secs)
    } else if let Some(mins) = s.strip_suffix('m') {
        mins.parse::<u64>().ok()?.checked_mul(60).map(Duration::from_secs)
    } else if let Some(hours) = s.strip_suffix('h') {
        hours.parse::<u64>().ok()?.checked_mul(3600).map(Duration::from_secs)
    } else {
        s.parse::<u64>().ok().map(Duration::from_secs)
    }
}

fn non_zero_duration(field: &str, value: &str) -> anyhow::Result<Duration> {
    match parse_duration(value) {
        Some(d) if !d.is_zero() => Ok(d),
        Some(_) => bail!("{field} must be greater than zero"),
        None => bail!("{field}: invalid duration {value:?}"),
    }
}
