//! flexgrid-metrics: live load figures for managed clusters.
//!
//! The rebalancer reads a cluster's load through the `MetricsSource`
//! trait. `ResourceManagerClient` implements it against the YARN
//! ResourceManager REST API over plain HTTP/1.1.
//!
//! # Endpoints
//!
//! ```text
//! GET {rm}/ws/v1/cluster/metrics            → ClusterMetrics
//! GET {rm}/ws/v1/cluster/apps?states=ACCEPTED → AppsResponse
//! ```
//!
//! Missing fields decode as zero and a missing application list counts
//! as zero applications.

pub mod client;
pub mod error;
pub mod source;
pub mod types;

pub use client::ResourceManagerClient;
pub use error::{MetricsError, MetricsResult};
pub use source::{BoxFuture, MetricsSource};
pub use types::*;
