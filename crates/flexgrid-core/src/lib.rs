pub mod config;
pub mod types;

pub use config::{ClusterConfig, FlexConfig, RebalancerConfig, parse_duration};
pub use types::*;
