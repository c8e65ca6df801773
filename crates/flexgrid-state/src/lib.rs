//! flexgrid-state: the in-memory task registry.
//!
//! Single source of truth for which worker tasks exist, which lifecycle
//! state each one is in, which clusters are managed, and which clusters
//! currently hold a rebalance lock.
//!
//! # Architecture
//!
//! ```text
//! TaskRegistry (Clone, Arc-backed)
//!   ├── RwLock<Inner>
//!   │   ├── tasks:    task_id → NodeTask
//!   │   ├── states:   StateSets (one HashSet per TaskState)
//!   │   └── clusters: cluster_id → member task ids
//!   └── RebalanceLocks (Mutex, independent of the registry lock)
//! ```
//!
//! Every mutation is a single method call under one write guard, so a
//! task ID is never observed in two state sets at once.

pub mod error;
pub mod lock;
pub mod registry;
pub mod types;

pub use error::{RegistryError, RegistryResult};
pub use lock::{LockPhase, RebalanceLocks, StaleLock};
pub use registry::TaskRegistry;
pub use types::*;
