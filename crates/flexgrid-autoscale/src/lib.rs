//! flexgrid-autoscale: the rebalancer control loop.
//!
//! Every tick, each registered cluster gets its own pass: take the
//! cluster's rebalance lock, read its load from a `MetricsSource`, pick a
//! `RebalanceDecision`, and hand flex requests to a `ClusterScaler`.
//!
//! # Rebalance Policy
//!
//! ```text
//! first match wins:
//!
//! if active_nodes == 0 and apps_pending > 0:
//!     FlexUp(1, "small")       // work is waiting, nothing runs it
//!
//! if apps_pending == 0 and apps_running == 0 and active_nodes > 0:
//!     FlexDown(1)              // idle cluster
//!
//! if accepted_apps > 0:
//!     FlexUp(1, "small")       // admitted apps waiting for containers
//!
//! otherwise:
//!     NoChange                 // release the lock
//! ```
//!
//! A flex request leaves the lock held until `Rebalancer::confirm_scaling`
//! or the stale-lock watchdog releases it.

pub mod operations;
pub mod policy;
pub mod rebalancer;

pub use operations::{ClusterScaler, RegistryScaler};
pub use policy::{ClusterLoad, FLEX_STEP, RebalanceDecision, evaluate};
pub use rebalancer::{PassOutcome, Rebalancer};
