//! Per-cluster rebalance locks.
//!
//! A cluster is locked while a rebalance pass evaluates it and, after a
//! flex request, until the scaling confirmation arrives. Locks are
//! advisory and process-local. Acquire is a single check-and-set under
//! the table mutex, so two callers can never both win.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tracing::debug;

use crate::types::ClusterId;

/// What the holder of a cluster's lock is doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockPhase {
    /// A rebalance pass is fetching metrics and evaluating policy.
    Evaluating,
    /// A flex request was issued; waiting for its confirmation.
    RequestIssued,
}

#[derive(Debug, Clone, Copy)]
struct LockEntry {
    phase: LockPhase,
    since: Instant,
}

/// A lock that has been held longer than allowed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaleLock {
    pub cluster_id: ClusterId,
    pub phase: LockPhase,
    pub held_for: Duration,
}

/// Lock table keyed by cluster ID. An absent entry means unlocked.
#[derive(Debug, Default)]
pub struct RebalanceLocks {
    entries: Mutex<HashMap<ClusterId, LockEntry>>,
}

impl RebalanceLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<ClusterId, LockEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Lock `cluster_id` iff it is currently unlocked.
    pub fn acquire(&self, cluster_id: &str) -> bool {
        let mut entries = self.entries();
        if entries.contains_key(cluster_id) {
            return false;
        }
        entries.insert(
            cluster_id.to_string(),
            LockEntry {
                phase: LockPhase::Evaluating,
                since: Instant::now(),
            },
        );
        debug!(cluster = %cluster_id, "rebalance lock acquired");
        true
    }

    /// Unlock `cluster_id` regardless of its prior state. Always true.
    pub fn release(&self, cluster_id: &str) -> bool {
        let held = self.entries().remove(cluster_id).is_some();
        debug!(cluster = %cluster_id, held, "rebalance lock released");
        true
    }

    /// Move a held lock into the awaiting-confirmation phase.
    ///
    /// Returns false if the cluster is not locked.
    pub fn mark_requested(&self, cluster_id: &str) -> bool {
        match self.entries().get_mut(cluster_id) {
            Some(entry) => {
                entry.phase = LockPhase::RequestIssued;
                true
            }
            None => false,
        }
    }

    /// Release the lock only if it is in `RequestIssued`, returning how
    /// long it was held.
    pub fn release_requested(&self, cluster_id: &str) -> Option<Duration> {
        let mut entries = self.entries();
        match entries.get(cluster_id) {
            Some(entry) if entry.phase == LockPhase::RequestIssued => {
                let held_for = entry.since.elapsed();
                entries.remove(cluster_id);
                Some(held_for)
            }
            _ => None,
        }
    }

    pub fn is_locked(&self, cluster_id: &str) -> bool {
        self.entries().contains_key(cluster_id)
    }

    pub fn phase(&self, cluster_id: &str) -> Option<LockPhase> {
        self.entries().get(cluster_id).map(|e| e.phase)
    }

    /// When the current holder acquired the lock.
    pub fn held_since(&self, cluster_id: &str) -> Option<Instant> {
        self.entries().get(cluster_id).map(|e| e.since)
    }

    /// Release every lock held for at least `max_hold` and report them.
    ///
    /// Detection and release happen under one guard, so a lock re-acquired
    /// by a fresh pass is never released by mistake.
    pub fn release_stale(&self, max_hold: Duration) -> Vec<StaleLock> {
        let now = Instant::now();
        let mut entries = self.entries();
        let mut released = Vec::new();
        entries.retain(|id, entry| {
            let held_for = now.saturating_duration_since(entry.since);
            if held_for >= max_hold {
                released.push(StaleLock {
                    cluster_id: id.clone(),
                    phase: entry.phase,
                    held_for,
                });
                false
            } else {
                true
            }
        });
        released
    }
}
