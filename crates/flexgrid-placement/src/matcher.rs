//! Offer matching predicates.
//!
//! An offer is eligible for a task when:
//! 1. Its attributes satisfy the task's placement constraints
//! 2. No worker of the same group already runs on that host
//! 3. It carries enough CPU and memory for the task's profile

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use flexgrid_state::NodeTask;

/// A resource offer for one machine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Offer {
    pub id: String,
    pub hostname: String,
    pub attributes: HashMap<String, String>,
    pub cpus: f64,
    pub memory_mb: u64,
}

/// Whether an offer's attributes satisfy a task's placement constraints.
///
/// An empty constraint set accepts any offer. Otherwise the two maps must
/// be exactly equal: same keys, same values, nothing extra on either side.
pub fn attributes_match(
    offer_attributes: &HashMap<String, String>,
    required: &HashMap<String, String>,
) -> bool {
    let matched = required.is_empty() || offer_attributes == required;
    debug!(
        matched,
        offer = ?offer_attributes,
        required = ?required,
        "attribute match"
    );
    matched
}

/// Whether no task in `existing` already runs on `offer_hostname`.
///
/// Hostnames compare case-insensitively. Tasks without a hostname have
/// not been placed yet and never conflict.
pub fn is_unique_hostname(offer_hostname: &str, existing: &[NodeTask]) -> bool {
    let unique = !existing.iter().any(|task| {
        task.hostname
            .as_deref()
            .is_some_and(|h| h.eq_ignore_ascii_case(offer_hostname))
    });
    debug!(hostname = %offer_hostname, unique, "hostname uniqueness");
    unique
}

/// Full eligibility check for placing `task` on `offer`, given the tasks
/// already running in the same group.
pub fn offer_fits(offer: &Offer, task: &NodeTask, existing: &[NodeTask]) -> bool {
    if !attributes_match(&offer.attributes, &task.attributes) {
        return false;
    }
    if !is_unique_hostname(&offer.hostname, existing) {
        return false;
    }
    let fits = offer.cpus >= task.profile.cpus && offer.memory_mb >= task.profile.memory_mb;
    if !fits {
        debug!(
            offer = %offer.id,
            task = %task.task_id,
            offer_cpus = offer.cpus,
            offer_mem = offer.memory_mb,
            want_cpus = task.profile.cpus,
            want_mem = task.profile.memory_mb,
            "offer too small"
        );
    }
    fits
}

#[cfg(test)]
mod tests {
    use super::*;
    use flexgrid_core::NodeProfile;

    fn attrs(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn task_on(host: Option<&str>) -> NodeTask {
        let task = NodeTask::new("t1", "c1", NodeProfile::new("small", 1.0, 1024));
        match host {
            Some(h) => task.with_hostname(h),
            None => task,
        }
    }

    fn offer(host: &str, attributes: HashMap<String, String>) -> Offer {
        Offer {
            id: "o1".to_string(),
            hostname: host.to_string(),
            attributes,
            cpus: 4.0,
            memory_mb: 8192,
        }
    }

    #[test]
    fn empty_offer_against_constraint_fails() {
        assert!(!attributes_match(&attrs(&[]), &attrs(&[("rack", "A")])));
    }

    #[test]
    fn no_constraint_accepts_anything() {
        assert!(attributes_match(&attrs(&[("rack", "A")]), &attrs(&[])));
        assert!(attributes_match(&attrs(&[]), &attrs(&[])));
    }

    #[test]
    fn exact_match_accepted() {
        assert!(attributes_match(&attrs(&[("rack", "A")]), &attrs(&[("rack", "A")])));
    }

    #[test]
    fn extra_offer_key_rejected() {
        assert!(!attributes_match(
            &attrs(&[("rack", "A"), ("zone", "1")]),
            &attrs(&[("rack", "A")])
        ));
    }

    #[test]
    fn different_value_rejected() {
        assert!(!attributes_match(&attrs(&[("rack", "B")]), &attrs(&[("rack", "A")])));
    }

    #[test]
    fn unique_hostname_with_no_tasks() {
        assert!(is_unique_hostname("HostA", &[]));
    }

    #[test]
    fn hostname_compare_ignores_case() {
        let existing = vec![task_on(Some("HostA"))];
        assert!(!is_unique_hostname("hosta", &existing));
        assert!(is_unique_hostname("hostb", &existing));
    }

    #[test]
    fn unplaced_tasks_never_conflict() {
        let existing = vec![task_on(None)];
        assert!(is_unique_hostname("hosta", &existing));
    }

    #[test]
    fn offer_fits_checks_all_conditions() {
        let mut task = task_on(None);
        task.attributes = attrs(&[("rack", "A")]);

        assert!(offer_fits(&offer("h1", attrs(&[("rack", "A")])), &task, &[]));
        assert!(!offer_fits(&offer("h1", attrs(&[("rack", "B")])), &task, &[]));

        let placed = vec![task_on(Some("H1"))];
        assert!(!offer_fits(&offer("h1", attrs(&[("rack", "A")])), &task, &placed));

        let mut small = offer("h2", attrs(&[("rack", "A")]));
        small.memory_mb = 512;
        assert!(!offer_fits(&small, &task, &[]));
    }
}
