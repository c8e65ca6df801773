//! flexgrid-placement: offer eligibility for worker tasks.
//!
//! Side-effect-free predicates the offer-acceptance path calls before it
//! launches a task onto an offered machine. They read task descriptors
//! owned by `flexgrid-state` and never mutate anything.
//!
//! # Components
//!
//! - **`matcher`**: attribute equality, hostname uniqueness, resource fit

pub mod matcher;

pub use matcher::{Offer, attributes_match, is_unique_hostname, offer_fits};
