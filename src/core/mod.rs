//! Core firewall functionality
//!
//! This module contains the typed firewall model and the local evaluator:
//!
//! - [`firewall`]: Data structures for VPC firewall rules and their gcloud form
//! - [`evaluator`]: Priority-ordered rule evaluation with implied rules
//! - [`conntrack`]: Connection tracking for stateful return traffic
//! - [`policy`]: Loading and saving rule files
//! - [`error`]: Error types
//! - [`rule_constraints`]: Business rules for valid field combinations

pub mod conntrack;
pub mod error;
pub mod evaluator;
pub mod firewall;
pub mod policy;
pub mod rule_constraints;

#[cfg(test)]
pub mod test_helpers;
