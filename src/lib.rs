//! vpclab - Google Cloud VPC walkthroughs
//!
//! Guided, step-by-step creation of VPC networks, subnets, instances and
//! firewall rules through the `gcloud` CLI, plus an offline evaluator that
//! shows how a set of VPC firewall rules treats a given packet.
//!
//! # Architecture
//!
//! - [`walkthrough`] - The networks, firewall and cleanup walkthroughs
//! - [`gcloud`] - Process wrapper around the `gcloud` CLI
//! - [`core`] - Firewall rule model, local evaluator, connection tracking, rule files
//! - [`config`] - Environment configuration (`PROJECT_ID`, zones, region)
//! - [`validators`] - Input validation for names, tags, ports and locations
//!
//! # Evaluation Model
//!
//! - Lowest priority number wins; `DENY` beats `ALLOW` at equal priority
//! - Implied allow-egress and deny-ingress rules at priority 65535
//! - Return traffic of allowed connections is always permitted

// Allow pedantic clippy warnings that are not worth fixing for this codebase
#![allow(clippy::must_use_candidate)]
#![allow(clippy::return_self_not_must_use)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::missing_errors_doc)]

pub mod config;
pub mod core;
pub mod gcloud;
pub mod validators;
pub mod walkthrough;

// Re-export commonly used types
pub use core::error::{Error, Result};
pub use core::evaluator::{Firewall, Packet, Verdict};
pub use core::firewall::{Action, Direction, FirewallRule, FirewallRuleset, Protocol};
