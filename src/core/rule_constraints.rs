//! Rule constraint functions for VPC firewall rules
//!
//! This module centralizes the business logic about valid field combinations
//! for firewall rules. GCP rejects rules that break these constraints, so the
//! walkthrough checks them locally before calling gcloud, and the evaluator
//! checks them before loading a rule file.
//!
//! # Examples
//!
//! ```
//! use vpclab::core::firewall::{Direction, Protocol};
//! use vpclab::core::rule_constraints::*;
//!
//! assert!(protocol_supports_ports(Protocol::Tcp));
//! assert!(!protocol_supports_ports(Protocol::Icmp));
//!
//! assert!(direction_allows_source_ranges(Direction::Ingress));
//! assert!(!direction_allows_source_ranges(Direction::Egress));
//! ```

use super::firewall::{Direction, FirewallRule, Protocol};
use crate::validators;

// ═══════════════════════════════════════════════════════════════════════════
// Protocol Constraints
// ═══════════════════════════════════════════════════════════════════════════

/// Returns `true` if the protocol supports port filtering.
///
/// GCP only accepts ports for TCP, UDP and SCTP.
///
/// # Examples
///
/// ```
/// use vpclab::core::firewall::Protocol;
/// use vpclab::core::rule_constraints::protocol_supports_ports;
///
/// assert!(protocol_supports_ports(Protocol::Sctp));
/// assert!(protocol_supports_ports(Protocol::Number(17)));
/// assert!(!protocol_supports_ports(Protocol::All));
/// ```
#[inline]
pub fn protocol_supports_ports(protocol: Protocol) -> bool {
    matches!(
        protocol.canonical(),
        Protocol::Tcp | Protocol::Udp | Protocol::Sctp
    )
}

// ═══════════════════════════════════════════════════════════════════════════
// Direction Constraints
// ═══════════════════════════════════════════════════════════════════════════

/// Source ranges and source tags are only meaningful on ingress rules
#[inline]
pub fn direction_allows_source_ranges(direction: Direction) -> bool {
    direction == Direction::Ingress
}

/// Destination ranges are only meaningful on egress rules
#[inline]
pub fn direction_allows_destination_ranges(direction: Direction) -> bool {
    direction == Direction::Egress
}

// ═══════════════════════════════════════════════════════════════════════════
// Whole-rule check
// ═══════════════════════════════════════════════════════════════════════════

/// Validates a rule, returning the offending field name and a message.
///
/// # Errors
///
/// Returns `Err((field, message))` for the first violated constraint.
pub fn check_rule(rule: &FirewallRule) -> Result<(), (&'static str, String)> {
    validators::validate_resource_name(&rule.name).map_err(|e| ("name", e))?;
    validators::validate_resource_name(&rule.network).map_err(|e| ("network", e))?;
    validators::validate_description(&rule.description).map_err(|e| ("description", e))?;

    if rule.entries.is_empty() {
        return Err(("entries", "At least one protocol entry is required".to_string()));
    }

    for entry in &rule.entries {
        if !entry.ports.is_empty() && !protocol_supports_ports(entry.protocol) {
            return Err((
                "entries",
                format!("Protocol '{}' does not support ports", entry.protocol),
            ));
        }
        for port in &entry.ports {
            validators::validate_port_range(port.start, port.end).map_err(|e| ("entries", e))?;
        }
    }

    if !direction_allows_source_ranges(rule.direction)
        && (!rule.source_ranges.is_empty() || !rule.source_tags.is_empty())
    {
        return Err((
            "source_ranges",
            "Source ranges and source tags are only valid on INGRESS rules".to_string(),
        ));
    }

    if !direction_allows_destination_ranges(rule.direction) && !rule.destination_ranges.is_empty()
    {
        return Err((
            "destination_ranges",
            "Destination ranges are only valid on EGRESS rules".to_string(),
        ));
    }

    for tag in rule.source_tags.iter().chain(&rule.target_tags) {
        validators::validate_network_tag(tag).map_err(|e| ("tags", e))?;
    }

    Ok(())
}
