//! Local firewall rule evaluation
//!
//! GCP evaluates VPC firewall rules inside its network fabric; nothing in the
//! walkthrough does that work. This module reproduces the documented behavior
//! so that the effect of the walkthrough's rules can be explored offline:
//!
//! 1. Return traffic of an allowed connection is always allowed.
//! 2. Among the rules matching a packet, the lowest priority number wins.
//! 3. At equal priority a `DENY` rule wins over an `ALLOW` rule.
//! 4. If nothing matches, the implied rules apply: egress is allowed and
//!    ingress is denied, both at priority 65535.
//!
//! # Example
//!
//! ```
//! use vpclab::core::evaluator::{Firewall, Packet};
//! use vpclab::core::firewall::{FirewallRule, FirewallRuleset, Protocol, RuleEntry};
//!
//! let mut ruleset = FirewallRuleset::new("custom-network");
//! ruleset.rules.push(
//!     FirewallRule::new("allow-ssh", "custom-network")
//!         .with_entries(vec![RuleEntry::with_port(Protocol::Tcp, 22)]),
//! );
//!
//! let mut firewall = Firewall::new(ruleset).unwrap();
//! let packet = Packet::ingress(
//!     "custom-network",
//!     Protocol::Tcp,
//!     "203.0.113.7".parse().unwrap(),
//!     "10.0.1.2".parse().unwrap(),
//! )
//! .with_ports(Some(51000), Some(22));
//!
//! assert!(firewall.evaluate(&packet).is_allowed());
//! assert!(firewall.evaluate(&packet.reply()).is_allowed());
//! ```

use super::conntrack::ConnectionTracker;
use super::firewall::{
    Action, Direction, FirewallRule, FirewallRuleset, IMPLIED_RULE_PRIORITY, Protocol,
};
use serde::Serialize;
use std::fmt;
use std::net::IpAddr;

/// A synthetic packet as seen by the instance a rule would apply to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub network: String,
    pub direction: Direction,
    pub protocol: Protocol,
    pub source: IpAddr,
    pub destination: IpAddr,
    pub source_port: Option<u16>,
    pub destination_port: Option<u16>,
    /// Tags of the instance the rule targets (receiver for ingress, sender for egress)
    pub instance_tags: Vec<String>,
    /// Tags of the other instance, used by ingress source-tag matching
    pub peer_tags: Vec<String>,
}

impl Packet {
    pub fn new(
        network: impl Into<String>,
        direction: Direction,
        protocol: Protocol,
        source: IpAddr,
        destination: IpAddr,
    ) -> Self {
        Self {
            network: network.into(),
            direction,
            protocol,
            source,
            destination,
            source_port: None,
            destination_port: None,
            instance_tags: Vec::new(),
            peer_tags: Vec::new(),
        }
    }

    pub fn ingress(
        network: impl Into<String>,
        protocol: Protocol,
        source: IpAddr,
        destination: IpAddr,
    ) -> Self {
        Self::new(network, Direction::Ingress, protocol, source, destination)
    }

    pub fn egress(
        network: impl Into<String>,
        protocol: Protocol,
        source: IpAddr,
        destination: IpAddr,
    ) -> Self {
        Self::new(network, Direction::Egress, protocol, source, destination)
    }

    pub fn with_ports(mut self, source_port: Option<u16>, destination_port: Option<u16>) -> Self {
        self.source_port = source_port;
        self.destination_port = destination_port;
        self
    }

    pub fn with_instance_tags(mut self, tags: Vec<String>) -> Self {
        self.instance_tags = tags;
        self
    }

    pub fn with_peer_tags(mut self, tags: Vec<String>) -> Self {
        self.peer_tags = tags;
        self
    }

    /// The response to this packet, as seen by the same instance
    pub fn reply(&self) -> Self {
        Self {
            network: self.network.clone(),
            direction: self.direction.reversed(),
            protocol: self.protocol,
            source: self.destination,
            destination: self.source,
            source_port: self.destination_port,
            destination_port: self.source_port,
            instance_tags: self.instance_tags.clone(),
            peer_tags: self.peer_tags.clone(),
        }
    }
}

impl fmt::Display for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let endpoint = |addr: &IpAddr, port: Option<u16>| match port {
            Some(port) => format!("{addr}:{port}"),
            None => addr.to_string(),
        };
        write!(
            f,
            "{} {} {} -> {}",
            self.direction,
            self.protocol,
            endpoint(&self.source, self.source_port),
            endpoint(&self.destination, self.destination_port)
        )
    }
}

/// Why a verdict was reached
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum VerdictReason {
    /// A configured rule matched
    Rule { name: String, priority: u16 },
    /// No rule matched an egress packet
    ImpliedAllowEgress,
    /// No rule matched an ingress packet
    ImpliedDenyIngress,
    /// Return traffic of a tracked connection
    Established,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Verdict {
    pub action: Action,
    pub reason: VerdictReason,
}

impl Verdict {
    pub fn is_allowed(&self) -> bool {
        self.action == Action::Allow
    }

    /// Priority of the deciding rule; implied rules report 65535, tracked flows none
    pub fn priority(&self) -> Option<u16> {
        match &self.reason {
            VerdictReason::Rule { priority, .. } => Some(*priority),
            VerdictReason::ImpliedAllowEgress | VerdictReason::ImpliedDenyIngress => {
                Some(IMPLIED_RULE_PRIORITY)
            }
            VerdictReason::Established => None,
        }
    }

    fn implied(direction: Direction) -> Self {
        match direction {
            Direction::Egress => Self {
                action: Action::Allow,
                reason: VerdictReason::ImpliedAllowEgress,
            },
            Direction::Ingress => Self {
                action: Action::Deny,
                reason: VerdictReason::ImpliedDenyIngress,
            },
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.reason {
            VerdictReason::Rule { name, priority } => {
                write!(f, "{} by rule '{name}' (priority {priority})", self.action)
            }
            VerdictReason::ImpliedAllowEgress => {
                write!(f, "{} by implied allow-egress rule", self.action)
            }
            VerdictReason::ImpliedDenyIngress => {
                write!(f, "{} by implied deny-ingress rule", self.action)
            }
            VerdictReason::Established => {
                write!(f, "{} as return traffic of an established connection", self.action)
            }
        }
    }
}

/// Returns `true` if `rule` applies to `packet`, ignoring priority
pub fn rule_matches(rule: &FirewallRule, packet: &Packet) -> bool {
    if rule.disabled || rule.direction != packet.direction || rule.network != packet.network {
        return false;
    }

    let target_matches = rule.target_tags.is_empty()
        || rule
            .target_tags
            .iter()
            .any(|tag| packet.instance_tags.contains(tag));
    if !target_matches {
        return false;
    }

    let peer_matches = match packet.direction {
        Direction::Ingress => {
            (rule.source_ranges.is_empty() && rule.source_tags.is_empty())
                || rule
                    .source_ranges
                    .iter()
                    .any(|range| range.contains(packet.source))
                || rule
                    .source_tags
                    .iter()
                    .any(|tag| packet.peer_tags.contains(tag))
        }
        Direction::Egress => {
            rule.destination_ranges.is_empty()
                || rule
                    .destination_ranges
                    .iter()
                    .any(|range| range.contains(packet.destination))
        }
    };
    if !peer_matches {
        return false;
    }

    rule.entries
        .iter()
        .any(|entry| entry.matches(packet.protocol, packet.destination_port))
}

/// A network's rules plus the connection state they have built up
#[derive(Debug)]
pub struct Firewall {
    /// Rules in evaluation order
    rules: Vec<FirewallRule>,
    network: String,
    tracker: ConnectionTracker,
}

impl Firewall {
    /// Builds an evaluator for a validated ruleset
    ///
    /// # Errors
    ///
    /// Returns the ruleset's validation error.
    pub fn new(ruleset: FirewallRuleset) -> crate::Result<Self> {
        ruleset.validate()?;

        let rules = ruleset.sorted_rules().into_iter().cloned().collect();
        Ok(Self {
            rules,
            network: ruleset.network,
            tracker: ConnectionTracker::new(),
        })
    }

    pub fn network(&self) -> &str {
        &self.network
    }

    /// Rules in the order they are evaluated
    pub fn rules(&self) -> &[FirewallRule] {
        &self.rules
    }

    pub fn tracker(&self) -> &ConnectionTracker {
        &self.tracker
    }

    /// Evaluates a packet and records the flow if it is allowed
    pub fn evaluate(&mut self, packet: &Packet) -> Verdict {
        if self.tracker.is_return_traffic(packet) {
            tracing::debug!("{packet}: return traffic");
            return Verdict {
                action: Action::Allow,
                reason: VerdictReason::Established,
            };
        }

        let verdict = self.evaluate_stateless(packet);
        if verdict.is_allowed() {
            self.tracker.track(packet);
        }
        verdict
    }

    /// Evaluates a packet against the rules only
    pub fn evaluate_stateless(&self, packet: &Packet) -> Verdict {
        let verdict = self
            .rules
            .iter()
            .find(|rule| rule_matches(rule, packet))
            .map_or_else(
                || Verdict::implied(packet.direction),
                |rule| Verdict {
                    action: rule.action,
                    reason: VerdictReason::Rule {
                        name: rule.name.clone(),
                        priority: rule.priority,
                    },
                },
            );

        tracing::debug!("{packet}: {verdict}");
        verdict
    }

    /// Every rule matching the packet, in evaluation order
    ///
    /// The first entry decided the verdict; the rest are shadowed for this packet.
    pub fn matching_rules(&self, packet: &Packet) -> Vec<&FirewallRule> {
        self.rules
            .iter()
            .filter(|rule| rule_matches(rule, packet))
            .collect()
    }

    /// Forgets all tracked connections
    pub fn reset_connections(&mut self) {
        self.tracker.clear();
    }
}
