//! VPC firewall rule data structures and gcloud rendering
//!
//! This module defines the typed form of a GCP VPC firewall rule and converts
//! it to the arguments `gcloud compute firewall-rules create` expects.
//!
//! # Rule Structure
//!
//! A [`FirewallRule`] carries:
//! - Direction (ingress or egress) and action (allow or deny)
//! - Priority, where lower numbers are evaluated first (0-65535, default 1000)
//! - One or more protocol/port entries in gcloud `--rules` syntax
//! - Source ranges and source tags (ingress only)
//! - Destination ranges (egress only)
//! - Target tags (empty = every instance in the network)
//!
//! # Limits
//!
//! Rulesets are limited to [`MAX_RULES`] rules.
//!
//! # Example
//!
//! ```
//! use vpclab::core::firewall::{Action, Direction, FirewallRule, RuleEntry};
//!
//! let rule = FirewallRule::new("allow-ssh", "custom-network")
//!     .with_entries(RuleEntry::parse_list("tcp:22").unwrap())
//!     .with_source_ranges(vec!["0.0.0.0/0".parse().unwrap()]);
//!
//! assert_eq!(rule.direction, Direction::Ingress);
//! assert_eq!(rule.action, Action::Allow);
//! assert_eq!(rule.priority, 1000);
//! assert!(rule.to_gcloud_args().contains(&"--rules=tcp:22".to_string()));
//! ```

use ipnetwork::IpNetwork;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Maximum number of rules allowed in a single ruleset
pub const MAX_RULES: usize = 1000;

/// Priority assigned when none is given
pub const DEFAULT_PRIORITY: u16 = 1000;

/// Priority of the implied allow-egress and deny-ingress rules
pub const IMPLIED_RULE_PRIORITY: u16 = 65535;

/// Traffic direction a rule applies to
#[derive(
    Debug,
    Clone,
    Copy,
    Serialize,
    Deserialize,
    PartialEq,
    Eq,
    Hash,
    Default,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "UPPERCASE")]
#[strum(ascii_case_insensitive)]
pub enum Direction {
    /// Traffic arriving at an instance
    #[default]
    #[strum(serialize = "INGRESS")]
    Ingress,
    /// Traffic leaving an instance
    #[strum(serialize = "EGRESS")]
    Egress,
}

impl Direction {
    pub const fn reversed(self) -> Self {
        match self {
            Direction::Ingress => Direction::Egress,
            Direction::Egress => Direction::Ingress,
        }
    }
}

/// What happens to a packet matching the rule
#[derive(
    Debug,
    Clone,
    Copy,
    Serialize,
    Deserialize,
    PartialEq,
    Eq,
    Hash,
    Default,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "UPPERCASE")]
#[strum(ascii_case_insensitive)]
pub enum Action {
    #[default]
    #[strum(serialize = "ALLOW")]
    Allow,
    #[strum(serialize = "DENY")]
    Deny,
}

/// IP protocol as accepted by the gcloud `--rules` flag
///
/// Named protocols cover what GCP documents by name; anything else is given
/// by its IANA protocol number.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(try_from = "String", into = "String")]
pub enum Protocol {
    /// Every protocol (`all`)
    All,
    Tcp,
    Udp,
    Icmp,
    Sctp,
    Esp,
    Ah,
    Ipip,
    /// Protocol by IANA number
    Number(u8),
}

impl Protocol {
    /// IANA protocol number, `None` for [`Protocol::All`]
    pub const fn number(self) -> Option<u8> {
        match self {
            Protocol::All => None,
            Protocol::Icmp => Some(1),
            Protocol::Ipip => Some(4),
            Protocol::Tcp => Some(6),
            Protocol::Udp => Some(17),
            Protocol::Esp => Some(50),
            Protocol::Ah => Some(51),
            Protocol::Sctp => Some(132),
            Protocol::Number(n) => Some(n),
        }
    }

    /// Normalizes numeric protocols to their named form where one exists
    pub fn canonical(self) -> Self {
        match self {
            Protocol::Number(n) => match n {
                1 => Protocol::Icmp,
                4 => Protocol::Ipip,
                6 => Protocol::Tcp,
                17 => Protocol::Udp,
                50 => Protocol::Esp,
                51 => Protocol::Ah,
                132 => Protocol::Sctp,
                _ => self,
            },
            other => other,
        }
    }

    /// Returns `true` if `self` (as written in a rule) covers `packet`
    pub fn covers(self, packet: Protocol) -> bool {
        self == Protocol::All || self.canonical() == packet.canonical()
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::All => f.write_str("all"),
            Protocol::Tcp => f.write_str("tcp"),
            Protocol::Udp => f.write_str("udp"),
            Protocol::Icmp => f.write_str("icmp"),
            Protocol::Sctp => f.write_str("sctp"),
            Protocol::Esp => f.write_str("esp"),
            Protocol::Ah => f.write_str("ah"),
            Protocol::Ipip => f.write_str("ipip"),
            Protocol::Number(n) => write!(f, "{n}"),
        }
    }
}

impl FromStr for Protocol {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        match lower.as_str() {
            "all" => Ok(Protocol::All),
            "tcp" => Ok(Protocol::Tcp),
            "udp" => Ok(Protocol::Udp),
            "icmp" => Ok(Protocol::Icmp),
            "sctp" => Ok(Protocol::Sctp),
            "esp" => Ok(Protocol::Esp),
            "ah" => Ok(Protocol::Ah),
            "ipip" => Ok(Protocol::Ipip),
            "" => Err("Protocol cannot be empty".to_string()),
            other => other
                .parse::<u8>()
                .map(|n| Protocol::Number(n).canonical())
                .map_err(|_| format!("Unknown protocol '{other}'")),
        }
    }
}

impl TryFrom<String> for Protocol {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Protocol> for String {
    fn from(value: Protocol) -> Self {
        value.to_string()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct PortRange {
    pub start: u16,
    pub end: u16,
}

impl PortRange {
    pub fn single(port: u16) -> Self {
        Self {
            start: port,
            end: port,
        }
    }

    pub fn range(start: u16, end: u16) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, port: u16) -> bool {
        (self.start..=self.end).contains(&port)
    }
}

impl fmt::Display for PortRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.start == self.end {
            write!(f, "{}", self.start)
        } else {
            write!(f, "{}-{}", self.start, self.end)
        }
    }
}

impl FromStr for PortRange {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parse_port = |p: &str| {
            p.trim()
                .parse::<u16>()
                .map_err(|_| format!("Invalid port '{}'", p.trim()))
        };

        let (start, end) = match s.split_once('-') {
            Some((start, end)) => (parse_port(start)?, parse_port(end)?),
            None => {
                let port = parse_port(s)?;
                (port, port)
            }
        };

        crate::validators::validate_port_range(start, end).map(|(start, end)| Self { start, end })
    }
}

/// One `PROTOCOL[:PORT[-PORT]]` element of a rule
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RuleEntry {
    pub protocol: Protocol,
    /// Empty means every port
    #[serde(default)]
    pub ports: Vec<PortRange>,
}

impl RuleEntry {
    pub fn protocol(protocol: Protocol) -> Self {
        Self {
            protocol,
            ports: Vec::new(),
        }
    }

    pub fn with_port(protocol: Protocol, port: u16) -> Self {
        Self {
            protocol,
            ports: vec![PortRange::single(port)],
        }
    }

    /// Returns `true` if the packet's protocol and destination port fall under this entry
    pub fn matches(&self, protocol: Protocol, port: Option<u16>) -> bool {
        if !self.protocol.covers(protocol) {
            return false;
        }
        if self.ports.is_empty() {
            return true;
        }
        port.is_some_and(|p| self.ports.iter().any(|range| range.contains(p)))
    }

    /// Parses the gcloud `--rules` syntax, e.g. `tcp:22,tcp:80-90,icmp`
    ///
    /// Consecutive elements for the same protocol are merged into a single entry,
    /// so `tcp:80,tcp:443` yields one TCP entry with two port ranges.
    ///
    /// # Errors
    ///
    /// Returns `Err` if a protocol is unknown, a port is malformed, or ports are
    /// given for a protocol without ports.
    pub fn parse_list(spec: &str) -> Result<Vec<RuleEntry>, String> {
        let mut entries: Vec<RuleEntry> = Vec::new();

        for element in spec.split(',').map(str::trim) {
            if element.is_empty() {
                return Err("Empty element in protocol list".to_string());
            }

            let (protocol, port) = match element.split_once(':') {
                Some((protocol, port)) => (protocol.parse::<Protocol>()?, Some(port)),
                None => (element.parse::<Protocol>()?, None),
            };

            let port = port.map(str::parse::<PortRange>).transpose()?;
            if port.is_some() && !super::rule_constraints::protocol_supports_ports(protocol) {
                return Err(format!("Protocol '{protocol}' does not support ports"));
            }

            let merge = entries
                .last()
                .is_some_and(|last| last.protocol == protocol && !last.ports.is_empty());

            if !merge {
                entries.push(RuleEntry {
                    protocol,
                    ports: port.into_iter().collect(),
                });
            } else if let Some(last) = entries.last_mut() {
                match port {
                    Some(port) => last.ports.push(port),
                    None => last.ports.clear(),
                }
            }
        }

        Ok(entries)
    }

    /// Renders entries back to gcloud `--rules` syntax
    pub fn format_list(entries: &[RuleEntry]) -> String {
        entries
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(",")
    }
}

impl fmt::Display for RuleEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.ports.is_empty() {
            return write!(f, "{}", self.protocol);
        }
        let parts: Vec<String> = self
            .ports
            .iter()
            .map(|p| format!("{}:{}", self.protocol, p))
            .collect();
        f.write_str(&parts.join(","))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FirewallRule {
    pub name: String,
    pub network: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub direction: Direction,
    #[serde(default = "default_priority")]
    pub priority: u16,
    #[serde(default)]
    pub action: Action,
    pub entries: Vec<RuleEntry>,
    /// Ingress only
    #[serde(default)]
    pub source_ranges: Vec<IpNetwork>,
    /// Ingress only
    #[serde(default)]
    pub source_tags: Vec<String>,
    /// Egress only
    #[serde(default)]
    pub destination_ranges: Vec<IpNetwork>,
    #[serde(default)]
    pub target_tags: Vec<String>,
    #[serde(default)]
    pub disabled: bool,
}

fn default_priority() -> u16 {
    DEFAULT_PRIORITY
}

impl FirewallRule {
    /// Creates an ingress allow rule with default priority and no entries
    pub fn new(name: impl Into<String>, network: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            network: network.into(),
            description: String::new(),
            direction: Direction::Ingress,
            priority: DEFAULT_PRIORITY,
            action: Action::Allow,
            entries: Vec::new(),
            source_ranges: Vec::new(),
            source_tags: Vec::new(),
            destination_ranges: Vec::new(),
            target_tags: Vec::new(),
            disabled: false,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }

    pub fn with_priority(mut self, priority: u16) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_action(mut self, action: Action) -> Self {
        self.action = action;
        self
    }

    pub fn with_entries(mut self, entries: Vec<RuleEntry>) -> Self {
        self.entries = entries;
        self
    }

    pub fn with_source_ranges(mut self, ranges: Vec<IpNetwork>) -> Self {
        self.source_ranges = ranges;
        self
    }

    pub fn with_source_tags(mut self, tags: Vec<String>) -> Self {
        self.source_tags = tags;
        self
    }

    pub fn with_destination_ranges(mut self, ranges: Vec<IpNetwork>) -> Self {
        self.destination_ranges = ranges;
        self
    }

    pub fn with_target_tags(mut self, tags: Vec<String>) -> Self {
        self.target_tags = tags;
        self
    }

    pub fn with_disabled(mut self, disabled: bool) -> Self {
        self.disabled = disabled;
        self
    }

    /// Checks the rule against GCP's constraints
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Validation`] naming the first offending field.
    pub fn validate(&self) -> crate::Result<()> {
        super::rule_constraints::check_rule(self).map_err(|(field, message)| {
            crate::Error::Validation {
                field: format!("{}.{field}", self.name),
                message,
            }
        })
    }

    /// Builds the argument list for `gcloud compute firewall-rules create`
    ///
    /// The project flag is added by the caller.
    pub fn to_gcloud_args(&self) -> Vec<String> {
        let mut args = vec![
            "compute".to_string(),
            "firewall-rules".to_string(),
            "create".to_string(),
            self.name.clone(),
            format!("--network={}", self.network),
            format!("--direction={}", self.direction),
            format!("--priority={}", self.priority),
            format!("--action={}", self.action),
            format!("--rules={}", RuleEntry::format_list(&self.entries)),
        ];

        if !self.source_ranges.is_empty() {
            args.push(format!("--source-ranges={}", join_networks(&self.source_ranges)));
        }
        if !self.source_tags.is_empty() {
            args.push(format!("--source-tags={}", self.source_tags.join(",")));
        }
        if !self.destination_ranges.is_empty() {
            args.push(format!(
                "--destination-ranges={}",
                join_networks(&self.destination_ranges)
            ));
        }
        if !self.target_tags.is_empty() {
            args.push(format!("--target-tags={}", self.target_tags.join(",")));
        }
        if !self.description.is_empty() {
            args.push(format!("--description={}", self.description));
        }
        if self.disabled {
            args.push("--disabled".to_string());
        }

        args
    }

    /// One-line summary used by `vpclab rules --format text`
    pub fn summary(&self) -> String {
        let peers = match self.direction {
            Direction::Ingress => {
                let mut peers: Vec<String> =
                    self.source_ranges.iter().map(ToString::to_string).collect();
                peers.extend(self.source_tags.iter().map(|t| format!("tag:{t}")));
                if peers.is_empty() {
                    "0.0.0.0/0".to_string()
                } else {
                    peers.join(",")
                }
            }
            Direction::Egress => {
                if self.destination_ranges.is_empty() {
                    "0.0.0.0/0".to_string()
                } else {
                    join_networks(&self.destination_ranges)
                }
            }
        };
        let targets = if self.target_tags.is_empty() {
            "all instances".to_string()
        } else {
            self.target_tags.join(",")
        };

        format!(
            "{:<22} {:<7} {:>5} {:<5} {:<16} {:<20} -> {}{}",
            self.name,
            self.direction,
            self.priority,
            self.action,
            RuleEntry::format_list(&self.entries),
            peers,
            targets,
            if self.disabled { " (disabled)" } else { "" }
        )
    }
}

fn join_networks(networks: &[IpNetwork]) -> String {
    networks
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

/// The rules of a single VPC network
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct FirewallRuleset {
    pub network: String,
    pub rules: Vec<FirewallRule>,
}

impl FirewallRuleset {
    pub fn new(network: impl Into<String>) -> Self {
        Self {
            network: network.into(),
            rules: Vec::new(),
        }
    }

    /// Validates every rule and the ruleset size
    ///
    /// # Errors
    ///
    /// Returns the first validation failure, or [`crate::Error::Validation`] for an
    /// oversized ruleset or duplicate rule names.
    pub fn validate(&self) -> crate::Result<()> {
        if self.rules.len() > MAX_RULES {
            return Err(crate::Error::Validation {
                field: "rules".to_string(),
                message: format!("Too many rules ({} > {MAX_RULES})", self.rules.len()),
            });
        }

        let mut seen = std::collections::HashSet::new();
        for rule in &self.rules {
            rule.validate()?;
            if rule.network != self.network {
                return Err(crate::Error::Validation {
                    field: format!("{}.network", rule.name),
                    message: format!(
                        "Rule is on network '{}', ruleset is for '{}'",
                        rule.network, self.network
                    ),
                });
            }
            if !seen.insert(rule.name.as_str()) {
                return Err(crate::Error::Validation {
                    field: rule.name.clone(),
                    message: "Duplicate rule name".to_string(),
                });
            }
        }
        Ok(())
    }

    /// Rules in evaluation order: ascending priority, deny before allow on ties
    pub fn sorted_rules(&self) -> Vec<&FirewallRule> {
        let mut rules: Vec<&FirewallRule> = self.rules.iter().collect();
        rules.sort_by_key(|r| (r.priority, r.action != Action::Deny));
        rules
    }

    pub fn to_text(&self) -> String {
        let mut out = format!("# network: {}\n", self.network);
        for rule in self.sorted_rules() {
            out.push_str(&rule.summary());
            out.push('\n');
        }
        out
    }
}
