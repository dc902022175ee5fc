//! Deletes everything the walkthroughs created
//!
//! Resources are removed in reverse dependency order: firewall rules, then
//! instances, subnets, and finally networks. Anything already gone is skipped.

use super::plan;
use crate::config::LabConfig;
use crate::core::error::Result;
use crate::gcloud::{Gcloud, is_not_found};
use std::fmt;
use std::io::{self, BufRead, Write};
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resource {
    FirewallRule(String),
    Instance { name: String, zone: String },
    Subnet { name: String, region: String },
    Network(String),
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resource::FirewallRule(name) => write!(f, "firewall rule {name}"),
            Resource::Instance { name, zone } => write!(f, "instance {name} ({zone})"),
            Resource::Subnet { name, region } => write!(f, "subnet {name} ({region})"),
            Resource::Network(name) => write!(f, "network {name}"),
        }
    }
}

/// Plan resources in deletion order
pub fn resources(config: &LabConfig) -> Vec<Resource> {
    let mut resources: Vec<Resource> = plan::firewall_rules()
        .into_iter()
        .rev()
        .map(|rule| Resource::FirewallRule(rule.name))
        .collect();

    resources.extend(plan::instances(config).into_iter().rev().map(|i| {
        Resource::Instance {
            name: i.name,
            zone: i.zone,
        }
    }));
    resources.extend(plan::subnets(config).into_iter().rev().map(|s| {
        Resource::Subnet {
            name: s.name,
            region: s.region,
        }
    }));
    resources.extend(
        plan::networks()
            .into_iter()
            .rev()
            .map(|n| Resource::Network(n.name)),
    );
    resources
}

/// Asks for a `y`/`yes` answer; anything else, including end of input, declines
///
/// # Errors
///
/// Returns `Err` on terminal I/O failure.
pub fn confirm(input: &mut impl BufRead, out: &mut impl Write) -> io::Result<bool> {
    write!(
        out,
        "Delete all lab networks, subnets, instances and firewall rules? [y/N]: "
    )?;
    out.flush()?;

    let mut line = String::new();
    input.read_line(&mut line)?;
    Ok(matches!(line.trim().to_lowercase().as_str(), "y" | "yes"))
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CleanupSummary {
    pub deleted: usize,
    pub skipped: usize,
}

pub struct Cleanup {
    gcloud: Gcloud,
    config: LabConfig,
}

impl Cleanup {
    pub fn new(config: LabConfig) -> Self {
        Self {
            gcloud: Gcloud::from_config(&config),
            config,
        }
    }

    /// Deletes every plan resource
    ///
    /// # Errors
    ///
    /// Stops at the first failure other than "not found".
    pub async fn run(&self, out: &mut impl Write) -> Result<CleanupSummary> {
        let mut summary = CleanupSummary::default();

        for resource in resources(&self.config) {
            match self.delete(&resource).await {
                Ok(()) => {
                    summary.deleted += 1;
                    writeln!(out, "Deleted {resource}")?;
                }
                Err(e) if is_not_found(&e) => {
                    warn!("Skipping {resource}: {e}");
                    summary.skipped += 1;
                    writeln!(out, "Skipped {resource} (not found)")?;
                }
                Err(e) => return Err(e),
            }
        }

        writeln!(
            out,
            "\nCleanup complete: {} deleted, {} already absent.",
            summary.deleted, summary.skipped
        )?;
        Ok(summary)
    }

    async fn delete(&self, resource: &Resource) -> Result<()> {
        match resource {
            Resource::FirewallRule(name) => self.gcloud.delete_firewall_rule(name).await,
            Resource::Instance { name, zone } => self.gcloud.delete_instance(name, zone).await,
            Resource::Subnet { name, region } => self.gcloud.delete_subnet(name, region).await,
            Resource::Network(name) => self.gcloud.delete_network(name).await,
        }
    }
}
