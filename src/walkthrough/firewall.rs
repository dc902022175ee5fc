//! Firewall walkthrough: rules on `custom-network` and a connectivity check
//!
//! Requires the networks walkthrough to have created `custom-network`.

use super::menu::{self, MenuChoice, MenuStep};
use super::{evaluate_probes, plan, write_probe_report};
use crate::config::LabConfig;
use crate::core::error::{Error, Result};
use crate::core::evaluator::Firewall;
use crate::core::firewall::FirewallRule;
use crate::gcloud::Gcloud;
use std::io::{BufRead, Write};
use std::net::IpAddr;
use strum::IntoEnumIterator;
use tracing::info;

pub const TITLE: &str = "VPC Firewall Rules Walkthrough";

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::EnumIter)]
pub enum Step {
    CreateSshRule,
    CreateIcmpRule,
    CreateWebRule,
    CreatePriorityRules,
    CreateEgressRule,
    ListRules,
    TestConnectivity,
}

impl MenuStep for Step {
    fn label(self) -> &'static str {
        match self {
            Step::CreateSshRule => "Allow SSH from anywhere",
            Step::CreateIcmpRule => "Allow internal ICMP",
            Step::CreateWebRule => "Allow HTTP/HTTPS to web servers",
            Step::CreatePriorityRules => "Create rules with different priorities",
            Step::CreateEgressRule => "Deny outbound SMTP",
            Step::ListRules => "List firewall rules",
            Step::TestConnectivity => "Test connectivity",
        }
    }
}

pub struct FirewallWalkthrough {
    gcloud: Gcloud,
    config: LabConfig,
}

impl FirewallWalkthrough {
    pub fn new(config: LabConfig) -> Self {
        Self {
            gcloud: Gcloud::from_config(&config),
            config,
        }
    }

    /// Checks that gcloud is installed and `custom-network` exists
    ///
    /// # Errors
    ///
    /// Returns [`Error::Prerequisite`] for a missing program or network, or
    /// the gcloud error if the network lookup itself fails.
    pub async fn check_prerequisites(&self) -> Result<()> {
        if !self.gcloud.is_installed() {
            return Err(Error::Prerequisite(format!(
                "{} is not installed or not in PATH",
                self.gcloud.program()
            )));
        }

        if !self.gcloud.network_exists(plan::CUSTOM_NETWORK).await? {
            return Err(Error::Prerequisite(format!(
                "Network '{}' not found. Run `vpclab networks` first.",
                plan::CUSTOM_NETWORK
            )));
        }

        Ok(())
    }

    /// # Errors
    ///
    /// Stops at the first failing step and returns its error.
    pub async fn run_all(&self, out: &mut impl Write) -> Result<()> {
        for step in Step::iter() {
            self.run_step(step, out).await?;
        }
        writeln!(out, "\nFirewall walkthrough complete.")?;
        Ok(())
    }

    /// # Errors
    ///
    /// Returns the error of a failing step, or an I/O error from the terminal.
    pub async fn run_menu(
        &self,
        input: &mut impl BufRead,
        out: &mut impl Write,
    ) -> Result<()> {
        loop {
            match menu::prompt::<Step>(TITLE, input, out)? {
                MenuChoice::Run(step) => self.run_step(step, out).await?,
                MenuChoice::Exit => return Ok(()),
            }
        }
    }

    /// # Errors
    ///
    /// Returns the gcloud or lookup error of the step.
    pub async fn run_step(&self, step: Step, out: &mut impl Write) -> Result<()> {
        menu::announce(step, out)?;
        info!("Firewall step: {}", step.label());

        match step {
            Step::CreateSshRule => self.create_rules(&[plan::ssh_rule()], out).await,
            Step::CreateIcmpRule => self.create_rules(&[plan::icmp_rule()], out).await,
            Step::CreateWebRule => self.create_rules(&[plan::web_rule()], out).await,
            Step::CreatePriorityRules => self.create_rules(&plan::priority_rules(), out).await,
            Step::CreateEgressRule => self.create_rules(&[plan::egress_rule()], out).await,
            Step::ListRules => {
                writeln!(
                    out,
                    "{}",
                    self.gcloud.list_firewall_rules(plan::CUSTOM_NETWORK).await?
                )?;
                Ok(())
            }
            Step::TestConnectivity => self.test_connectivity(out).await,
        }
    }

    async fn create_rules(&self, rules: &[FirewallRule], out: &mut impl Write) -> Result<()> {
        for rule in rules {
            self.gcloud.create_firewall_rule(rule).await?;
            writeln!(out, "Created {}", rule.summary())?;
        }
        Ok(())
    }

    /// Pings `vm-b` from `vm-a`, then shows how the lab rules treat typical traffic
    async fn test_connectivity(&self, out: &mut impl Write) -> Result<()> {
        let lookup = self
            .gcloud
            .instance_external_ip(plan::VM_B, &self.config.zone_2)
            .await?;
        // Only a parsed address ever reaches the remote shell
        let target_ip: IpAddr = lookup.parse().map_err(|_| {
            Error::Prerequisite(format!(
                "Could not determine the external IP of {} (got '{lookup}')",
                plan::VM_B
            ))
        })?;

        let zone = self.gcloud.instance_zone(plan::VM_A).await?;
        if zone.is_empty() {
            return Err(Error::Prerequisite(format!(
                "Could not determine the zone of {}",
                plan::VM_A
            )));
        }

        writeln!(
            out,
            "Pinging {} ({target_ip}) from {} in {zone}",
            plan::VM_B,
            plan::VM_A
        )?;

        // A lost ping is a result to show, not a failure of the step
        let command = format!("ping -c 3 -W 2 {target_ip} || echo 'No reply from {target_ip}'");
        let output = self.gcloud.ssh_command(plan::VM_A, &zone, &command).await?;
        writeln!(out, "{}", output.trim_end())?;

        writeln!(out, "\nLocal evaluation of the lab rules:")?;
        let mut firewall = Firewall::new(plan::firewall_ruleset())?;
        let outcomes = evaluate_probes(&mut firewall, &plan::probes());
        write_probe_report(&outcomes, out)?;
        Ok(())
    }
}
