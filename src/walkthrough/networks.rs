//! Networks walkthrough: auto-mode and custom-mode VPCs, subnets, instances

use super::menu::{self, MenuChoice, MenuStep};
use super::plan;
use crate::config::LabConfig;
use crate::core::error::{Error, Result};
use crate::gcloud::Gcloud;
use std::io::{BufRead, Write};
use strum::IntoEnumIterator;
use tracing::info;

pub const TITLE: &str = "VPC Networks Walkthrough";

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::EnumIter)]
pub enum Step {
    CreateAutoNetwork,
    CreateCustomNetwork,
    CreateSubnets,
    CreateInstances,
    ListNetworks,
    ListSubnets,
    ListInstances,
}

impl MenuStep for Step {
    fn label(self) -> &'static str {
        match self {
            Step::CreateAutoNetwork => "Create auto-mode network",
            Step::CreateCustomNetwork => "Create custom-mode network",
            Step::CreateSubnets => "Create subnets in the custom network",
            Step::CreateInstances => "Create VM instances",
            Step::ListNetworks => "List networks",
            Step::ListSubnets => "List subnets",
            Step::ListInstances => "List instances",
        }
    }
}

pub struct NetworksWalkthrough {
    gcloud: Gcloud,
    config: LabConfig,
}

impl NetworksWalkthrough {
    pub fn new(config: LabConfig) -> Self {
        Self {
            gcloud: Gcloud::from_config(&config),
            config,
        }
    }

    /// # Errors
    ///
    /// Returns [`Error::Prerequisite`] if gcloud is not installed.
    pub fn check_prerequisites(&self) -> Result<()> {
        if !self.gcloud.is_installed() {
            return Err(Error::Prerequisite(format!(
                "{} is not installed or not in PATH",
                self.gcloud.program()
            )));
        }
        Ok(())
    }

    /// Runs every step once, in order
    ///
    /// # Errors
    ///
    /// Stops at the first failing step and returns its error.
    pub async fn run_all(&self, out: &mut impl Write) -> Result<()> {
        for step in Step::iter() {
            self.run_step(step, out).await?;
        }
        writeln!(out, "\nNetworks walkthrough complete.")?;
        Ok(())
    }

    /// Runs the numbered menu until the user exits
    ///
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
    /// Returns the gcloud error of the step.
    pub async fn run_step(&self, step: Step, out: &mut impl Write) -> Result<()> {
        menu::announce(step, out)?;
        info!("Networks step: {}", step.label());

        match step {
            Step::CreateAutoNetwork => self.create_auto_network(out).await,
            Step::CreateCustomNetwork => self.create_custom_network(out).await,
            Step::CreateSubnets => self.create_subnets(out).await,
            Step::CreateInstances => self.create_instances(out).await,
            Step::ListNetworks => {
                writeln!(out, "{}", self.gcloud.list_networks().await?)?;
                Ok(())
            }
            Step::ListSubnets => {
                writeln!(
                    out,
                    "{}",
                    self.gcloud.list_subnets(plan::CUSTOM_NETWORK).await?
                )?;
                Ok(())
            }
            Step::ListInstances => {
                writeln!(out, "{}", self.gcloud.list_instances().await?)?;
                Ok(())
            }
        }
    }

    async fn create_auto_network(&self, out: &mut impl Write) -> Result<()> {
        self.create_network(plan::AUTO_NETWORK, out).await
    }

    async fn create_custom_network(&self, out: &mut impl Write) -> Result<()> {
        self.create_network(plan::CUSTOM_NETWORK, out).await
    }

    async fn create_network(&self, name: &str, out: &mut impl Write) -> Result<()> {
        let network = plan::networks()
            .into_iter()
            .find(|n| n.name == name)
            .ok_or_else(|| Error::Internal(format!("Network '{name}' is not in the plan")))?;

        self.gcloud.create_network(&network).await?;
        writeln!(
            out,
            "Created {} ({} subnet mode)",
            network.name, network.subnet_mode
        )?;
        Ok(())
    }

    async fn create_subnets(&self, out: &mut impl Write) -> Result<()> {
        for subnet in plan::subnets(&self.config) {
            self.gcloud.create_subnet(&subnet).await?;
            writeln!(
                out,
                "Created {} {} in {}",
                subnet.name, subnet.range, subnet.region
            )?;
        }
        Ok(())
    }

    async fn create_instances(&self, out: &mut impl Write) -> Result<()> {
        for instance in plan::instances(&self.config) {
            self.gcloud.create_instance(&instance).await?;
            writeln!(
                out,
                "Created {} in {} (tags: {})",
                instance.name,
                instance.zone,
                instance.tags.join(",")
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::test_helpers::test_config;

    #[test]
    fn test_steps_are_numbered_one_to_seven() {
        assert_eq!(Step::iter().count(), 7);
        assert_eq!(menu::exit_option::<Step>(), 8);
        assert_eq!(
            menu::parse_choice::<Step>("1"),
            Some(MenuChoice::Run(Step::CreateAutoNetwork))
        );
        assert_eq!(
            menu::parse_choice::<Step>("7"),
            Some(MenuChoice::Run(Step::ListInstances))
        );
    }

    #[test]
    fn test_missing_gcloud_fails_prerequisites() {
        let mut config = test_config();
        config.gcloud_command = "/nonexistent/dir/gcloud".to_string();
        let walkthrough = NetworksWalkthrough::new(config);
        assert!(matches!(
            walkthrough.check_prerequisites(),
            Err(Error::Prerequisite(_))
        ));
    }

    #[tokio::test]
    async fn test_run_all_with_mock() {
        let walkthrough = NetworksWalkthrough::new(test_config());
        walkthrough.check_prerequisites().unwrap();

        let mut out = Vec::new();
        walkthrough.run_all(&mut out).await.unwrap();

        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("==> [1/7] Create auto-mode network"));
        assert!(text.contains("Created custom-network (custom subnet mode)"));
        assert!(text.contains("Created subnet-b 10.0.2.0/24 in us-central1"));
        assert!(text.contains("Created vm-a in us-central1-a (tags: web-server)"));
        assert!(text.contains("Networks walkthrough complete."));
    }

    #[tokio::test]
    async fn test_interactive_runs_choice_then_exits() {
        let walkthrough = NetworksWalkthrough::new(test_config());
        let mut input = std::io::Cursor::new("2\n8\n");
        let mut out = Vec::new();

        walkthrough.run_menu(&mut input, &mut out).await.unwrap();

        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("==> [2/7] Create custom-mode network"));
        assert!(!text.contains("==> [1/7]"));
        assert_eq!(text.matches("=== VPC Networks Walkthrough ===").count(), 2);
    }
}
