//! gcloud CLI wrapper
//!
//! Every cloud operation in the walkthroughs goes through [`Gcloud`], which
//! spawns the `gcloud` binary with a fixed `--project` flag and captures its
//! output. Arguments are passed directly to the process, never through a shell.
//!
//! # Environment Variables
//!
//! - `VPCLAB_GCLOUD_COMMAND`: Use a different program instead of `gcloud`.
//!   The test suite points this at `tests/mock_gcloud.sh`.
//!
//! # Example
//!
//! ```no_run
//! use vpclab::gcloud::Gcloud;
//!
//! # async fn example() -> vpclab::Result<()> {
//! let gcloud = Gcloud::new("my-lab-project");
//! if gcloud.network_exists("custom-network").await? {
//!     println!("{}", gcloud.list_firewall_rules("custom-network").await?);
//! }
//! # Ok(())
//! # }
//! ```

use crate::core::error::{Error, Result};
use crate::core::firewall::FirewallRule;
use ipnetwork::IpNetwork;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info};

/// Subnet allocation policy of a VPC network
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum SubnetMode {
    /// One subnet per region, created by GCP
    #[strum(serialize = "auto")]
    Auto,
    /// Subnets are created explicitly
    #[strum(serialize = "custom")]
    Custom,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkSpec {
    pub name: String,
    pub subnet_mode: SubnetMode,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubnetSpec {
    pub name: String,
    pub network: String,
    pub region: String,
    pub range: IpNetwork,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceSpec {
    pub name: String,
    pub zone: String,
    pub network: String,
    pub subnet: String,
    pub tags: Vec<String>,
    pub machine_type: String,
    pub image_family: String,
    pub image_project: String,
}

/// Checks if a program exists, either as a path or by searching `PATH`
fn binary_exists(name: &str) -> bool {
    if name.contains(std::path::MAIN_SEPARATOR) {
        return std::path::Path::new(name).is_file();
    }

    std::env::var_os("PATH")
        .and_then(|paths| {
            std::env::split_paths(&paths).find_map(|dir| {
                let full_path = dir.join(name);
                if full_path.is_file() {
                    Some(full_path)
                } else {
                    None
                }
            })
        })
        .is_some()
}

/// Renders a command line for display, quoting arguments that need it
pub fn format_command(program: &str, args: &[String]) -> String {
    let quote = |arg: &str| {
        if !arg.is_empty()
            && arg
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || "-_=./:,@".contains(c))
        {
            arg.to_string()
        } else {
            format!("'{}'", arg.replace('\'', r"'\''"))
        }
    };

    std::iter::once(program)
        .chain(args.iter().map(String::as_str))
        .map(quote)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Last path segment of a zone or region URL (`.../zones/us-central1-a` -> `us-central1-a`)
fn resource_basename(value: &str) -> &str {
    value.rsplit('/').next().unwrap_or(value)
}

/// gcloud CLI wrapper bound to one project
#[derive(Debug, Clone)]
pub struct Gcloud {
    program: String,
    project: String,
}

impl Gcloud {
    pub fn new(project: impl Into<String>) -> Self {
        Self::with_program(crate::config::DEFAULT_GCLOUD_COMMAND, project)
    }

    pub fn with_program(program: impl Into<String>, project: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            project: project.into(),
        }
    }

    pub fn from_config(config: &crate::config::LabConfig) -> Self {
        Self::with_program(&config.gcloud_command, &config.project_id)
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    /// Returns `true` if the gcloud program can be found
    pub fn is_installed(&self) -> bool {
        binary_exists(&self.program)
    }

    /// Runs gcloud with the given arguments plus `--project`, returning stdout
    ///
    /// # Errors
    ///
    /// Returns [`Error::Gcloud`] if the process cannot be spawned or exits non-zero.
    pub async fn run(&self, args: &[String]) -> Result<String> {
        let mut full_args = args.to_vec();
        full_args.push(format!("--project={}", self.project));

        debug!("Running: {}", format_command(&self.program, &full_args));

        let output = Command::new(&self.program)
            .args(&full_args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| Error::Gcloud {
                message: format!("Failed to run {}: {e}", self.program),
                stderr: Some(e.to_string()),
                exit_code: None,
            })?;

        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).into_owned())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            let message = stderr
                .lines()
                .find(|line| line.starts_with("ERROR"))
                .or_else(|| stderr.lines().next())
                .unwrap_or("command failed")
                .to_string();
            Err(Error::Gcloud {
                message,
                stderr: Some(stderr),
                exit_code: output.status.code(),
            })
        }
    }

    async fn run_str(&self, args: &[&str]) -> Result<String> {
        let args: Vec<String> = args.iter().map(ToString::to_string).collect();
        self.run(&args).await
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Networks
    // ═══════════════════════════════════════════════════════════════════════

    pub async fn create_network(&self, network: &NetworkSpec) -> Result<()> {
        crate::validators::validate_resource_name(&network.name).map_err(|message| {
            Error::Validation {
                field: "network".to_string(),
                message,
            }
        })?;

        info!("Creating {} mode network {}", network.subnet_mode, network.name);
        self.run_str(&[
            "compute",
            "networks",
            "create",
            &network.name,
            &format!("--subnet-mode={}", network.subnet_mode),
        ])
        .await?;
        Ok(())
    }

    pub async fn network_exists(&self, name: &str) -> Result<bool> {
        let output = self
            .run_str(&[
                "compute",
                "networks",
                "list",
                &format!("--filter=name=({name})"),
                "--format=value(name)",
            ])
            .await?;
        Ok(output.lines().any(|line| line.trim() == name))
    }

    pub async fn list_networks(&self) -> Result<String> {
        self.run_str(&["compute", "networks", "list"]).await
    }

    pub async fn delete_network(&self, name: &str) -> Result<()> {
        info!("Deleting network {name}");
        self.run_str(&["compute", "networks", "delete", name, "--quiet"])
            .await?;
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Subnets
    // ═══════════════════════════════════════════════════════════════════════

    pub async fn create_subnet(&self, subnet: &SubnetSpec) -> Result<()> {
        info!("Creating subnet {} ({}) in {}", subnet.name, subnet.range, subnet.region);
        self.run_str(&[
            "compute",
            "networks",
            "subnets",
            "create",
            &subnet.name,
            &format!("--network={}", subnet.network),
            &format!("--region={}", subnet.region),
            &format!("--range={}", subnet.range),
        ])
        .await?;
        Ok(())
    }

    pub async fn list_subnets(&self, network: &str) -> Result<String> {
        self.run_str(&[
            "compute",
            "networks",
            "subnets",
            "list",
            &format!("--filter=network:{network}"),
        ])
        .await
    }

    pub async fn delete_subnet(&self, name: &str, region: &str) -> Result<()> {
        info!("Deleting subnet {name}");
        self.run_str(&[
            "compute",
            "networks",
            "subnets",
            "delete",
            name,
            &format!("--region={region}"),
            "--quiet",
        ])
        .await?;
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Instances
    // ═══════════════════════════════════════════════════════════════════════

    pub async fn create_instance(&self, instance: &InstanceSpec) -> Result<()> {
        info!("Creating instance {} in {}", instance.name, instance.zone);

        let mut args = vec![
            "compute".to_string(),
            "instances".to_string(),
            "create".to_string(),
            instance.name.clone(),
            format!("--zone={}", instance.zone),
            format!("--machine-type={}", instance.machine_type),
            format!("--network={}", instance.network),
            format!("--subnet={}", instance.subnet),
            format!("--image-family={}", instance.image_family),
            format!("--image-project={}", instance.image_project),
        ];
        if !instance.tags.is_empty() {
            args.push(format!("--tags={}", instance.tags.join(",")));
        }

        self.run(&args).await?;
        Ok(())
    }

    pub async fn list_instances(&self) -> Result<String> {
        self.run_str(&["compute", "instances", "list"]).await
    }

    /// External (NAT) IP of an instance's first interface; empty if it has none
    pub async fn instance_external_ip(&self, name: &str, zone: &str) -> Result<String> {
        let output = self
            .run_str(&[
                "compute",
                "instances",
                "describe",
                name,
                &format!("--zone={zone}"),
                "--format=get(networkInterfaces[0].accessConfigs[0].natIP)",
            ])
            .await?;
        Ok(output.trim().to_string())
    }

    /// Zone an instance lives in; empty if no such instance is listed
    pub async fn instance_zone(&self, name: &str) -> Result<String> {
        let output = self
            .run_str(&[
                "compute",
                "instances",
                "list",
                &format!("--filter=name=({name})"),
                "--format=value(zone)",
            ])
            .await?;
        Ok(output
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .map(|zone| resource_basename(zone).to_string())
            .unwrap_or_default())
    }

    /// Runs a command on an instance over SSH
    pub async fn ssh_command(&self, name: &str, zone: &str, command: &str) -> Result<String> {
        info!("Running on {name}: {command}");
        self.run_str(&[
            "compute",
            "ssh",
            name,
            &format!("--zone={zone}"),
            &format!("--command={command}"),
            "--quiet",
        ])
        .await
    }

    pub async fn delete_instance(&self, name: &str, zone: &str) -> Result<()> {
        info!("Deleting instance {name}");
        self.run_str(&[
            "compute",
            "instances",
            "delete",
            name,
            &format!("--zone={zone}"),
            "--quiet",
        ])
        .await?;
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Firewall rules
    // ═══════════════════════════════════════════════════════════════════════

    /// Creates a firewall rule after validating it locally
    pub async fn create_firewall_rule(&self, rule: &FirewallRule) -> Result<()> {
        rule.validate()?;
        info!(
            "Creating firewall rule {} ({} {} priority {})",
            rule.name,
            rule.direction,
            rule.action,
            rule.priority
        );
        self.run(&rule.to_gcloud_args()).await?;
        Ok(())
    }

    pub async fn list_firewall_rules(&self, network: &str) -> Result<String> {
        self.run_str(&[
            "compute",
            "firewall-rules",
            "list",
            &format!("--filter=network:{network}"),
            "--sort-by=priority",
            "--format=table(name,direction,priority,sourceRanges.list():label=SRC_RANGES,destinationRanges.list():label=DEST_RANGES,allowed[].map().firewall_rule().list():label=ALLOW,denied[].map().firewall_rule().list():label=DENY,targetTags.list():label=TARGET_TAGS)",
        ])
        .await
    }

    pub async fn delete_firewall_rule(&self, name: &str) -> Result<()> {
        info!("Deleting firewall rule {name}");
        self.run_str(&["compute", "firewall-rules", "delete", name, "--quiet"])
            .await?;
        Ok(())
    }
}

/// Returns `true` if a gcloud failure means the resource does not exist
pub fn is_not_found(error: &Error) -> bool {
    match error {
        Error::Gcloud {
            stderr: Some(stderr),
            ..
        } => stderr.to_lowercase().contains("not found"),
        _ => false,
    }
}
