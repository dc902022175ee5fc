//! vpclab - Google Cloud VPC walkthroughs
//!
//! # Usage
//!
//! ```bash
//! export PROJECT_ID=my-lab-project
//!
//! vpclab networks            # Interactive menu
//! vpclab networks --all      # Every step in order
//! vpclab firewall --all      # Needs custom-network from the networks walkthrough
//! vpclab cleanup --yes       # Delete everything the walkthroughs created
//!
//! # Offline, no gcloud needed
//! vpclab rules --format gcloud
//! vpclab simulate --scenarios
//! vpclab simulate --direction ingress --protocol tcp \
//!     --source 203.0.113.7 --destination 10.0.1.2 --port 80 --instance-tag web-server
//! ```

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::io::{self, Write};
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::Level;
use vpclab::config::LabConfig;
use vpclab::core::evaluator::{Firewall, Packet};
use vpclab::core::firewall::{Direction, FirewallRuleset, Protocol};
use vpclab::core::policy;
use vpclab::gcloud::format_command;
use vpclab::walkthrough::cleanup::{self, Cleanup};
use vpclab::walkthrough::firewall::FirewallWalkthrough;
use vpclab::walkthrough::networks::NetworksWalkthrough;
use vpclab::walkthrough::{evaluate_probes, plan, write_probe_report};
use vpclab::{Error, Result};

shadow_rs::shadow!(build);

#[derive(Parser)]
#[command(name = "vpclab")]
#[command(version = build::CLAP_LONG_VERSION)]
#[command(about = "Guided Google Cloud VPC network and firewall walkthroughs", long_about = None)]
struct Cli {
    /// Show debug logs on stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create VPC networks, subnets and instances
    Networks {
        /// Run every step in order without the menu
        #[arg(short, long)]
        all: bool,
    },
    /// Create firewall rules on custom-network and test connectivity
    Firewall {
        /// Run every step in order without the menu
        #[arg(short, long)]
        all: bool,
    },
    /// Delete every resource the walkthroughs create
    Cleanup {
        /// Do not ask for confirmation
        #[arg(short, long)]
        yes: bool,
    },
    /// Print the firewall rules the walkthrough creates
    Rules {
        #[arg(short, long, value_enum, default_value_t = RulesFormat::Text)]
        format: RulesFormat,
        /// Write to a file instead of stdout
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },
    /// Evaluate a packet against firewall rules locally
    Simulate(SimulateArgs),
}

#[derive(Clone, Copy, ValueEnum)]
enum RulesFormat {
    /// One summary line per rule, in evaluation order
    Text,
    /// The gcloud commands that create the rules
    Gcloud,
    /// A rule file usable with `simulate --rules`
    Json,
}

#[derive(Args)]
struct SimulateArgs {
    /// JSON rule file (default: the walkthrough's rules)
    #[arg(long, value_name = "FILE")]
    rules: Option<PathBuf>,

    /// Network the packet travels on (default: the ruleset's network)
    #[arg(long)]
    network: Option<String>,

    /// INGRESS or EGRESS
    #[arg(long, required_unless_present = "scenarios")]
    direction: Option<Direction>,

    /// tcp, udp, icmp, sctp, esp, ah, ipip, all or a protocol number
    #[arg(long, required_unless_present = "scenarios")]
    protocol: Option<Protocol>,

    #[arg(long, required_unless_present = "scenarios")]
    source: Option<IpAddr>,

    #[arg(long, required_unless_present = "scenarios")]
    destination: Option<IpAddr>,

    /// Destination port
    #[arg(long)]
    port: Option<u16>,

    #[arg(long)]
    source_port: Option<u16>,

    /// Tag of the instance the rules apply to (repeatable)
    #[arg(long = "instance-tag", value_name = "TAG")]
    instance_tags: Vec<String>,

    /// Tag of the other instance, for source-tag rules (repeatable)
    #[arg(long = "peer-tag", value_name = "TAG")]
    peer_tags: Vec<String>,

    /// Also evaluate the reply packet
    #[arg(long)]
    reply: bool,

    /// Evaluate the built-in lab scenarios instead of a single packet
    #[arg(long, conflicts_with_all = ["direction", "protocol", "source", "destination"])]
    scenarios: bool,

    /// Print verdicts as JSON
    #[arg(long)]
    json: bool,
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_max_level(if cli.verbose { Level::DEBUG } else { Level::WARN })
        .with_target(false)
        .init();

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Error: Failed to create Tokio runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(handle_cli(cli.command)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            report_error(&e);
            ExitCode::FAILURE
        }
    }
}

fn report_error(error: &Error) {
    eprintln!("Error: {error}");

    if let Some(translation) = error.translation() {
        if translation.user_message != error.to_string() {
            eprintln!("  {}", translation.user_message);
        }
        for suggestion in &translation.suggestions {
            eprintln!("  • {suggestion}");
        }
        if let Some(url) = &translation.help_url {
            eprintln!("  See: {url}");
        }
    }

    if let Error::Gcloud {
        stderr: Some(stderr),
        ..
    } = error
    {
        tracing::debug!("gcloud stderr:\n{stderr}");
    }
}

async fn handle_cli(command: Commands) -> Result<()> {
    let stdin = io::stdin();
    let mut stdout = io::stdout();

    match command {
        Commands::Networks { all } => {
            let walkthrough = NetworksWalkthrough::new(LabConfig::from_env()?);
            walkthrough.check_prerequisites()?;
            if all {
                walkthrough.run_all(&mut stdout).await?;
            } else {
                walkthrough
                    .run_menu(&mut stdin.lock(), &mut stdout)
                    .await?;
            }
        }
        Commands::Firewall { all } => {
            let walkthrough = FirewallWalkthrough::new(LabConfig::from_env()?);
            walkthrough.check_prerequisites().await?;
            if all {
                walkthrough.run_all(&mut stdout).await?;
            } else {
                walkthrough
                    .run_menu(&mut stdin.lock(), &mut stdout)
                    .await?;
            }
        }
        Commands::Cleanup { yes } => {
            let config = LabConfig::from_env()?;
            if !yes && !cleanup::confirm(&mut stdin.lock(), &mut stdout)? {
                println!("Aborted.");
                return Ok(());
            }
            Cleanup::new(config).run(&mut stdout).await?;
        }
        Commands::Rules { format, output } => {
            write_rules(&plan::firewall_ruleset(), format, output.as_deref()).await?;
        }
        Commands::Simulate(args) => simulate(args, &mut stdout).await?,
    }

    stdout.flush()?;
    Ok(())
}

async fn write_rules(
    ruleset: &FirewallRuleset,
    format: RulesFormat,
    output: Option<&Path>,
) -> Result<()> {
    let text = match format {
        RulesFormat::Text => ruleset.to_text(),
        RulesFormat::Gcloud => ruleset
            .rules
            .iter()
            .map(|rule| format_command("gcloud", &rule.to_gcloud_args()) + "\n")
            .collect(),
        RulesFormat::Json => {
            if let Some(path) = output {
                policy::save_ruleset(path, ruleset).await?;
                println!("Wrote {} rules to {}", ruleset.rules.len(), path.display());
                return Ok(());
            }
            serde_json::to_string_pretty(ruleset)? + "\n"
        }
    };

    match output {
        Some(path) => {
            tokio::fs::write(path, &text).await?;
            println!("Wrote {} rules to {}", ruleset.rules.len(), path.display());
        }
        None => print!("{text}"),
    }
    Ok(())
}

async fn simulate(args: SimulateArgs, out: &mut impl Write) -> Result<()> {
    let ruleset = match &args.rules {
        Some(path) => policy::load_ruleset(path).await?,
        None => plan::firewall_ruleset(),
    };
    let mut firewall = Firewall::new(ruleset)?;

    if args.scenarios {
        let outcomes = evaluate_probes(&mut firewall, &plan::probes());
        if args.json {
            writeln!(out, "{}", serde_json::to_string_pretty(&outcomes)?)?;
        } else {
            write_probe_report(&outcomes, out)?;
        }
        return Ok(());
    }

    let (Some(direction), Some(protocol), Some(source), Some(destination)) =
        (args.direction, args.protocol, args.source, args.destination)
    else {
        return Err(Error::Validation {
            field: "packet".to_string(),
            message: "--direction, --protocol, --source and --destination are required"
                .to_string(),
        });
    };

    let network = args
        .network
        .unwrap_or_else(|| firewall.network().to_string());
    let packet = Packet::new(network, direction, protocol, source, destination)
        .with_ports(args.source_port, args.port)
        .with_instance_tags(args.instance_tags)
        .with_peer_tags(args.peer_tags);

    let verdict = firewall.evaluate(&packet);
    let reply = args.reply.then(|| firewall.evaluate(&packet.reply()));

    if args.json {
        let value = serde_json::json!({
            "packet": packet.to_string(),
            "verdict": verdict,
            "reply": reply,
        });
        writeln!(out, "{}", serde_json::to_string_pretty(&value)?)?;
        return Ok(());
    }

    writeln!(out, "{packet}")?;
    writeln!(out, "  {verdict}")?;
    for shadowed in firewall.matching_rules(&packet).iter().skip(1) {
        writeln!(out, "  (also matches {} at priority {})", shadowed.name, shadowed.priority)?;
    }
    if let Some(reply) = reply {
        writeln!(out, "reply {}", packet.reply())?;
        writeln!(out, "  {reply}")?;
    }
    Ok(())
}
