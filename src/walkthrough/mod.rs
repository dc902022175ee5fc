//! Guided GCP VPC walkthroughs
//!
//! Each walkthrough is a fixed list of steps that either runs in order
//! (`--all`) or from a numbered menu. Steps call gcloud through
//! [`crate::gcloud::Gcloud`]; the resources they create are defined in [`plan`].

pub mod cleanup;
pub mod firewall;
pub mod menu;
pub mod networks;
pub mod plan;

use crate::core::evaluator::{Firewall, Verdict};
use plan::Probe;
use serde::Serialize;
use std::io::{self, Write};

/// Result of evaluating one probe, and its reply if requested
#[derive(Debug, Clone, Serialize)]
pub struct ProbeOutcome {
    pub description: String,
    pub packet: String,
    pub verdict: Verdict,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply: Option<Verdict>,
}

/// Evaluates probes in order against one firewall, so earlier probes can
/// open connections that later replies use
pub fn evaluate_probes(firewall: &mut Firewall, probes: &[Probe]) -> Vec<ProbeOutcome> {
    probes
        .iter()
        .map(|probe| {
            let verdict = firewall.evaluate(&probe.packet);
            let reply = probe
                .check_reply
                .then(|| firewall.evaluate(&probe.packet.reply()));
            ProbeOutcome {
                description: probe.description.to_string(),
                packet: probe.packet.to_string(),
                verdict,
                reply,
            }
        })
        .collect()
}

pub fn write_probe_report(outcomes: &[ProbeOutcome], out: &mut impl Write) -> io::Result<()> {
    for outcome in outcomes {
        writeln!(out, "  [{}] {}", outcome.verdict.action, outcome.description)?;
        writeln!(out, "      {}", outcome.packet)?;
        writeln!(out, "      {}", outcome.verdict)?;
        if let Some(reply) = &outcome.reply {
            writeln!(out, "      reply: {reply}")?;
        }
    }
    Ok(())
}
