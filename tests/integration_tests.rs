//! Integration tests for vpclab
//!
//! These tests run the built binary end to end against `tests/mock_gcloud.sh`,
//! which records every gcloud invocation instead of touching a real project.
//! Each test gets its own log file and environment, so they run in parallel.
//!
//! ```bash
//! cargo test --test integration_tests
//! ```

#![allow(clippy::uninlined_format_args)]

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};
use tempfile::TempDir;

/// Get the path to the mock gcloud script
fn get_mock_gcloud_path() -> PathBuf {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("mock_gcloud.sh");

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let _ = std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755));
    }
    path
}

/// One isolated invocation environment: mock gcloud plus a private call log
struct Lab {
    dir: TempDir,
    envs: Vec<(String, String)>,
    removed: Vec<String>,
}

impl Lab {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let mut lab = Self {
            dir,
            envs: Vec::new(),
            removed: vec![
                "ZONE_1".to_string(),
                "ZONE_2".to_string(),
                "REGION".to_string(),
                "MOCK_GCLOUD_FAIL_ON".to_string(),
                "MOCK_GCLOUD_NETWORKS".to_string(),
                "MOCK_GCLOUD_EXTERNAL_IP".to_string(),
                "MOCK_GCLOUD_ZONE".to_string(),
            ],
        };
        lab.set("PROJECT_ID", "my-lab-project");
        lab.set(
            "VPCLAB_GCLOUD_COMMAND",
            get_mock_gcloud_path().to_str().unwrap(),
        );
        let log = lab.log_path();
        lab.set("MOCK_GCLOUD_LOG", log.to_str().unwrap());
        lab
    }

    fn set(&mut self, key: &str, value: &str) -> &mut Self {
        self.removed.retain(|k| k != key);
        self.envs.retain(|(k, _)| k != key);
        self.envs.push((key.to_string(), value.to_string()));
        self
    }

    fn unset(&mut self, key: &str) -> &mut Self {
        self.envs.retain(|(k, _)| k != key);
        self.removed.push(key.to_string());
        self
    }

    fn log_path(&self) -> PathBuf {
        self.dir.path().join("gcloud.log")
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    /// Recorded gcloud calls, one per line
    fn calls(&self) -> Vec<String> {
        std::fs::read_to_string(self.log_path())
            .unwrap_or_default()
            .lines()
            .map(ToString::to_string)
            .collect()
    }

    fn run(&self, args: &[&str]) -> Output {
        self.run_with_input(args, "")
    }

    fn run_with_input(&self, args: &[&str], input: &str) -> Output {
        let mut command = Command::new(env!("CARGO_BIN_EXE_vpclab"));
        command
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        for key in &self.removed {
            command.env_remove(key);
        }
        for (key, value) in &self.envs {
            command.env(key, value);
        }

        let mut child = command.spawn().unwrap();
        if let Some(mut stdin) = child.stdin.take() {
            // The binary may exit before reading everything
            let _ = stdin.write_all(input.as_bytes());
        }
        child.wait_with_output().unwrap()
    }
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

fn assert_calls(calls: &[String], expected: &[&str]) {
    assert_eq!(
        calls.len(),
        expected.len(),
        "unexpected gcloud calls:\n{}",
        calls.join("\n")
    );
    for (call, prefix) in calls.iter().zip(expected) {
        assert!(
            call.starts_with(prefix),
            "expected call starting with '{prefix}', got '{call}'"
        );
        assert!(call.ends_with("--project=my-lab-project"), "{call}");
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// CLI contract
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_help_exits_zero_without_calls() {
    let lab = Lab::new();
    for args in [
        &["--help"][..],
        &["-h"],
        &["networks", "--help"],
        &["firewall", "-h"],
        &["cleanup", "--help"],
    ] {
        let output = lab.run(args);
        assert_eq!(output.status.code(), Some(0), "{args:?}");
        assert!(stdout(&output).contains("Usage"), "{args:?}");
    }
    assert!(lab.calls().is_empty());
}

#[test]
fn test_help_lists_all_flag() {
    let output = Lab::new().run(&["networks", "--help"]);
    let text = stdout(&output);
    assert!(text.contains("-a, --all"));
}

#[test]
fn test_version_exits_zero() {
    let output = Lab::new().run(&["--version"]);
    assert_eq!(output.status.code(), Some(0));
    assert!(stdout(&output).contains("vpclab"));
}

#[test]
fn test_usage_error_exits_one() {
    let lab = Lab::new();
    assert_eq!(lab.run(&["bogus"]).status.code(), Some(1));
    assert_eq!(lab.run(&[]).status.code(), Some(1));
    assert_eq!(lab.run(&["networks", "--bogus"]).status.code(), Some(1));
    assert!(lab.calls().is_empty());
}

// ═══════════════════════════════════════════════════════════════════════════
// Prerequisites
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_missing_project_id_exits_one() {
    for walkthrough in ["networks", "firewall"] {
        let mut lab = Lab::new();
        lab.unset("PROJECT_ID");

        let output = lab.run(&[walkthrough, "--all"]);
        assert_eq!(output.status.code(), Some(1));
        assert!(stderr(&output).contains("PROJECT_ID"));
        assert!(lab.calls().is_empty());
    }
}

#[test]
fn test_missing_gcloud_exits_one() {
    let mut lab = Lab::new();
    lab.set("VPCLAB_GCLOUD_COMMAND", "/nonexistent/dir/gcloud");

    let output = lab.run(&["networks", "--all"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("not installed"));
}

#[test]
fn test_firewall_without_network_exits_one() {
    let mut lab = Lab::new();
    lab.set("MOCK_GCLOUD_NETWORKS", "");

    let output = lab.run(&["firewall", "--all"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("custom-network"));

    let calls = lab.calls();
    assert_calls(&calls, &["compute networks list --filter=name=(custom-network)"]);
    assert!(!calls.iter().any(|c| c.contains("firewall-rules create")));
}

#[test]
fn test_invalid_zone_exits_one() {
    let mut lab = Lab::new();
    lab.set("ZONE_1", "not a zone");

    let output = lab.run(&["networks", "--all"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("ZONE_1"));
    assert!(lab.calls().is_empty());
}

// ═══════════════════════════════════════════════════════════════════════════
// Networks walkthrough
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_networks_all_runs_steps_in_order() {
    let lab = Lab::new();
    let output = lab.run(&["networks", "--all"]);
    assert_eq!(output.status.code(), Some(0), "{}", stderr(&output));

    assert_calls(
        &lab.calls(),
        &[
            "compute networks create auto-network --subnet-mode=auto",
            "compute networks create custom-network --subnet-mode=custom",
            "compute networks subnets create subnet-a --network=custom-network --region=us-central1 --range=10.0.1.0/24",
            "compute networks subnets create subnet-b --network=custom-network --region=us-central1 --range=10.0.2.0/24",
            "compute instances create vm-a --zone=us-central1-a",
            "compute instances create vm-b --zone=us-central1-b",
            "compute networks list",
            "compute networks subnets list",
            "compute instances list",
        ],
    );
    assert!(stdout(&output).contains("Networks walkthrough complete."));
}

#[test]
fn test_networks_respects_zone_and_region() {
    let mut lab = Lab::new();
    lab.set("ZONE_2", "europe-west1-c").set("REGION", "europe-west1");

    let output = lab.run(&["networks", "-a"]);
    assert_eq!(output.status.code(), Some(0), "{}", stderr(&output));

    let calls = lab.calls();
    assert!(calls[2].contains("--region=europe-west1 "));
    assert!(calls[5].starts_with("compute instances create vm-b --zone=europe-west1-c"));
}

#[test]
fn test_networks_menu_runs_selected_steps() {
    let lab = Lab::new();
    let output = lab.run_with_input(&["networks"], "1\n5\n8\n");
    assert_eq!(output.status.code(), Some(0), "{}", stderr(&output));

    assert_calls(
        &lab.calls(),
        &[
            "compute networks create auto-network",
            "compute networks list",
        ],
    );
    // Menu shown initially and after each step
    assert_eq!(
        stdout(&output)
            .matches("=== VPC Networks Walkthrough ===")
            .count(),
        3
    );
}

#[test]
fn test_menu_ignores_invalid_choices() {
    let lab = Lab::new();
    let output = lab.run_with_input(&["networks"], "0\n9\nabc\n8\n");
    assert_eq!(output.status.code(), Some(0));
    assert!(stdout(&output).contains("Invalid option 'abc'"));
    assert!(lab.calls().is_empty());
}

#[test]
fn test_menu_exits_on_eof() {
    let lab = Lab::new();
    let output = lab.run_with_input(&["networks"], "");
    assert_eq!(output.status.code(), Some(0));
    assert!(lab.calls().is_empty());
}

#[test]
fn test_gcloud_failure_aborts_walkthrough() {
    let mut lab = Lab::new();
    lab.set("MOCK_GCLOUD_FAIL_ON", "subnets create subnet-a")
        .set("MOCK_GCLOUD_FAIL_MESSAGE", "Quota 'SUBNETWORKS' exceeded.");

    let output = lab.run(&["networks", "--all"]);
    assert_eq!(output.status.code(), Some(1));

    let err = stderr(&output);
    assert!(err.contains("Error: gcloud error: ERROR: (gcloud.mock) Quota"));
    assert!(err.contains("quota"), "missing hint: {err}");

    let calls = lab.calls();
    assert_eq!(calls.len(), 3);
    assert!(!calls.iter().any(|c| c.contains("instances create")));
}

// ═══════════════════════════════════════════════════════════════════════════
// Firewall walkthrough
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_firewall_all_runs_steps_in_order() {
    let lab = Lab::new();
    let output = lab.run(&["firewall", "--all"]);
    assert_eq!(output.status.code(), Some(0), "{}", stderr(&output));

    assert_calls(
        &lab.calls(),
        &[
            "compute networks list --filter=name=(custom-network)",
            "compute firewall-rules create allow-ssh --network=custom-network --direction=INGRESS --priority=1000 --action=ALLOW --rules=tcp:22 --source-ranges=0.0.0.0/0",
            "compute firewall-rules create allow-icmp-internal --network=custom-network --direction=INGRESS --priority=1000 --action=ALLOW --rules=icmp --source-ranges=10.0.0.0/16",
            "compute firewall-rules create allow-web --network=custom-network --direction=INGRESS --priority=1000 --action=ALLOW --rules=tcp:80,tcp:443 --source-ranges=0.0.0.0/0 --target-tags=web-server",
            "compute firewall-rules create allow-http-internal --network=custom-network --direction=INGRESS --priority=800 --action=ALLOW",
            "compute firewall-rules create deny-http-external --network=custom-network --direction=INGRESS --priority=900 --action=DENY",
            "compute firewall-rules create deny-egress-smtp --network=custom-network --direction=EGRESS --priority=1000 --action=DENY --rules=tcp:25 --destination-ranges=0.0.0.0/0",
            "compute firewall-rules list --filter=network:custom-network",
            "compute instances describe vm-b --zone=us-central1-b",
            "compute instances list --filter=name=(vm-a) --format=value(zone)",
            "compute ssh vm-a --zone=us-central1-a --command=ping -c 3 -W 2 34.0.0.2",
        ],
    );

    let text = stdout(&output);
    assert!(text.contains("0% packet loss"));
    assert!(text.contains("[DENY] HTTP from the internet to vm-a"));
    assert!(text.contains("Firewall walkthrough complete."));
}

#[test]
fn test_firewall_menu_runs_selected_steps() {
    let lab = Lab::new();
    let output = lab.run_with_input(&["firewall"], "4\n6\n8\n");
    assert_eq!(output.status.code(), Some(0), "{}", stderr(&output));

    assert_calls(
        &lab.calls(),
        &[
            "compute networks list --filter=name=(custom-network)",
            "compute firewall-rules create allow-http-internal",
            "compute firewall-rules create deny-http-external",
            "compute firewall-rules list",
        ],
    );
}

#[test]
fn test_empty_external_ip_exits_one() {
    let mut lab = Lab::new();
    lab.set("MOCK_GCLOUD_EXTERNAL_IP", "");

    let output = lab.run_with_input(&["firewall"], "7\n8\n");
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("external IP of vm-b"));
    assert!(!lab.calls().iter().any(|c| c.contains("compute ssh")));
}

#[test]
fn test_malformed_external_ip_never_reaches_ssh() {
    let mut lab = Lab::new();
    lab.set("MOCK_GCLOUD_EXTERNAL_IP", "34.0.0.2; touch /tmp/vpclab-owned");

    let output = lab.run_with_input(&["firewall"], "7\n8\n");
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("external IP of vm-b"));
    assert!(!lab.calls().iter().any(|c| c.contains("compute ssh")));
}

#[test]
fn test_unresolved_zone_exits_one() {
    let mut lab = Lab::new();
    lab.set("MOCK_GCLOUD_ZONE", "");

    let output = lab.run_with_input(&["firewall"], "7\n");
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("zone of vm-a"));
    assert!(!lab.calls().iter().any(|c| c.contains("compute ssh")));
}

// ═══════════════════════════════════════════════════════════════════════════
// Cleanup
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_cleanup_deletes_in_reverse_order() {
    let lab = Lab::new();
    let output = lab.run(&["cleanup", "--yes"]);
    assert_eq!(output.status.code(), Some(0), "{}", stderr(&output));

    let calls = lab.calls();
    assert_eq!(calls.len(), 12);
    assert!(calls[0].starts_with("compute firewall-rules delete deny-egress-smtp --quiet"));
    assert!(calls[5].starts_with("compute firewall-rules delete allow-ssh"));
    assert!(calls[6].starts_with("compute instances delete vm-b --zone=us-central1-b"));
    assert!(calls[8].starts_with("compute networks subnets delete subnet-b --region=us-central1"));
    assert!(calls[10].starts_with("compute networks delete custom-network"));
    assert!(calls[11].starts_with("compute networks delete auto-network"));
}

#[test]
fn test_cleanup_skips_missing_resources() {
    let mut lab = Lab::new();
    lab.set("MOCK_GCLOUD_FAIL_ON", "instances delete vm-a").set(
        "MOCK_GCLOUD_FAIL_MESSAGE",
        "The resource 'projects/my-lab-project/zones/us-central1-a/instances/vm-a' was not found",
    );

    let output = lab.run(&["cleanup", "--yes"]);
    assert_eq!(output.status.code(), Some(0), "{}", stderr(&output));
    assert_eq!(lab.calls().len(), 12);
    assert!(stdout(&output).contains("Skipped instance vm-a (us-central1-a) (not found)"));
    assert!(stdout(&output).contains("11 deleted, 1 already absent"));
}

#[test]
fn test_cleanup_stops_on_other_errors() {
    let mut lab = Lab::new();
    lab.set("MOCK_GCLOUD_FAIL_ON", "networks delete custom-network")
        .set("MOCK_GCLOUD_FAIL_MESSAGE", "The network resource is already being used by 'vm-x'");

    let output = lab.run(&["cleanup", "--yes"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(!lab.calls().iter().any(|c| c.contains("delete auto-network")));
}

#[test]
fn test_cleanup_requires_confirmation() {
    let lab = Lab::new();
    let output = lab.run_with_input(&["cleanup"], "n\n");
    assert_eq!(output.status.code(), Some(0));
    assert!(stdout(&output).contains("Aborted."));
    assert!(lab.calls().is_empty());

    let output = lab.run_with_input(&["cleanup"], "y\n");
    assert_eq!(output.status.code(), Some(0));
    assert_eq!(lab.calls().len(), 12);
}

// ═══════════════════════════════════════════════════════════════════════════
// Offline commands
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_rules_do_not_need_gcloud_or_project() {
    let mut lab = Lab::new();
    lab.unset("PROJECT_ID")
        .set("VPCLAB_GCLOUD_COMMAND", "/nonexistent/dir/gcloud");

    let output = lab.run(&["rules", "--format", "gcloud"]);
    assert_eq!(output.status.code(), Some(0), "{}", stderr(&output));

    let text = stdout(&output);
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 6);
    assert!(
        lines
            .iter()
            .all(|l| l.starts_with("gcloud compute firewall-rules create "))
    );
    assert!(lines[1].contains("--source-ranges=10.0.0.0/16"));
    assert!(lines[0].contains("'--description=Allow SSH from anywhere'"));
}

#[test]
fn test_rules_text_in_evaluation_order() {
    let output = Lab::new().run(&["rules"]);
    assert_eq!(output.status.code(), Some(0));

    let text = stdout(&output);
    let names: Vec<&str> = text
        .lines()
        .skip(1)
        .filter_map(|l| l.split_whitespace().next())
        .collect();
    assert_eq!(names[0], "allow-http-internal");
    assert_eq!(names[1], "deny-http-external");
    assert_eq!(names.len(), 6);
}

fn write_rules_file(lab: &Lab, path: &Path) {
    let output = lab.run(&["rules", "--format", "json", "--output", path.to_str().unwrap()]);
    assert_eq!(output.status.code(), Some(0), "{}", stderr(&output));
}

#[test]
fn test_simulate_with_rules_file() {
    let lab = Lab::new();
    let rules = lab.path("rules.json");
    write_rules_file(&lab, &rules);

    let output = lab.run(&[
        "simulate",
        "--rules",
        rules.to_str().unwrap(),
        "--direction",
        "ingress",
        "--protocol",
        "tcp",
        "--source",
        "203.0.113.7",
        "--destination",
        "10.0.1.2",
        "--port",
        "80",
        "--instance-tag",
        "web-server",
    ]);
    assert_eq!(output.status.code(), Some(0), "{}", stderr(&output));

    let text = stdout(&output);
    assert!(text.contains("DENY by rule 'deny-http-external' (priority 900)"));
    assert!(text.contains("also matches allow-web at priority 1000"));
}

#[test]
fn test_simulate_reply_is_established() {
    let output = Lab::new().run(&[
        "simulate",
        "--direction",
        "EGRESS",
        "--protocol",
        "tcp",
        "--source",
        "10.0.2.2",
        "--destination",
        "198.51.100.80",
        "--port",
        "443",
        "--source-port",
        "50000",
        "--reply",
        "--json",
    ]);
    assert_eq!(output.status.code(), Some(0), "{}", stderr(&output));

    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["verdict"]["action"], "ALLOW");
    assert_eq!(json["verdict"]["reason"]["kind"], "implied_allow_egress");
    assert_eq!(json["reply"]["reason"]["kind"], "established");
}

#[test]
fn test_simulate_scenarios_json() {
    let output = Lab::new().run(&["simulate", "--scenarios", "--json"]);
    assert_eq!(output.status.code(), Some(0), "{}", stderr(&output));

    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let outcomes = json.as_array().unwrap();
    assert_eq!(outcomes.len(), 8);
    assert_eq!(outcomes[1]["verdict"]["action"], "DENY");
}

#[test]
fn test_simulate_rejects_bad_input() {
    let lab = Lab::new();

    // Missing packet fields
    assert_eq!(lab.run(&["simulate", "--protocol", "tcp"]).status.code(), Some(1));

    // Unknown protocol
    let output = lab.run(&[
        "simulate",
        "--direction",
        "ingress",
        "--protocol",
        "bogus",
        "--source",
        "10.0.0.1",
        "--destination",
        "10.0.0.2",
    ]);
    assert_eq!(output.status.code(), Some(1));

    // Missing rule file
    let output = lab.run(&[
        "simulate",
        "--rules",
        lab.path("missing.json").to_str().unwrap(),
        "--scenarios",
    ]);
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("Rule file not found"));
}
