//! Shared test utilities for unit tests
//!
//! Provides common builders and the mock gcloud setup so test suites do not
//! duplicate them. This module is only compiled in test mode.

use crate::config::{DEFAULT_REGION, DEFAULT_ZONE_1, DEFAULT_ZONE_2, LabConfig};
use crate::core::evaluator::Packet;
use crate::core::firewall::{
    Action, Direction, FirewallRule, FirewallRuleset, Protocol, RuleEntry,
};
use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::{Mutex, Once};

/// Mutex for tests that need exclusive access to environment variables.
///
/// Unit tests share one process, so a test that sets or removes a variable
/// must hold this guard until it has restored the previous state.
///
/// # Example
///
/// ```ignore
/// let _guard = ENV_VAR_MUTEX.lock().unwrap();
/// unsafe {
///     std::env::set_var("ZONE_1", "europe-west1-b");
/// }
/// // ... test with custom env state ...
/// unsafe {
///     std::env::remove_var("ZONE_1");
/// }
/// ```
pub static ENV_VAR_MUTEX: Mutex<()> = Mutex::new(());

/// One-time initialization flag for the mock gcloud script
static MOCK_GCLOUD_INIT: Once = Once::new();

/// Network used by evaluator tests
pub const NETWORK: &str = "test-network";

/// Path to `tests/mock_gcloud.sh`, made executable on first use.
///
/// Tests pass this path to [`crate::gcloud::Gcloud`] directly instead of
/// setting `VPCLAB_GCLOUD_COMMAND`, so they never touch the environment.
pub fn mock_gcloud_path() -> String {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("mock_gcloud.sh");

    MOCK_GCLOUD_INIT.call_once(|| {
        use std::os::unix::fs::PermissionsExt;
        let _ = std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755));
    });

    path.to_string_lossy().into_owned()
}

/// Default configuration pointing at the mock gcloud
pub fn test_config() -> LabConfig {
    LabConfig {
        project_id: "my-lab-project".to_string(),
        zone_1: DEFAULT_ZONE_1.to_string(),
        zone_2: DEFAULT_ZONE_2.to_string(),
        region: DEFAULT_REGION.to_string(),
        gcloud_command: mock_gcloud_path(),
    }
}

fn ip(value: &str) -> IpAddr {
    value.parse().unwrap()
}

/// A TCP packet on [`NETWORK`] from an ephemeral source port
pub fn tcp_packet(direction: Direction, source: &str, destination: &str, port: u16) -> Packet {
    Packet::new(NETWORK, direction, Protocol::Tcp, ip(source), ip(destination))
        .with_ports(Some(40000), Some(port))
}

pub fn icmp_packet(direction: Direction, source: &str, destination: &str) -> Packet {
    Packet::new(NETWORK, direction, Protocol::Icmp, ip(source), ip(destination))
}

/// Ingress rule on [`NETWORK`] with `--rules` style entries
pub fn ingress_rule(name: &str, priority: u16, action: Action, rules: &str) -> FirewallRule {
    FirewallRule::new(name, NETWORK)
        .with_priority(priority)
        .with_action(action)
        .with_entries(RuleEntry::parse_list(rules).unwrap())
}

pub fn egress_rule(name: &str, priority: u16, action: Action, rules: &str) -> FirewallRule {
    ingress_rule(name, priority, action, rules).with_direction(Direction::Egress)
}

pub fn ruleset(rules: Vec<FirewallRule>) -> FirewallRuleset {
    FirewallRuleset {
        network: NETWORK.to_string(),
        rules,
    }
}
