//! The resources the walkthroughs create
//!
//! Names and address ranges are fixed; zones and region come from [`LabConfig`].

use crate::config::LabConfig;
use crate::core::evaluator::Packet;
use crate::core::firewall::{
    Action, Direction, FirewallRule, FirewallRuleset, PortRange, Protocol, RuleEntry,
};
use crate::gcloud::{InstanceSpec, NetworkSpec, SubnetMode, SubnetSpec};
use ipnetwork::{IpNetwork, Ipv4Network};
use std::net::{IpAddr, Ipv4Addr};

pub const AUTO_NETWORK: &str = "auto-network";
pub const CUSTOM_NETWORK: &str = "custom-network";

pub const SUBNET_A: &str = "subnet-a";
pub const SUBNET_B: &str = "subnet-b";

pub const VM_A: &str = "vm-a";
pub const VM_B: &str = "vm-b";

pub const WEB_TAG: &str = "web-server";
pub const DB_TAG: &str = "db-server";

pub const MACHINE_TYPE: &str = "e2-micro";
pub const IMAGE_FAMILY: &str = "debian-12";
pub const IMAGE_PROJECT: &str = "debian-cloud";

/// Builds a range constant; an out-of-range prefix fails at compile time
const fn v4_network(addr: Ipv4Addr, prefix: u8) -> Ipv4Network {
    match Ipv4Network::new_checked(addr, prefix) {
        Some(network) => network,
        None => panic!("IPv4 prefix longer than 32 bits"),
    }
}

/// Covers both lab subnets
pub const INTERNAL_RANGE: Ipv4Network = v4_network(Ipv4Addr::new(10, 0, 0, 0), 16);
pub const ANYWHERE: Ipv4Network = v4_network(Ipv4Addr::UNSPECIFIED, 0);

pub const SUBNET_A_RANGE: Ipv4Network = v4_network(Ipv4Addr::new(10, 0, 1, 0), 24);
pub const SUBNET_B_RANGE: Ipv4Network = v4_network(Ipv4Addr::new(10, 0, 2, 0), 24);

/// Addresses used by the offline probes (the real ones are assigned by GCP)
pub const VM_A_INTERNAL: Ipv4Addr = Ipv4Addr::new(10, 0, 1, 2);
pub const VM_B_INTERNAL: Ipv4Addr = Ipv4Addr::new(10, 0, 2, 2);
pub const INTERNET_HOST: Ipv4Addr = Ipv4Addr::new(203, 0, 113, 10);
pub const MAIL_SERVER: Ipv4Addr = Ipv4Addr::new(198, 51, 100, 25);

fn ranges(network: Ipv4Network) -> Vec<IpNetwork> {
    vec![IpNetwork::V4(network)]
}

pub fn networks() -> Vec<NetworkSpec> {
    vec![
        NetworkSpec {
            name: AUTO_NETWORK.to_string(),
            subnet_mode: SubnetMode::Auto,
        },
        NetworkSpec {
            name: CUSTOM_NETWORK.to_string(),
            subnet_mode: SubnetMode::Custom,
        },
    ]
}

pub fn subnets(config: &LabConfig) -> Vec<SubnetSpec> {
    vec![
        SubnetSpec {
            name: SUBNET_A.to_string(),
            network: CUSTOM_NETWORK.to_string(),
            region: config.region.clone(),
            range: IpNetwork::V4(SUBNET_A_RANGE),
        },
        SubnetSpec {
            name: SUBNET_B.to_string(),
            network: CUSTOM_NETWORK.to_string(),
            region: config.region.clone(),
            range: IpNetwork::V4(SUBNET_B_RANGE),
        },
    ]
}

pub fn instances(config: &LabConfig) -> Vec<InstanceSpec> {
    let instance = |name: &str, zone: &str, subnet: &str, tag: &str| InstanceSpec {
        name: name.to_string(),
        zone: zone.to_string(),
        network: CUSTOM_NETWORK.to_string(),
        subnet: subnet.to_string(),
        tags: vec![tag.to_string()],
        machine_type: MACHINE_TYPE.to_string(),
        image_family: IMAGE_FAMILY.to_string(),
        image_project: IMAGE_PROJECT.to_string(),
    };

    vec![
        instance(VM_A, &config.zone_1, SUBNET_A, WEB_TAG),
        instance(VM_B, &config.zone_2, SUBNET_B, DB_TAG),
    ]
}

pub fn ssh_rule() -> FirewallRule {
    FirewallRule::new("allow-ssh", CUSTOM_NETWORK)
        .with_description("Allow SSH from anywhere")
        .with_entries(vec![RuleEntry::with_port(Protocol::Tcp, 22)])
        .with_source_ranges(ranges(ANYWHERE))
}

pub fn icmp_rule() -> FirewallRule {
    FirewallRule::new("allow-icmp-internal", CUSTOM_NETWORK)
        .with_description("Allow ICMP between lab subnets")
        .with_entries(vec![RuleEntry::protocol(Protocol::Icmp)])
        .with_source_ranges(ranges(INTERNAL_RANGE))
}

pub fn web_rule() -> FirewallRule {
    FirewallRule::new("allow-web", CUSTOM_NETWORK)
        .with_description("Allow HTTP and HTTPS to web servers")
        .with_entries(vec![RuleEntry {
            protocol: Protocol::Tcp,
            ports: vec![PortRange::single(80), PortRange::single(443)],
        }])
        .with_source_ranges(ranges(ANYWHERE))
        .with_target_tags(vec![WEB_TAG.to_string()])
}

/// Internal HTTP allowed at 800, external HTTP denied at 900, which shadows
/// the priority 1000 web rule for port 80 from outside.
pub fn priority_rules() -> [FirewallRule; 2] {
    [
        FirewallRule::new("allow-http-internal", CUSTOM_NETWORK)
            .with_description("Allow HTTP from lab subnets")
            .with_priority(800)
            .with_entries(vec![RuleEntry::with_port(Protocol::Tcp, 80)])
            .with_source_ranges(ranges(INTERNAL_RANGE))
            .with_target_tags(vec![WEB_TAG.to_string()]),
        FirewallRule::new("deny-http-external", CUSTOM_NETWORK)
            .with_description("Deny plain HTTP from outside")
            .with_priority(900)
            .with_action(Action::Deny)
            .with_entries(vec![RuleEntry::with_port(Protocol::Tcp, 80)])
            .with_source_ranges(ranges(ANYWHERE))
            .with_target_tags(vec![WEB_TAG.to_string()]),
    ]
}

pub fn egress_rule() -> FirewallRule {
    FirewallRule::new("deny-egress-smtp", CUSTOM_NETWORK)
        .with_description("Block outbound SMTP")
        .with_direction(Direction::Egress)
        .with_action(Action::Deny)
        .with_entries(vec![RuleEntry::with_port(Protocol::Tcp, 25)])
        .with_destination_ranges(ranges(ANYWHERE))
}

/// Every rule the firewall walkthrough creates, in creation order
pub fn firewall_rules() -> Vec<FirewallRule> {
    let mut rules = vec![ssh_rule(), icmp_rule(), web_rule()];
    rules.extend(priority_rules());
    rules.push(egress_rule());
    rules
}

pub fn firewall_ruleset() -> FirewallRuleset {
    FirewallRuleset {
        network: CUSTOM_NETWORK.to_string(),
        rules: firewall_rules(),
    }
}

/// A named packet the connectivity step and `vpclab simulate --scenarios` evaluate
#[derive(Debug, Clone)]
pub struct Probe {
    pub description: &'static str,
    pub packet: Packet,
    /// Also evaluate the reply after the packet
    pub check_reply: bool,
}

pub fn probes() -> Vec<Probe> {
    let web = vec![WEB_TAG.to_string()];
    let db = vec![DB_TAG.to_string()];
    let internet = IpAddr::V4(INTERNET_HOST);
    let vm_a = IpAddr::V4(VM_A_INTERNAL);
    let vm_b = IpAddr::V4(VM_B_INTERNAL);

    let tcp_in = |source: IpAddr, port: u16| {
        Packet::ingress(CUSTOM_NETWORK, Protocol::Tcp, source, vm_a)
            .with_ports(Some(49152), Some(port))
            .with_instance_tags(web.clone())
    };

    vec![
        Probe {
            description: "SSH from the internet to vm-a",
            packet: tcp_in(internet, 22),
            check_reply: true,
        },
        Probe {
            description: "HTTP from the internet to vm-a",
            packet: tcp_in(internet, 80),
            check_reply: false,
        },
        Probe {
            description: "HTTPS from the internet to vm-a",
            packet: tcp_in(internet, 443),
            check_reply: false,
        },
        Probe {
            description: "HTTP from vm-b to vm-a",
            packet: tcp_in(vm_b, 80).with_peer_tags(db.clone()),
            check_reply: true,
        },
        Probe {
            description: "ICMP from vm-b to vm-a",
            packet: Packet::ingress(CUSTOM_NETWORK, Protocol::Icmp, vm_b, vm_a)
                .with_instance_tags(web.clone())
                .with_peer_tags(db.clone()),
            check_reply: false,
        },
        Probe {
            description: "ICMP from the internet to vm-b",
            packet: Packet::ingress(CUSTOM_NETWORK, Protocol::Icmp, internet, vm_b)
                .with_instance_tags(db.clone()),
            check_reply: false,
        },
        Probe {
            description: "SMTP from vm-a to a mail server",
            packet: Packet::egress(CUSTOM_NETWORK, Protocol::Tcp, vm_a, IpAddr::V4(MAIL_SERVER))
                .with_ports(Some(49153), Some(25))
                .with_instance_tags(web.clone()),
            check_reply: false,
        },
        Probe {
            description: "HTTPS from vm-b to the internet",
            packet: Packet::egress(CUSTOM_NETWORK, Protocol::Tcp, vm_b, internet)
                .with_ports(Some(49154), Some(443))
                .with_instance_tags(db),
            check_reply: true,
        },
    ]
}
