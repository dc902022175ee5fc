//! Connection tracking for the local evaluator
//!
//! VPC firewall rules are stateful: once a connection is allowed in one
//! direction, its return traffic is allowed regardless of the rules for the
//! other direction. The tracker records allowed flows from the point of view
//! of the instance the rule applies to, so a reply is simply the same flow
//! travelling the opposite way.

use super::evaluator::Packet;
use super::firewall::{Direction, Protocol};
use std::collections::{HashMap, VecDeque};
use std::net::IpAddr;

/// Upper bound on tracked flows; the oldest flow is evicted past it
pub const MAX_TRACKED_FLOWS: usize = 65_536;

/// A flow as seen from the instance: local endpoint and remote endpoint
///
/// Flows are scoped to a network; a reply on another VPC is a new flow.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FlowKey {
    pub network: String,
    pub protocol: Protocol,
    pub local: IpAddr,
    pub local_port: Option<u16>,
    pub remote: IpAddr,
    pub remote_port: Option<u16>,
}

impl FlowKey {
    pub fn from_packet(packet: &Packet) -> Self {
        let network = packet.network.clone();
        let protocol = packet.protocol.canonical();
        match packet.direction {
            Direction::Ingress => Self {
                network,
                protocol,
                local: packet.destination,
                local_port: packet.destination_port,
                remote: packet.source,
                remote_port: packet.source_port,
            },
            Direction::Egress => Self {
                network,
                protocol,
                local: packet.source,
                local_port: packet.source_port,
                remote: packet.destination,
                remote_port: packet.destination_port,
            },
        }
    }
}

#[derive(Debug)]
pub struct ConnectionTracker {
    /// Flow -> direction of the packet that opened it
    flows: HashMap<FlowKey, Direction>,
    order: VecDeque<FlowKey>,
    capacity: usize,
}

impl Default for ConnectionTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionTracker {
    pub fn new() -> Self {
        Self::with_capacity(MAX_TRACKED_FLOWS)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            flows: HashMap::new(),
            order: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    /// Records an allowed packet's flow
    pub fn track(&mut self, packet: &Packet) {
        let key = FlowKey::from_packet(packet);
        if self.flows.contains_key(&key) {
            return;
        }

        if self.flows.len() >= self.capacity
            && let Some(oldest) = self.order.pop_front()
        {
            self.flows.remove(&oldest);
            tracing::debug!("Connection table full, evicted {:?}", oldest);
        }

        self.order.push_back(key.clone());
        self.flows.insert(key, packet.direction);
    }

    /// Returns `true` if the packet answers a flow opened in the opposite direction
    pub fn is_return_traffic(&self, packet: &Packet) -> bool {
        self.flows
            .get(&FlowKey::from_packet(packet))
            .is_some_and(|opened| *opened == packet.direction.reversed())
    }

    pub fn len(&self) -> usize {
        self.flows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flows.is_empty()
    }

    pub fn clear(&mut self) {
        self.flows.clear();
        self.order.clear();
    }
}
