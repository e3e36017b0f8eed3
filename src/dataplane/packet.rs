//! Received packet
//!
//! An owned IPv4 buffer together with the receive metadata the forwarding
//! path needs: where it came in and how the link layer addressed it.

use crate::dataplane::IfIndex;
use crate::protocol::ipv4::Ipv4Packet;
use crate::Result;
use std::net::Ipv4Addr;

/// How the link layer addressed the frame carrying the packet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LinkCast {
    #[default]
    Unicast,
    Broadcast,
    Multicast,
}

/// A packet owned by the forwarding path for the duration of one decision
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    ip: Ipv4Packet,
    ingress: IfIndex,
    link_cast: LinkCast,
    local_delivery: bool,
}

impl Packet {
    /// Wrap a received buffer arriving on `ingress`
    pub fn new(buffer: Vec<u8>, ingress: IfIndex) -> Result<Self> {
        Ok(Self {
            ip: Ipv4Packet::new(buffer)?,
            ingress,
            link_cast: LinkCast::Unicast,
            local_delivery: false,
        })
    }

    pub fn with_link_cast(mut self, cast: LinkCast) -> Self {
        self.link_cast = cast;
        self
    }

    pub fn ingress(&self) -> IfIndex {
        self.ingress
    }

    pub fn link_cast(&self) -> LinkCast {
        self.link_cast
    }

    /// Whether a policy hook asked for local delivery instead of forwarding
    pub fn local_delivery(&self) -> bool {
        self.local_delivery
    }

    pub fn mark_local_delivery(&mut self) {
        self.local_delivery = true;
    }

    pub fn src_addr(&self) -> Ipv4Addr {
        self.ip.src_addr()
    }

    pub fn dst_addr(&self) -> Ipv4Addr {
        self.ip.dst_addr()
    }

    pub fn ttl(&self) -> u8 {
        self.ip.ttl()
    }

    pub fn ip(&self) -> &Ipv4Packet {
        &self.ip
    }

    pub fn ip_mut(&mut self) -> &mut Ipv4Packet {
        &mut self.ip
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.ip.as_bytes()
    }

    /// Consume and return the buffer exactly as held
    pub fn into_bytes(self) -> Vec<u8> {
        self.ip.into_bytes()
    }

    /// Consume and return the wire bytes, link padding removed
    pub fn into_wire(self) -> Vec<u8> {
        self.ip.into_wire()
    }

    pub fn into_ip(self) -> Ipv4Packet {
        self.ip
    }
}
