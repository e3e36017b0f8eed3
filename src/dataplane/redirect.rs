//! ICMP redirect evaluation
//!
//! When a packet leaves through the interface it arrived on, towards a
//! gateway on the sender's own subnet, the sender could have used that
//! gateway directly. The router then forwards the packet anyway and tells
//! the sender with a host redirect.

use crate::config::{ForwardingConfig, RedirectSubnet};
use crate::dataplane::mutate::{self, Expired};
use crate::dataplane::{InterfaceTable, Nexthop, NexthopFlags, Packet};
use crate::protocol::icmp::QUOTE_PAYLOAD_LEN;
use std::net::Ipv4Addr;

/// A redirect to send once the packet has been transmitted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedirectCandidate {
    gateway: Ipv4Addr,
    quote: Vec<u8>,
}

impl RedirectCandidate {
    /// Gateway the sender should use
    pub fn gateway(&self) -> Ipv4Addr {
        self.gateway
    }

    /// Original header and leading payload, captured before any mutation
    pub fn quote(&self) -> &[u8] {
        &self.quote
    }
}

/// Decide whether forwarding `packet` via `nexthop` warrants a redirect
///
/// `original_src` is the source address the packet arrived with.
pub fn maybe_build_redirect(
    packet: &Packet,
    nexthop: &Nexthop,
    original_src: Ipv4Addr,
    config: &ForwardingConfig,
    interfaces: &InterfaceTable,
) -> Option<RedirectCandidate> {
    if !config.send_redirects {
        return None;
    }
    if nexthop.ifindex != packet.ingress() {
        return None;
    }
    // A hook translated the source; the sender is not who we would redirect
    if packet.src_addr() != original_src {
        return None;
    }
    if nexthop.flags.intersects(
        NexthopFlags::DEFAULT
            | NexthopFlags::REDIRECT
            | NexthopFlags::BLACKHOLE
            | NexthopFlags::REJECT,
    ) {
        return None;
    }

    let gateway = nexthop.gateway().filter(|gw| !gw.is_unspecified())?;

    let subnet = match config.redirect_subnet {
        RedirectSubnet::Nexthop => nexthop.ifaddr?,
        RedirectSubnet::EgressInterface => *interfaces.get(nexthop.ifindex)?.addr_for(gateway)?,
    };
    if !subnet.contains(original_src) || !subnet.contains(gateway) {
        return None;
    }

    Some(RedirectCandidate {
        gateway,
        quote: packet.ip().leading_bytes(QUOTE_PAYLOAD_LEN).to_vec(),
    })
}

/// A routed packet whose redirect decision has been taken
///
/// Header mutation is only offered from here, so the redirect quote always
/// reflects the packet as received.
#[derive(Debug)]
pub struct Snapshotted {
    packet: Packet,
    redirect: Option<RedirectCandidate>,
}

impl Snapshotted {
    pub fn take(
        packet: Packet,
        nexthop: &Nexthop,
        original_src: Ipv4Addr,
        config: &ForwardingConfig,
        interfaces: &InterfaceTable,
    ) -> Self {
        let redirect = maybe_build_redirect(&packet, nexthop, original_src, config, interfaces);
        Self { packet, redirect }
    }

    pub fn packet(&self) -> &Packet {
        &self.packet
    }

    pub fn decrement_ttl(&mut self) -> Result<(), Expired> {
        mutate::decrement_ttl(&mut self.packet)
    }

    pub fn into_parts(self) -> (Packet, Option<RedirectCandidate>) {
        (self.packet, self.redirect)
    }
}
