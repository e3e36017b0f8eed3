//! Fast-path eligibility check
//!
//! Decides, without touching the packet, whether it is plain unicast transit
//! traffic the fast path may handle.

use crate::config::OptionsPolicy;
use crate::dataplane::{Interface, InterfaceTable, LinkCast, Packet};
use std::net::Ipv4Addr;

/// Why a packet must take the full input path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotEligibleReason {
    /// Frame was link-layer broadcast or multicast
    LinkNotUnicast,
    /// Arrived on a loopback interface
    LoopbackInterface,
    /// Limited or subnet-directed broadcast source or destination
    BroadcastAddress,
    MulticastAddress,
    /// 169.254/16 source or destination
    LinkLocalAddress,
    /// 0.0.0.0 source or destination
    UnspecifiedAddress,
    /// 127/8 source or destination
    LoopbackAddress,
    /// Header carries IP options
    IpOptions,
    /// Destination is one of our addresses
    LocalDestination,
}

/// Outcome of the eligibility check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Eligibility {
    Eligible,
    NotEligible(NotEligibleReason),
    /// Options refused by policy; report administratively prohibited
    Prohibited,
}

/// Check whether `packet` may be fast forwarded
pub fn validate(packet: &Packet, interfaces: &InterfaceTable, options: OptionsPolicy) -> Eligibility {
    use NotEligibleReason::*;

    if packet.link_cast() != LinkCast::Unicast {
        return Eligibility::NotEligible(LinkNotUnicast);
    }

    if interfaces
        .get(packet.ingress())
        .is_some_and(|iface| iface.loopback)
    {
        return Eligibility::NotEligible(LoopbackInterface);
    }

    for addr in [packet.src_addr(), packet.dst_addr()] {
        if let Some(reason) = special_address(addr) {
            return Eligibility::NotEligible(reason);
        }
    }

    if let Some(iface) = interfaces.get(packet.ingress()) {
        if [packet.src_addr(), packet.dst_addr()]
            .into_iter()
            .any(|addr| directed_broadcast(iface, addr))
        {
            return Eligibility::NotEligible(BroadcastAddress);
        }
    }

    if packet.ip().has_options() {
        match options {
            OptionsPolicy::Process => return Eligibility::NotEligible(IpOptions),
            OptionsPolicy::Reject => return Eligibility::Prohibited,
            OptionsPolicy::Ignore => {}
        }
    }

    if interfaces.is_local(packet.dst_addr()) {
        return Eligibility::NotEligible(LocalDestination);
    }

    Eligibility::Eligible
}

fn special_address(addr: Ipv4Addr) -> Option<NotEligibleReason> {
    if addr.is_broadcast() {
        Some(NotEligibleReason::BroadcastAddress)
    } else if addr.is_multicast() {
        Some(NotEligibleReason::MulticastAddress)
    } else if addr.is_link_local() {
        Some(NotEligibleReason::LinkLocalAddress)
    } else if addr.is_unspecified() {
        Some(NotEligibleReason::UnspecifiedAddress)
    } else if addr.is_loopback() {
        Some(NotEligibleReason::LoopbackAddress)
    } else {
        None
    }
}

/// Broadcast address of one of the receiving interface's subnets
///
/// /31 and /32 have no broadcast address.
fn directed_broadcast(iface: &Interface, addr: Ipv4Addr) -> bool {
    iface
        .addrs
        .iter()
        .any(|cidr| cidr.prefix_len() < 31 && cidr.broadcast() == addr)
}
