//! Traffic the fast path must hand back untouched

use super::harness::*;
use fastfwd::config::{ForwardingConfig, OptionsPolicy};
use fastfwd::dataplane::{ForwardOutcome, LinkCast, NotEligibleReason, Packet};
use fastfwd::protocol::icmp::IcmpError;
use fastfwd::protocol::ipv4::{Ipv4Builder, Ipv4Header};
use std::net::Ipv4Addr;

/// Raw bytes with Ethernet minimum-frame padding after the datagram
fn padded(src: Ipv4Addr, dst: Ipv4Addr, options: &[u8]) -> Vec<u8> {
    let mut data = Ipv4Builder::new()
        .src_addr(src)
        .dst_addr(dst)
        .ttl(64)
        .options(options)
        .payload(&[0x5a; 6])
        .build();
    data.extend_from_slice(&[0u8; 14]);
    data
}

fn assert_handed_back(h: &Harness, pkt: Packet, expected: &[u8], reason: NotEligibleReason) {
    match h.fwd.forward(pkt) {
        ForwardOutcome::NotEligible(pkt, got) => {
            assert_eq!(got, reason);
            assert_eq!(pkt.into_bytes(), expected);
        }
        other => panic!("unexpected outcome {:?}", other),
    }
}

#[test]
fn test_special_addresses_untouched() {
    let h = Harness::new();
    let cases = [
        (SENDER, Ipv4Addr::new(224, 0, 0, 251), NotEligibleReason::MulticastAddress),
        (SENDER, Ipv4Addr::BROADCAST, NotEligibleReason::BroadcastAddress),
        (SENDER, Ipv4Addr::new(169, 254, 1, 1), NotEligibleReason::LinkLocalAddress),
        (Ipv4Addr::new(169, 254, 1, 1), REMOTE_DST, NotEligibleReason::LinkLocalAddress),
        (Ipv4Addr::UNSPECIFIED, REMOTE_DST, NotEligibleReason::UnspecifiedAddress),
        (SENDER, Ipv4Addr::new(192, 168, 1, 1), NotEligibleReason::LocalDestination),
    ];

    for (src, dst, reason) in cases {
        let data = padded(src, dst, &[]);
        let pkt = Packet::new(data.clone(), ETH0).unwrap();
        assert_handed_back(&h, pkt, &data, reason);
    }

    assert_eq!(h.link.attempts(), 0);
    assert!(h.icmp.sent().is_empty());
    assert!(h.fib.lookups.lock().unwrap().is_empty());
    assert_eq!(h.fwd.metrics().not_eligible.get(), 6);
}

#[test]
fn test_directed_broadcast_untouched() {
    let h = Harness::new();
    let subnet_bcast = Ipv4Addr::new(192, 168, 1, 255);

    for (src, dst) in [(SENDER, subnet_bcast), (subnet_bcast, REMOTE_DST)] {
        let data = padded(src, dst, &[]);
        let pkt = Packet::new(data.clone(), ETH0).unwrap();
        assert_handed_back(&h, pkt, &data, NotEligibleReason::BroadcastAddress);
    }

    assert_eq!(h.link.attempts(), 0);
    assert!(h.icmp.sent().is_empty());
    assert!(h.fib.lookups.lock().unwrap().is_empty());
    assert_eq!(h.fwd.metrics().not_eligible.get(), 2);
}

#[test]
fn test_options_untouched() {
    let h = Harness::new();
    let data = padded(SENDER, REMOTE_DST, &[0x94, 0x04, 0x00, 0x00]);
    let pkt = Packet::new(data.clone(), ETH0).unwrap();

    assert_eq!(h.fwd.try_forward(pkt).map(Packet::into_bytes), Some(data));
    assert_eq!(h.link.attempts(), 0);
}

#[test]
fn test_link_broadcast_untouched() {
    let h = Harness::new();
    let data = padded(SENDER, REMOTE_DST, &[]);
    let pkt = Packet::new(data.clone(), ETH0)
        .unwrap()
        .with_link_cast(LinkCast::Broadcast);

    assert_handed_back(&h, pkt, &data, NotEligibleReason::LinkNotUnicast);
}

#[test]
fn test_options_ignored_when_configured() {
    let h = Harness::with_config(ForwardingConfig {
        ip_options: OptionsPolicy::Ignore,
        ..ForwardingConfig::default()
    });
    let data = padded(SENDER, REMOTE_DST, &[0x94, 0x04, 0x00, 0x00]);

    assert!(h.fwd.try_forward(Packet::new(data, ETH0).unwrap()).is_none());

    let sent = h.link.sent();
    let ip = Ipv4Header::parse(&sent[0].frame).unwrap();
    assert_eq!(ip.header_len(), 24);
    assert_eq!(&sent[0].frame[20..24], &[0x94, 0x04, 0x00, 0x00]);
    assert!(ip.validate_checksum());
    // Padding is not transmitted
    assert_eq!(sent[0].frame.len(), 30);
}

#[test]
fn test_options_rejected_when_configured() {
    let h = Harness::with_config(ForwardingConfig {
        ip_options: OptionsPolicy::Reject,
        ..ForwardingConfig::default()
    });
    let data = padded(SENDER, REMOTE_DST, &[0x94, 0x04, 0x00, 0x00]);

    assert!(h.fwd.try_forward(Packet::new(data, ETH0).unwrap()).is_none());

    let errors = h.icmp.sent();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].error, IcmpError::AdminProhibited);
    assert_eq!(errors[0].message[1], 13);
    assert_eq!(h.link.attempts(), 0);
}
