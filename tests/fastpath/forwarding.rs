//! Routing, TTL and unreachable scenarios

use super::harness::*;
use fastfwd::dataplane::{ConsumeReason, ForwardOutcome, TTL_DECREMENT};
use fastfwd::protocol::icmp::{IcmpError, IcmpPacket, IcmpType};
use fastfwd::protocol::ipv4::Ipv4Header;

#[test]
fn test_ttl_one_sends_time_exceeded() {
    let h = Harness::new();
    let pkt = make_packet(CONNECTED_DST, 1, 100, true);
    let original = pkt.as_bytes().to_vec();

    assert!(h.fwd.try_forward(pkt).is_none());

    assert_eq!(h.link.attempts(), 0);
    let errors = h.icmp.sent();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].error, IcmpError::TimeExceeded);
    // Quoted header is the one received, TTL untouched
    assert_eq!(errors[0].original, original);

    let icmp = IcmpPacket::parse(&errors[0].message).unwrap();
    assert_eq!(icmp.message_type(), Some(IcmpType::TimeExceeded));
    assert_eq!(&icmp.original_datagram()[..28], &original[..28]);
    assert_eq!(h.fwd.metrics().ttl_expired.get(), 1);
}

#[test]
fn test_full_mtu_packet_forwarded() {
    let h = Harness::new();

    assert!(h.fwd.try_forward(make_packet(CONNECTED_DST, 64, 1500, true)).is_none());

    let sent = h.link.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].ifindex, ETH1);
    assert_eq!(sent[0].next_hop, CONNECTED_DST);
    assert_eq!(sent[0].frame.len(), 1500);

    let ip = Ipv4Header::parse(&sent[0].frame).unwrap();
    assert_eq!(ip.ttl(), 63);
    assert_eq!(ip.checksum(), recompute_checksum(&sent[0].frame));
    assert!(h.icmp.sent().is_empty());
}

#[test]
fn test_ttl_invariant() {
    let h = Harness::new();

    for ttl in [2, 3, 17, 64, 128, 200, 255] {
        assert!(h.fwd.try_forward(make_packet(REMOTE_DST, ttl, 60, false)).is_none());
        let sent = h.link.sent();
        let frame = &sent.last().unwrap().frame;
        let ip = Ipv4Header::parse(frame).unwrap();
        assert_eq!(ip.ttl(), ttl - TTL_DECREMENT);
        assert_eq!(ip.checksum(), recompute_checksum(frame), "ttl {}", ttl);
    }
    assert_eq!(h.fwd.metrics().forwarded.get(), 7);
    assert_eq!(h.fwd.metrics().fast_forwarded.get(), 7);
}

#[test]
fn test_gateway_is_link_next_hop() {
    let h = Harness::new();

    assert!(h.fwd.try_forward(make_packet(REMOTE_DST, 64, 60, false)).is_none());

    let sent = h.link.sent();
    assert_eq!(sent[0].ifindex, ETH1);
    assert_eq!(sent[0].next_hop, REMOTE_GW);
    // Only TTL and checksum differ from what was received
    let ip = Ipv4Header::parse(&sent[0].frame).unwrap();
    assert_eq!(ip.dst_addr(), REMOTE_DST);
    assert_eq!(ip.src_addr(), SENDER);
}

#[test]
fn test_reject_route_host_unreachable() {
    let h = Harness::new();
    let pkt = make_packet(REJECT_DST, 64, 60, false);
    let original = pkt.as_bytes().to_vec();

    assert!(matches!(
        h.fwd.forward(pkt),
        ForwardOutcome::Consumed(ConsumeReason::Reject)
    ));
    let errors = h.icmp.sent();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].error, IcmpError::HostUnreachable);
    assert_eq!(errors[0].original, original);
    assert_eq!(errors[0].message[1], 1);
    assert_eq!(h.link.attempts(), 0);
}

#[test]
fn test_blackhole_route_silent() {
    let h = Harness::new();

    assert!(matches!(
        h.fwd.forward(make_packet(BLACKHOLE_DST, 64, 60, false)),
        ForwardOutcome::Consumed(ConsumeReason::Discard)
    ));
    assert!(h.icmp.sent().is_empty());
    assert_eq!(h.link.attempts(), 0);
    assert_eq!(h.fwd.metrics().cant_forward.get(), 1);
}

#[test]
fn test_no_route_host_unreachable() {
    let h = Harness::new();
    let fib = StaticFib::default();
    let fwd = fastfwd::dataplane::FastForwarder::new(
        Default::default(),
        make_interfaces(),
        std::sync::Arc::new(fib),
        h.link.clone(),
        h.icmp.clone(),
    );

    assert!(fwd.try_forward(make_packet(REMOTE_DST, 64, 60, false)).is_none());
    assert_eq!(h.icmp.sent()[0].error, IcmpError::HostUnreachable);
    assert_eq!(fwd.metrics().no_route.get(), 1);
}

#[test]
fn test_concurrent_packets() {
    let h = Harness::new();

    std::thread::scope(|s| {
        for _ in 0..4 {
            s.spawn(|| {
                for _ in 0..25 {
                    assert!(h.fwd.try_forward(make_packet(REMOTE_DST, 64, 60, false)).is_none());
                }
            });
        }
    });

    assert_eq!(h.link.sent().len(), 100);
    assert_eq!(h.fwd.metrics().forwarded.get(), 100);
    assert_eq!(h.fwd.metrics().get("if2_tx_packets"), Some(100));
}
