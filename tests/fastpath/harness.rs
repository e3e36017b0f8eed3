//! Recording collaborators and a two-interface topology
//!
//! ```text
//!   sender 192.168.1.100 ── eth0 (1) ── router ── eth1 (2) ── 10.0.0.0/24
//!   gw     192.168.1.2   ──┘
//! ```

use fastfwd::config::ForwardingConfig;
use fastfwd::dataplane::{
    ChecksumOffload, FastForwarder, Fib, Fragmenter, Frame, IcmpSender, IfIndex, Interface,
    InterfaceTable, Ipv4Fragmenter, LinkLayer, Nexthop, NexthopFlags, Packet,
};
use fastfwd::protocol::icmp::IcmpError;
use fastfwd::protocol::ipv4::{Ipv4Builder, Ipv4Cidr, Ipv4Packet};
use fastfwd::{Error, Result};
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub const SENDER: Ipv4Addr = Ipv4Addr::new(192, 168, 1, 100);
pub const ETH0: IfIndex = 1;
pub const ETH1: IfIndex = 2;
pub const MTU: u16 = 1500;

/// Gateway on the sender's own subnet, reached back out of eth0
pub const NEAR_GW: Ipv4Addr = Ipv4Addr::new(192, 168, 1, 2);
pub const DEFAULT_GW: Ipv4Addr = Ipv4Addr::new(192, 168, 1, 254);
pub const FAR_GW: Ipv4Addr = Ipv4Addr::new(172, 31, 0, 1);
pub const REMOTE_GW: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 2);

/// Destinations, one per kind of route
pub const CONNECTED_DST: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 50);
pub const REMOTE_DST: Ipv4Addr = Ipv4Addr::new(198, 51, 100, 7);
pub const NEAR_GW_DST: Ipv4Addr = Ipv4Addr::new(172, 16, 3, 3);
pub const FAR_GW_DST: Ipv4Addr = Ipv4Addr::new(172, 20, 3, 3);
pub const DEFAULT_DST: Ipv4Addr = Ipv4Addr::new(93, 184, 216, 34);
pub const REJECT_DST: Ipv4Addr = Ipv4Addr::new(203, 0, 113, 1);
pub const BLACKHOLE_DST: Ipv4Addr = Ipv4Addr::new(192, 0, 2, 1);

pub fn cidr(s: &str) -> Ipv4Cidr {
    Ipv4Cidr::parse(s).unwrap()
}

/// Longest-prefix FIB that records every lookup
#[derive(Default)]
pub struct StaticFib {
    entries: Vec<(Ipv4Cidr, Nexthop)>,
    pub lookups: Mutex<Vec<Ipv4Addr>>,
}

impl StaticFib {
    pub fn route(mut self, prefix: &str, nexthop: Nexthop) -> Self {
        self.entries.push((cidr(prefix), nexthop));
        self.entries
            .sort_by(|a, b| b.0.prefix_len().cmp(&a.0.prefix_len()));
        self
    }
}

impl Fib for StaticFib {
    fn lookup(&self, dst: Ipv4Addr, _table: u32) -> Option<Nexthop> {
        self.lookups.lock().unwrap().push(dst);
        self.entries
            .iter()
            .find(|(prefix, _)| prefix.contains(dst))
            .map(|(_, nh)| nh.clone())
    }
}

pub fn make_fib() -> StaticFib {
    let eth0_addr = cidr("192.168.1.1/24");
    let eth1_addr = cidr("10.0.0.1/24");

    StaticFib::default()
        .route("192.168.1.0/24", Nexthop::new(ETH0, MTU).with_ifaddr(eth0_addr))
        .route("10.0.0.0/24", Nexthop::new(ETH1, MTU).with_ifaddr(eth1_addr))
        .route(
            "198.51.100.0/24",
            Nexthop::new(ETH1, MTU)
                .with_gateway(REMOTE_GW)
                .with_ifaddr(eth1_addr),
        )
        .route(
            "172.16.0.0/16",
            Nexthop::new(ETH0, MTU)
                .with_gateway(NEAR_GW)
                .with_ifaddr(eth0_addr),
        )
        .route(
            "172.20.0.0/16",
            Nexthop::new(ETH0, MTU).with_gateway(FAR_GW),
        )
        .route(
            "203.0.113.0/24",
            Nexthop::new(ETH1, MTU).with_flags(NexthopFlags::REJECT),
        )
        .route(
            "192.0.2.0/24",
            Nexthop::new(ETH1, MTU).with_flags(NexthopFlags::BLACKHOLE),
        )
        .route(
            "0.0.0.0/0",
            Nexthop::new(ETH0, MTU)
                .with_gateway(DEFAULT_GW)
                .with_flags(NexthopFlags::DEFAULT)
                .with_ifaddr(eth0_addr),
        )
}

pub fn make_interfaces() -> InterfaceTable {
    let mut table = InterfaceTable::new();
    table.add(Interface::new(ETH0, "eth0", MTU).with_addr(cidr("192.168.1.1/24")));
    table.add(Interface::new(ETH1, "eth1", MTU).with_addr(cidr("10.0.0.1/24")));
    table
}

#[derive(Debug, Clone)]
pub struct Transmitted {
    pub frame: Frame,
    pub ifindex: IfIndex,
    pub next_hop: Ipv4Addr,
}

/// Link layer that keeps what it is given, failing from a chosen attempt on
pub struct RecordingLink {
    pub frames: Mutex<Vec<Transmitted>>,
    attempts: AtomicUsize,
    fail_at: AtomicUsize,
}

impl Default for RecordingLink {
    fn default() -> Self {
        Self {
            frames: Mutex::new(Vec::new()),
            attempts: AtomicUsize::new(0),
            fail_at: AtomicUsize::new(usize::MAX),
        }
    }
}

impl RecordingLink {
    /// Fail the `n`th transmit attempt (zero based) and every one after it
    pub fn fail_from(&self, n: usize) {
        self.fail_at.store(n, Ordering::SeqCst);
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn sent(&self) -> Vec<Transmitted> {
        self.frames.lock().unwrap().clone()
    }
}

impl LinkLayer for RecordingLink {
    fn transmit(&self, frame: Frame, ifindex: IfIndex, next_hop: Ipv4Addr) -> Result<()> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        if attempt >= self.fail_at.load(Ordering::SeqCst) {
            return Err(Error::Transmit("interface queue full".into()));
        }
        self.frames.lock().unwrap().push(Transmitted {
            frame,
            ifindex,
            next_hop,
        });
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct SentError {
    pub original: Vec<u8>,
    pub error: IcmpError,
    /// ICMP message as it would go on the wire
    pub message: Vec<u8>,
}

#[derive(Default)]
pub struct RecordingIcmp {
    pub sent: Mutex<Vec<SentError>>,
}

impl RecordingIcmp {
    pub fn sent(&self) -> Vec<SentError> {
        self.sent.lock().unwrap().clone()
    }
}

impl IcmpSender for RecordingIcmp {
    fn send_error(&self, original: &[u8], error: IcmpError) {
        let message = error.message(original).unwrap();
        self.sent.lock().unwrap().push(SentError {
            original: original.to_vec(),
            error,
            message,
        });
    }
}

/// Reference fragmenter that can be told to run out of buffers
///
/// Clones share their switches, so a test keeps one while the forwarder owns another.
#[derive(Clone, Default)]
pub struct FlakyFragmenter {
    pub fail: Arc<AtomicBool>,
    pub calls: Arc<AtomicUsize>,
    /// Offload capabilities passed with each call
    pub caps: Arc<Mutex<Vec<ChecksumOffload>>>,
}

impl Fragmenter for FlakyFragmenter {
    fn fragment(&self, packet: Ipv4Packet, mtu: u16, caps: ChecksumOffload) -> Result<Vec<Frame>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.caps.lock().unwrap().push(caps);
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::Fragment("no buffers".into()));
        }
        Ipv4Fragmenter::new().fragment(packet, mtu, caps)
    }
}

pub struct Harness {
    pub fwd: FastForwarder,
    pub fib: Arc<StaticFib>,
    pub link: Arc<RecordingLink>,
    pub icmp: Arc<RecordingIcmp>,
    pub fragmenter: FlakyFragmenter,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(ForwardingConfig::default())
    }

    pub fn with_config(config: ForwardingConfig) -> Self {
        Self::build(config, make_interfaces())
    }

    pub fn build(config: ForwardingConfig, interfaces: InterfaceTable) -> Self {
        let fib = Arc::new(make_fib());
        let link = Arc::new(RecordingLink::default());
        let icmp = Arc::new(RecordingIcmp::default());
        let fragmenter = FlakyFragmenter::default();

        let fwd = FastForwarder::new(
            config,
            interfaces,
            fib.clone(),
            link.clone(),
            icmp.clone(),
        )
        .with_fragmenter(Box::new(fragmenter.clone()));

        Self {
            fwd,
            fib,
            link,
            icmp,
            fragmenter,
        }
    }
}

/// UDP-ish packet from the sender on eth0, `len` bytes in total
pub fn make_packet(dst: Ipv4Addr, ttl: u8, len: usize, df: bool) -> Packet {
    let payload: Vec<u8> = (0..len - 20).map(|i| (i % 251) as u8).collect();
    let data = Ipv4Builder::new()
        .src_addr(SENDER)
        .dst_addr(dst)
        .identification(0xbeef)
        .ttl(ttl)
        .protocol(17)
        .dont_fragment(df)
        .payload(&payload)
        .build();
    Packet::new(data, ETH0).unwrap()
}

/// Checksum the header with its checksum field zeroed
pub fn recompute_checksum(frame: &[u8]) -> u16 {
    let header_len = (frame[0] & 0x0F) as usize * 4;
    let mut header = frame[..header_len].to_vec();
    header[10] = 0;
    header[11] = 0;
    fastfwd::protocol::ipv4::checksum(&header)
}
