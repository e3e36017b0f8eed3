//! Interface table
//!
//! Addresses, MTU and offload capabilities of the router's interfaces, as
//! needed by the forwarding path to recognise local traffic and size frames.

use crate::protocol::ipv4::Ipv4Cidr;
use bitflags::bitflags;
use std::collections::HashMap;
use std::net::Ipv4Addr;

/// Interface index
pub type IfIndex = u32;

bitflags! {
    /// Checksum work an interface can offload to hardware
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
    pub struct ChecksumOffload: u32 {
        /// IPv4 header checksum
        const IPV4 = 1 << 0;
    }
}

/// Interface information needed for forwarding
#[derive(Debug, Clone)]
pub struct Interface {
    pub index: IfIndex,
    pub name: String,
    /// Configured addresses, first one is primary
    pub addrs: Vec<Ipv4Cidr>,
    pub mtu: u16,
    pub loopback: bool,
    pub hw_checksum: ChecksumOffload,
}

impl Interface {
    pub fn new(index: IfIndex, name: impl Into<String>, mtu: u16) -> Self {
        Self {
            index,
            name: name.into(),
            addrs: Vec::new(),
            mtu,
            loopback: false,
            hw_checksum: ChecksumOffload::empty(),
        }
    }

    pub fn with_addr(mut self, addr: Ipv4Cidr) -> Self {
        self.addrs.push(addr);
        self
    }

    pub fn loopback(mut self) -> Self {
        self.loopback = true;
        self
    }

    pub fn with_hw_checksum(mut self, caps: ChecksumOffload) -> Self {
        self.hw_checksum = caps;
        self
    }

    /// Address whose subnet contains `ip`, if any
    pub fn addr_for(&self, ip: Ipv4Addr) -> Option<&Ipv4Cidr> {
        self.addrs.iter().find(|cidr| cidr.contains(ip))
    }
}

/// Interfaces indexed by interface index
#[derive(Debug, Clone, Default)]
pub struct InterfaceTable {
    interfaces: HashMap<IfIndex, Interface>,
}

impl InterfaceTable {
    pub fn new() -> Self {
        Self {
            interfaces: HashMap::new(),
        }
    }

    /// Register an interface, replacing any with the same index
    pub fn add(&mut self, iface: Interface) {
        self.interfaces.insert(iface.index, iface);
    }

    pub fn get(&self, index: IfIndex) -> Option<&Interface> {
        self.interfaces.get(&index)
    }

    /// Check if an address is assigned to one of our interfaces
    pub fn is_local(&self, addr: Ipv4Addr) -> bool {
        self.interfaces
            .values()
            .any(|iface| iface.addrs.iter().any(|cidr| cidr.addr() == addr))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Interface> {
        self.interfaces.values()
    }

    pub fn len(&self) -> usize {
        self.interfaces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.interfaces.is_empty()
    }
}
