//! Routing: nexthops, the FIB seam and route resolution
//!
//! The forwarding path only sees the [`Fib`] trait. [`RoutingSystem`] is the
//! in-tree longest-prefix-match implementation of it.

use crate::dataplane::IfIndex;
use crate::protocol::ipv4::Ipv4Cidr;
use bitflags::bitflags;
use serde::Deserialize;
use std::collections::HashMap;
use std::net::Ipv4Addr;
use tracing::trace;

bitflags! {
    /// Attributes of a resolved nexthop
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
    pub struct NexthopFlags: u32 {
        /// Matched through the default route
        const DEFAULT = 1 << 0;
        /// Learned from an ICMP redirect
        const REDIRECT = 1 << 1;
        /// Silently discard
        const BLACKHOLE = 1 << 2;
        /// Discard and report host unreachable
        const REJECT = 1 << 3;
        /// Destination is a broadcast address
        const BROADCAST = 1 << 4;
        /// Reached through a gateway
        const GATEWAY = 1 << 5;
    }
}

/// Resolved next network-layer hop for a destination
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Nexthop {
    /// Outgoing interface
    pub ifindex: IfIndex,
    /// Egress MTU
    pub mtu: u16,
    /// Gateway address, meaningful only with [`NexthopFlags::GATEWAY`]
    pub gateway: Option<Ipv4Addr>,
    pub flags: NexthopFlags,
    /// Interface address the route is attached to
    pub ifaddr: Option<Ipv4Cidr>,
}

impl Nexthop {
    /// Directly connected nexthop
    pub fn new(ifindex: IfIndex, mtu: u16) -> Self {
        Self {
            ifindex,
            mtu,
            gateway: None,
            flags: NexthopFlags::empty(),
            ifaddr: None,
        }
    }

    pub fn with_gateway(mut self, gateway: Ipv4Addr) -> Self {
        self.gateway = Some(gateway);
        self.flags |= NexthopFlags::GATEWAY;
        self
    }

    pub fn with_flags(mut self, flags: NexthopFlags) -> Self {
        self.flags |= flags;
        self
    }

    pub fn with_ifaddr(mut self, ifaddr: Ipv4Cidr) -> Self {
        self.ifaddr = Some(ifaddr);
        self
    }

    pub fn gateway(&self) -> Option<Ipv4Addr> {
        if self.flags.contains(NexthopFlags::GATEWAY) {
            self.gateway
        } else {
            None
        }
    }

    /// Address the link layer resolves: the gateway, or `dst` itself when connected
    pub fn next_hop_addr(&self, dst: Ipv4Addr) -> Ipv4Addr {
        self.gateway().unwrap_or(dst)
    }
}

/// Forwarding information base
///
/// Implementations are read-only from the forwarding path's point of view
/// and must be safe to query any number of times per packet.
pub trait Fib {
    fn lookup(&self, dst: Ipv4Addr, table: u32) -> Option<Nexthop>;
}

/// Why a destination cannot be forwarded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// No matching route; report host unreachable
    NoRoute,
    /// Blackhole or broadcast route; drop silently
    Discard,
    /// Reject route; report host unreachable
    Reject,
}

/// Classifies FIB results into forward or drop decisions
pub struct RouteResolver<'a> {
    fib: &'a dyn Fib,
    table: u32,
}

impl<'a> RouteResolver<'a> {
    pub fn new(fib: &'a dyn Fib, table: u32) -> Self {
        Self { fib, table }
    }

    pub fn resolve(&self, dst: Ipv4Addr) -> Result<Nexthop, DropReason> {
        let nexthop = match self.fib.lookup(dst, self.table) {
            Some(nh) => nh,
            None => {
                trace!(%dst, table = self.table, "no route");
                return Err(DropReason::NoRoute);
            }
        };

        if nexthop
            .flags
            .intersects(NexthopFlags::BLACKHOLE | NexthopFlags::BROADCAST)
        {
            return Err(DropReason::Discard);
        }
        if nexthop.flags.contains(NexthopFlags::REJECT) {
            return Err(DropReason::Reject);
        }

        Ok(nexthop)
    }
}

/// What a route does with matching traffic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RouteKind {
    #[default]
    Unicast,
    Blackhole,
    Reject,
}

/// Source of a route
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteSource {
    /// Directly connected network
    Connected,
    /// Static route from config
    Static,
    /// Learned from an ICMP redirect
    Redirect,
}

/// Route entry
#[derive(Debug, Clone)]
pub struct Route {
    /// Destination network
    pub destination: Ipv4Addr,
    /// Network prefix length
    pub prefix_len: u8,
    /// Next hop (None for directly connected)
    pub next_hop: Option<Ipv4Addr>,
    /// Outgoing interface
    pub interface: IfIndex,
    /// Path MTU towards the destination
    pub mtu: u16,
    /// Interface address the route hangs off
    pub ifaddr: Option<Ipv4Cidr>,
    pub kind: RouteKind,
    pub source: RouteSource,
}

impl Route {
    fn matches(&self, addr: Ipv4Addr) -> bool {
        Ipv4Cidr::new(self.destination, self.prefix_len).contains(addr)
    }

    /// Build the nexthop this route yields for `dst`
    pub fn nexthop_for(&self, dst: Ipv4Addr) -> Nexthop {
        let mut nh = Nexthop::new(self.interface, self.mtu);
        if let Some(gw) = self.next_hop {
            nh = nh.with_gateway(gw);
        }
        if let Some(ifaddr) = self.ifaddr {
            nh = nh.with_ifaddr(ifaddr);
        }

        let mut flags = NexthopFlags::empty();
        if self.prefix_len == 0 {
            flags |= NexthopFlags::DEFAULT;
        }
        if self.source == RouteSource::Redirect {
            flags |= NexthopFlags::REDIRECT;
        }
        match self.kind {
            RouteKind::Unicast => {}
            RouteKind::Blackhole => flags |= NexthopFlags::BLACKHOLE,
            RouteKind::Reject => flags |= NexthopFlags::REJECT,
        }
        // Subnet-directed broadcast on a connected network
        if self.next_hop.is_none()
            && self
                .ifaddr
                .is_some_and(|a| a.prefix_len() < 31 && a.broadcast() == dst)
        {
            flags |= NexthopFlags::BROADCAST;
        }

        nh.with_flags(flags)
    }
}

/// Routing table using longest prefix match
#[derive(Debug, Default)]
pub struct RoutingTable {
    routes: Vec<Route>,
    generation: u64,
}

impl RoutingTable {
    pub fn new() -> Self {
        Self {
            routes: Vec::new(),
            generation: 0,
        }
    }

    /// Add a route
    pub fn add(&mut self, route: Route) {
        // Remove existing route with same destination/prefix
        self.routes
            .retain(|r| r.destination != route.destination || r.prefix_len != route.prefix_len);

        self.routes.push(route);

        // Sort by prefix length (longest first) for LPM
        self.routes.sort_by(|a, b| b.prefix_len.cmp(&a.prefix_len));
        self.generation += 1;
    }

    /// Remove a route
    pub fn remove(&mut self, destination: Ipv4Addr, prefix_len: u8) {
        self.routes
            .retain(|r| r.destination != destination || r.prefix_len != prefix_len);
        self.generation += 1;
    }

    /// Lookup route using longest prefix match
    pub fn lookup(&self, addr: Ipv4Addr) -> Option<&Route> {
        self.routes.iter().find(|route| route.matches(addr))
    }

    /// Bumped on every change; lookups are a pure function of address and generation
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Get all routes
    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

/// Routing tables keyed by table id
#[derive(Debug, Default)]
pub struct RoutingSystem {
    tables: HashMap<u32, RoutingTable>,
}

impl RoutingSystem {
    pub fn new() -> Self {
        Self {
            tables: HashMap::new(),
        }
    }

    pub fn table(&self, id: u32) -> Option<&RoutingTable> {
        self.tables.get(&id)
    }

    /// Get a table, creating it when missing
    pub fn table_mut(&mut self, id: u32) -> &mut RoutingTable {
        self.tables.entry(id).or_default()
    }

    pub fn route_count(&self) -> usize {
        self.tables.values().map(RoutingTable::len).sum()
    }
}

impl Fib for RoutingSystem {
    fn lookup(&self, dst: Ipv4Addr, table: u32) -> Option<Nexthop> {
        self.tables
            .get(&table)?
            .lookup(dst)
            .map(|route| route.nexthop_for(dst))
    }
}
