//! Configuration types

use crate::dataplane::{
    ChecksumOffload, Interface, InterfaceTable, Route, RouteKind, RouteSource, RoutingSystem,
};
use crate::protocol::ipv4::Ipv4Cidr;
use crate::telemetry::LogConfig;
use crate::{Error, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::net::Ipv4Addr;

/// Default interface MTU
pub const DEFAULT_MTU: u16 = 1500;

/// What to do with packets carrying IP options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptionsPolicy {
    /// Leave them to the full input path
    #[default]
    Process,
    /// Forward as if the options were absent
    Ignore,
    /// Refuse with ICMP "communication administratively prohibited"
    Reject,
}

/// Which address supplies the subnet mask for the redirect check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RedirectSubnet {
    /// Address the FIB attached to the nexthop
    Nexthop,
    /// Address of the outgoing interface whose subnet holds the gateway
    #[default]
    EgressInterface,
}

/// Per-stack forwarding settings, copied once per forwarding decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ForwardingConfig {
    pub send_redirects: bool,
    pub ip_options: OptionsPolicy,
    pub redirect_subnet: RedirectSubnet,
    /// Routing table used for lookups
    pub fib: u32,
}

impl Default for ForwardingConfig {
    fn default() -> Self {
        Self {
            send_redirects: true,
            ip_options: OptionsPolicy::Process,
            redirect_subnet: RedirectSubnet::EgressInterface,
            fib: 0,
        }
    }
}

/// User-defined configuration (config.toml)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub forwarding: ForwardingConfig,
    #[serde(default)]
    pub log: LogConfig,
    #[serde(default)]
    pub interfaces: HashMap<String, InterfaceConfig>,
    #[serde(default)]
    pub routing: RoutingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InterfaceConfig {
    pub index: u32,
    /// CIDR strings, first is primary
    #[serde(default)]
    pub addresses: Vec<String>,
    pub mtu: Option<u16>,
    #[serde(default)]
    pub loopback: bool,
    /// Hardware computes IPv4 header checksums
    #[serde(default)]
    pub hw_checksum: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RoutingConfig {
    #[serde(default)]
    pub static_routes: Vec<StaticRoute>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StaticRoute {
    pub destination: String,
    #[serde(default)]
    pub gateway: Option<String>,
    pub interface: String,
    #[serde(default)]
    pub mtu: Option<u16>,
    #[serde(default)]
    pub kind: RouteKind,
    #[serde(default)]
    pub table: u32,
}

impl Config {
    /// Build the runtime interface table
    pub fn build_interfaces(&self) -> Result<InterfaceTable> {
        let mut table = InterfaceTable::new();

        for (name, cfg) in &self.interfaces {
            let mut iface = Interface::new(cfg.index, name.clone(), cfg.mtu.unwrap_or(DEFAULT_MTU));
            for addr in &cfg.addresses {
                iface = iface.with_addr(parse_cidr(addr)?);
            }
            if cfg.loopback {
                iface = iface.loopback();
            }
            if cfg.hw_checksum {
                iface = iface.with_hw_checksum(ChecksumOffload::IPV4);
            }
            table.add(iface);
        }

        Ok(table)
    }

    /// Build routing tables: connected routes for every interface address
    /// (in the forwarding table) plus the configured static routes
    pub fn build_routes(&self, interfaces: &InterfaceTable) -> Result<RoutingSystem> {
        let mut system = RoutingSystem::new();

        for iface in interfaces.iter() {
            for addr in &iface.addrs {
                system.table_mut(self.forwarding.fib).add(Route {
                    destination: addr.network(),
                    prefix_len: addr.prefix_len(),
                    next_hop: None,
                    interface: iface.index,
                    mtu: iface.mtu,
                    ifaddr: Some(*addr),
                    kind: RouteKind::Unicast,
                    source: RouteSource::Connected,
                });
            }
        }

        for route in &self.routing.static_routes {
            let destination = parse_cidr(&route.destination)?;
            let iface_cfg = self.interfaces.get(&route.interface).ok_or_else(|| {
                Error::Config(format!(
                    "route {}: unknown interface {}",
                    route.destination, route.interface
                ))
            })?;
            let iface = interfaces
                .get(iface_cfg.index)
                .ok_or(Error::InterfaceNotFound {
                    index: iface_cfg.index,
                })?;

            let next_hop = match &route.gateway {
                Some(gw) => Some(gw.parse::<Ipv4Addr>().map_err(|e| {
                    Error::Config(format!("route {}: gateway {}: {}", route.destination, gw, e))
                })?),
                None => None,
            };
            let ifaddr = match next_hop {
                Some(gw) => iface.addr_for(gw).copied(),
                None => iface.addrs.first().copied(),
            };

            system.table_mut(route.table).add(Route {
                destination: destination.network(),
                prefix_len: destination.prefix_len(),
                next_hop,
                interface: iface.index,
                // A route cannot carry more than its link
                mtu: route.mtu.map_or(iface.mtu, |mtu| mtu.min(iface.mtu)),
                ifaddr,
                kind: route.kind,
                source: RouteSource::Static,
            });
        }

        Ok(system)
    }
}

pub(crate) fn parse_cidr(s: &str) -> Result<Ipv4Cidr> {
    Ipv4Cidr::parse(s).ok_or_else(|| Error::Config(format!("invalid CIDR: {}", s)))
}
