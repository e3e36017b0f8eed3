//! Configuration validation

use super::types::parse_cidr;
use super::{Config, OptionsPolicy, DEFAULT_MTU};
use crate::protocol::ipv4::MIN_MTU;
use std::collections::HashMap;
use std::net::Ipv4Addr;

#[derive(Debug, Clone)]
pub struct ValidationResult {
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self {
            warnings: Vec::new(),
            errors: Vec::new(),
        }
    }

    pub fn warn(&mut self, msg: impl Into<String>) {
        self.warnings.push(msg.into());
    }

    pub fn error(&mut self, msg: impl Into<String>) {
        self.errors.push(msg.into());
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

impl Default for ValidationResult {
    fn default() -> Self {
        Self::new()
    }
}

/// Validate configuration and return warnings/errors
pub fn validate(config: &Config) -> ValidationResult {
    let mut result = ValidationResult::new();

    validate_forwarding(config, &mut result);
    validate_interfaces(config, &mut result);
    validate_routing(config, &mut result);

    result
}

fn validate_forwarding(config: &Config, result: &mut ValidationResult) {
    if config.forwarding.ip_options == OptionsPolicy::Ignore {
        result.warn("forwarding.ip_options: options will be forwarded without processing");
    }
}

fn validate_interfaces(config: &Config, result: &mut ValidationResult) {
    let mut seen: HashMap<u32, &str> = HashMap::new();

    for (name, iface) in &config.interfaces {
        if let Some(other) = seen.insert(iface.index, name) {
            result.error(format!(
                "interfaces.{}: index {} already used by {}",
                name, iface.index, other
            ));
        }

        match iface.mtu {
            None => result.warn(format!(
                "interfaces.{}: mtu not specified, using default 1500",
                name
            )),
            Some(mtu) if mtu < MIN_MTU => result.error(format!(
                "interfaces.{}: mtu {} below IPv4 minimum {}",
                name, mtu, MIN_MTU
            )),
            Some(_) => {}
        }

        if iface.addresses.is_empty() && !iface.loopback {
            result.warn(format!("interfaces.{}: no addresses configured", name));
        }

        for addr in &iface.addresses {
            if let Err(e) = parse_cidr(addr) {
                result.error(format!("interfaces.{}: {}", name, e));
            }
        }
    }
}

fn validate_routing(config: &Config, result: &mut ValidationResult) {
    for (i, route) in config.routing.static_routes.iter().enumerate() {
        if let Err(e) = parse_cidr(&route.destination) {
            result.error(format!("routing.static_routes[{}]: {}", i, e));
        }

        if !config.interfaces.contains_key(&route.interface) {
            result.error(format!(
                "routing.static_routes[{}]: unknown interface {}",
                i, route.interface
            ));
        }

        if let Some(gw) = &route.gateway {
            match gw.parse::<Ipv4Addr>() {
                Ok(addr) if addr.is_unspecified() => result.error(format!(
                    "routing.static_routes[{}]: gateway must not be 0.0.0.0",
                    i
                )),
                Ok(_) => {}
                Err(_) => result.error(format!(
                    "routing.static_routes[{}]: invalid gateway {}",
                    i, gw
                )),
            }
        }

        if route.mtu.is_some_and(|mtu| mtu < MIN_MTU) {
            result.error(format!(
                "routing.static_routes[{}]: mtu below IPv4 minimum {}",
                i, MIN_MTU
            ));
        }

        if let (Some(mtu), Some(iface)) = (route.mtu, config.interfaces.get(&route.interface)) {
            let link_mtu = iface.mtu.unwrap_or(DEFAULT_MTU);
            if mtu > link_mtu {
                result.warn(format!(
                    "routing.static_routes[{}]: mtu {} exceeds {} mtu {}, capped",
                    i, mtu, route.interface, link_mtu
                ));
            }
        }
    }
}
