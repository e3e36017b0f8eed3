//! Policy hook chains
//!
//! Registered inspection callbacks run before routing (inbound, over the
//! receiving interface) and after routing (outbound, over the egress
//! interface). Hooks may drop a packet, rewrite its destination or claim it
//! for local delivery.

use crate::dataplane::{IfIndex, Packet};
use std::net::Ipv4Addr;
use tracing::trace;

/// Which side of the routing decision a hook runs on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    In,
    Out,
}

/// Verdict of a single hook, and of a whole chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookResult {
    /// Continue unchanged
    Pass,
    /// Consume the packet silently
    Drop,
    /// Destination rewritten to the given address
    Redirected(Ipv4Addr),
    /// Deliver to this host instead of forwarding
    Local,
}

/// A packet inspection callback
///
/// Hooks run synchronously and to completion. They may edit the packet in
/// place; a hook that changes the destination should report it with
/// [`HookResult::Redirected`] so the chain keeps the checksum consistent.
pub trait PacketHook: Send + Sync {
    fn inspect(&self, packet: &mut Packet, dir: Direction, ifindex: IfIndex) -> HookResult;
}

impl<F> PacketHook for F
where
    F: Fn(&mut Packet, Direction, IfIndex) -> HookResult + Send + Sync,
{
    fn inspect(&self, packet: &mut Packet, dir: Direction, ifindex: IfIndex) -> HookResult {
        self(packet, dir, ifindex)
    }
}

/// Ordered list of hooks for one direction
pub struct HookChain {
    dir: Direction,
    hooks: Vec<Box<dyn PacketHook>>,
}

impl HookChain {
    pub fn new(dir: Direction) -> Self {
        Self {
            dir,
            hooks: Vec::new(),
        }
    }

    /// Append a hook; hooks run in registration order
    pub fn push(&mut self, hook: Box<dyn PacketHook>) {
        self.hooks.push(hook);
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    /// Run every hook over `packet` in the context of interface `ifindex`
    ///
    /// Returns `Drop` as soon as a hook drops, otherwise `Local` if any hook
    /// claimed the packet, `Redirected` if the destination differs from the
    /// one the chain started with, else `Pass`.
    pub fn run(&self, packet: &mut Packet, ifindex: IfIndex) -> HookResult {
        if self.hooks.is_empty() {
            return HookResult::Pass;
        }

        let orig_dst = packet.dst_addr();

        for (i, hook) in self.hooks.iter().enumerate() {
            match hook.inspect(packet, self.dir, ifindex) {
                HookResult::Pass => {}
                HookResult::Drop => {
                    trace!(dir = ?self.dir, hook = i, "hook dropped packet");
                    return HookResult::Drop;
                }
                HookResult::Redirected(dst) => {
                    if packet.dst_addr() != dst {
                        packet.ip_mut().set_dst_addr(dst);
                    }
                }
                HookResult::Local => packet.mark_local_delivery(),
            }
        }

        if packet.local_delivery() {
            HookResult::Local
        } else if packet.dst_addr() != orig_dst {
            HookResult::Redirected(packet.dst_addr())
        } else {
            HookResult::Pass
        }
    }
}
