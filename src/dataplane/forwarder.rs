//! Fast forwarder
//!
//! Single pass over a received packet: eligibility, inbound hooks, route
//! lookup, outbound hooks, redirect snapshot, TTL decrement, transmit
//! planning and transmit. Every failure is settled here, either by handing
//! the packet back to the caller or by consuming it, with an ICMP error
//! where one is owed.

use crate::config::{Config, ForwardingConfig};
use crate::dataplane::hooks::{Direction, HookChain, HookResult, PacketHook};
use crate::dataplane::redirect::Snapshotted;
use crate::dataplane::routing::{DropReason, Fib, Nexthop, RouteResolver};
use crate::dataplane::transmit::{
    send_frames, Fragmenter, IcmpSender, LinkLayer, TxPlan,
};
use crate::dataplane::validator::{validate, Eligibility, NotEligibleReason};
use crate::dataplane::{InterfaceTable, Ipv4Fragmenter, Packet};
use crate::protocol::icmp::IcmpError;
use crate::telemetry::MetricsRegistry;
use crate::Result;
use std::sync::{Arc, RwLock};
use tracing::{debug, trace, warn};

/// Why a packet was consumed without being forwarded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumeReason {
    HookDropped,
    /// No route; host unreachable sent
    NoRoute,
    /// Reject route; host unreachable sent
    Reject,
    /// Blackhole or broadcast route
    Discard,
    /// TTL ran out; time exceeded sent
    TtlExpired,
    /// DF set and too big; fragmentation needed sent
    NeedFrag,
    /// IP options refused; administratively prohibited sent
    OptionsProhibited,
    FragmentFailed,
    TransmitFailed,
}

/// Result of a forwarding decision
#[derive(Debug)]
pub enum ForwardOutcome {
    /// Transmitted as `fragments` frames (1 when not fragmented)
    Forwarded { fragments: usize, redirect: bool },
    Consumed(ConsumeReason),
    /// Handed back unmodified for the full input path
    NotEligible(Packet, NotEligibleReason),
    /// Handed back for local delivery, possibly rewritten by hooks
    Local(Packet),
}

/// The fast forwarding engine
pub struct FastForwarder {
    config: RwLock<ForwardingConfig>,
    interfaces: InterfaceTable,
    fib: Arc<dyn Fib + Send + Sync>,
    link: Arc<dyn LinkLayer>,
    icmp: Arc<dyn IcmpSender>,
    fragmenter: Box<dyn Fragmenter>,
    inbound: HookChain,
    outbound: HookChain,
    metrics: Arc<MetricsRegistry>,
}

impl FastForwarder {
    pub fn new(
        config: ForwardingConfig,
        interfaces: InterfaceTable,
        fib: Arc<dyn Fib + Send + Sync>,
        link: Arc<dyn LinkLayer>,
        icmp: Arc<dyn IcmpSender>,
    ) -> Self {
        Self {
            config: RwLock::new(config),
            interfaces,
            fib,
            link,
            icmp,
            fragmenter: Box::new(Ipv4Fragmenter::new()),
            inbound: HookChain::new(Direction::In),
            outbound: HookChain::new(Direction::Out),
            metrics: Arc::new(MetricsRegistry::new()),
        }
    }

    /// Build from a loaded config file, using its static and connected
    /// routes as the FIB
    pub fn from_config(
        config: &Config,
        link: Arc<dyn LinkLayer>,
        icmp: Arc<dyn IcmpSender>,
    ) -> Result<Self> {
        let interfaces = config.build_interfaces()?;
        let routes = config.build_routes(&interfaces)?;
        debug!(
            interfaces = interfaces.len(),
            routes = routes.route_count(),
            "fast forwarder configured"
        );
        Ok(Self::new(
            config.forwarding,
            interfaces,
            Arc::new(routes),
            link,
            icmp,
        ))
    }

    pub fn with_fragmenter(mut self, fragmenter: Box<dyn Fragmenter>) -> Self {
        self.fragmenter = fragmenter;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsRegistry>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn add_hook(&mut self, dir: Direction, hook: Box<dyn PacketHook>) {
        match dir {
            Direction::In => self.inbound.push(hook),
            Direction::Out => self.outbound.push(hook),
        }
    }

    /// Replace the forwarding settings; decisions in flight keep their copy
    pub fn set_config(&self, config: ForwardingConfig) {
        match self.config.write() {
            Ok(mut current) => *current = config,
            Err(poisoned) => *poisoned.into_inner() = config,
        }
    }

    pub fn config(&self) -> ForwardingConfig {
        match self.config.read() {
            Ok(config) => *config,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    pub fn interfaces(&self) -> &InterfaceTable {
        &self.interfaces
    }

    pub fn metrics(&self) -> &Arc<MetricsRegistry> {
        &self.metrics
    }

    /// Try to forward `packet`
    ///
    /// `None` means the packet was consumed: forwarded, or dropped with any
    /// ICMP error already sent. `Some` hands it back to the full input path,
    /// bit-identical when it was not eligible, marked for local delivery
    /// otherwise.
    pub fn try_forward(&self, packet: Packet) -> Option<Packet> {
        match self.forward(packet) {
            ForwardOutcome::NotEligible(packet, _) | ForwardOutcome::Local(packet) => Some(packet),
            ForwardOutcome::Forwarded { .. } | ForwardOutcome::Consumed(_) => None,
        }
    }

    /// Run the forwarding decision and report how it ended
    pub fn forward(&self, mut packet: Packet) -> ForwardOutcome {
        let config = self.config();
        let ingress = packet.ingress();

        match validate(&packet, &self.interfaces, config.ip_options) {
            Eligibility::Eligible => self.metrics.total.inc(),
            Eligibility::NotEligible(reason) => {
                trace!(?reason, ingress, dst = %packet.dst_addr(), "not eligible");
                self.metrics.not_eligible.inc();
                return ForwardOutcome::NotEligible(packet, reason);
            }
            Eligibility::Prohibited => {
                self.metrics.total.inc();
                self.metrics.options_rejected.inc();
                debug!(src = %packet.src_addr(), "IP options refused");
                self.send_icmp(&packet, IcmpError::AdminProhibited);
                return ForwardOutcome::Consumed(ConsumeReason::OptionsProhibited);
            }
        }

        let original_src = packet.src_addr();

        match self.inbound.run(&mut packet, ingress) {
            HookResult::Pass => {}
            HookResult::Drop => return self.hook_dropped(),
            HookResult::Local => return ForwardOutcome::Local(packet),
            HookResult::Redirected(dst) => {
                if self.interfaces.is_local(dst) {
                    return self.deliver_locally(packet);
                }
            }
        }

        let resolver = RouteResolver::new(&*self.fib, config.fib);
        let mut nexthop = match self.resolve(&resolver, &packet) {
            Ok(nh) => nh,
            Err(reason) => return ForwardOutcome::Consumed(reason),
        };

        match self.outbound.run(&mut packet, nexthop.ifindex) {
            HookResult::Pass => {}
            HookResult::Drop => return self.hook_dropped(),
            HookResult::Local => return ForwardOutcome::Local(packet),
            HookResult::Redirected(dst) => {
                if self.interfaces.is_local(dst) {
                    return self.deliver_locally(packet);
                }
                debug!(%dst, "destination rewritten after routing, resolving again");
                nexthop = match self.resolve(&resolver, &packet) {
                    Ok(nh) => nh,
                    Err(reason) => return ForwardOutcome::Consumed(reason),
                };
            }
        }

        let mut stage = Snapshotted::take(packet, &nexthop, original_src, &config, &self.interfaces);
        if stage.decrement_ttl().is_err() {
            self.metrics.ttl_expired.inc();
            debug!(src = %original_src, "TTL exceeded in transit");
            self.send_icmp(stage.packet(), IcmpError::TimeExceeded);
            return ForwardOutcome::Consumed(ConsumeReason::TtlExpired);
        }
        let (packet, redirect) = stage.into_parts();

        let next_hop = nexthop.next_hop_addr(packet.dst_addr());
        let caps = self
            .interfaces
            .get(nexthop.ifindex)
            .map(|iface| iface.hw_checksum)
            .unwrap_or_default();

        let (frames, fragmented) = match TxPlan::plan(packet, &nexthop, caps, &*self.fragmenter) {
            Ok(TxPlan::Single(packet)) => (vec![packet.into_wire()], false),
            Ok(TxPlan::Fragmented(frames)) => (frames, true),
            Ok(TxPlan::NeedFragButDf { mtu, packet }) => {
                self.metrics.cant_frag.inc();
                debug!(mtu, len = packet.ip().total_length(), "fragmentation needed and DF set");
                self.send_icmp(&packet, IcmpError::NeedFrag { mtu });
                return ForwardOutcome::Consumed(ConsumeReason::NeedFrag);
            }
            Err(e) => {
                self.metrics.output_dropped.inc();
                warn!(error = %e, ifindex = nexthop.ifindex, "fragmentation failed");
                return ForwardOutcome::Consumed(ConsumeReason::FragmentFailed);
            }
        };

        let sent = match send_frames(&*self.link, frames, nexthop.ifindex, next_hop) {
            Ok(sent) => sent,
            Err(e) => {
                self.metrics.output_dropped.inc();
                self.metrics.record_tx_error(nexthop.ifindex);
                warn!(error = %e, ifindex = nexthop.ifindex, %next_hop, "transmit failed");
                return ForwardOutcome::Consumed(ConsumeReason::TransmitFailed);
            }
        };

        self.metrics.record_tx(nexthop.ifindex, sent.frames, sent.bytes);
        self.metrics.forwarded.inc();
        self.metrics.fast_forwarded.inc();
        if fragmented {
            self.metrics.fragmented.inc();
        }
        trace!(ifindex = nexthop.ifindex, %next_hop, frames = sent.frames, "forwarded");

        let redirect = match redirect {
            Some(candidate) => {
                debug!(
                    src = %original_src,
                    gateway = %candidate.gateway(),
                    "sending host redirect"
                );
                self.icmp.send_error(
                    candidate.quote(),
                    IcmpError::Redirect {
                        gateway: candidate.gateway(),
                    },
                );
                self.metrics.redirects_sent.inc();
                true
            }
            None => false,
        };

        ForwardOutcome::Forwarded {
            fragments: sent.frames,
            redirect,
        }
    }

    fn resolve(
        &self,
        resolver: &RouteResolver<'_>,
        packet: &Packet,
    ) -> std::result::Result<Nexthop, ConsumeReason> {
        let dst = packet.dst_addr();
        match resolver.resolve(dst) {
            Ok(nh) => Ok(nh),
            Err(DropReason::NoRoute) => {
                self.metrics.no_route.inc();
                self.metrics.cant_forward.inc();
                debug!(%dst, "no route to host");
                self.send_icmp(packet, IcmpError::HostUnreachable);
                Err(ConsumeReason::NoRoute)
            }
            Err(DropReason::Reject) => {
                self.metrics.cant_forward.inc();
                debug!(%dst, "reject route");
                self.send_icmp(packet, IcmpError::HostUnreachable);
                Err(ConsumeReason::Reject)
            }
            Err(DropReason::Discard) => {
                self.metrics.cant_forward.inc();
                trace!(%dst, "discarded by route");
                Err(ConsumeReason::Discard)
            }
        }
    }

    fn hook_dropped(&self) -> ForwardOutcome {
        self.metrics.hook_dropped.inc();
        ForwardOutcome::Consumed(ConsumeReason::HookDropped)
    }

    fn deliver_locally(&self, mut packet: Packet) -> ForwardOutcome {
        trace!(dst = %packet.dst_addr(), "rewritten to a local address");
        packet.mark_local_delivery();
        ForwardOutcome::Local(packet)
    }

    fn send_icmp(&self, packet: &Packet, error: IcmpError) {
        self.icmp.send_error(packet.ip().datagram(), error);
    }
}
