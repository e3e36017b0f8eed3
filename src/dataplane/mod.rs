//! Data plane components
//!
//! The fast forwarding path and the tables and collaborator seams it runs
//! against.

mod forwarder;
mod fragment;
mod hooks;
mod interface;
mod mutate;
mod packet;
mod redirect;
mod routing;
mod transmit;
mod validator;

pub use forwarder::{ConsumeReason, FastForwarder, ForwardOutcome};
pub use fragment::Ipv4Fragmenter;
pub use hooks::{Direction, HookChain, HookResult, PacketHook};
pub use interface::{ChecksumOffload, IfIndex, Interface, InterfaceTable};
pub use mutate::{decrement_ttl, Expired, TTL_DECREMENT};
pub use packet::{LinkCast, Packet};
pub use redirect::{maybe_build_redirect, RedirectCandidate, Snapshotted};
pub use routing::{
    DropReason, Fib, Nexthop, NexthopFlags, Route, RouteKind, RouteResolver, RouteSource,
    RoutingSystem, RoutingTable,
};
pub use transmit::{send_frames, Fragmenter, Frame, IcmpSender, LinkLayer, Sent, TxPlan};
pub use validator::{validate, Eligibility, NotEligibleReason};
