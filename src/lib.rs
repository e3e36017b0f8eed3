//! fastfwd - IPv4 fast forwarding
//!
//! Decides in a single pass whether a received unicast IPv4 packet can bypass
//! the full input path, and if so rewrites, routes, fragments and transmits it.
//! Packets that do not qualify are handed back untouched.

pub mod config;
pub mod dataplane;
pub mod error;
pub mod protocol;
pub mod telemetry;

pub use error::{Error, Result};
