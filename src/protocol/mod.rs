//! Wire formats used by the forwarding path

pub mod icmp;
pub mod ipv4;
