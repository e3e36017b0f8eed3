//! TTL decrement with incremental checksum update

use crate::dataplane::Packet;

/// Amount subtracted from the TTL per hop
pub const TTL_DECREMENT: u8 = 1;

/// The packet's TTL is exhausted and it must not be forwarded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Expired;

/// Decrement the TTL by [`TTL_DECREMENT`], adjusting the header checksum
///
/// On `Expired` the packet is left untouched so it can be quoted as-is in
/// the Time Exceeded message.
pub fn decrement_ttl(packet: &mut Packet) -> Result<(), Expired> {
    let ttl = packet.ttl();
    if ttl <= TTL_DECREMENT {
        return Err(Expired);
    }
    packet.ip_mut().set_ttl(ttl - TTL_DECREMENT);
    Ok(())
}
