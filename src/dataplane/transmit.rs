//! Transmit planning and the collaborator seams below the forwarding path
//!
//! A routed packet either fits the next-hop MTU, is split by a
//! [`Fragmenter`], or is refused because the sender set DF. Frames are then
//! handed one at a time to the [`LinkLayer`].

use crate::dataplane::{ChecksumOffload, IfIndex, Nexthop, Packet};
use crate::protocol::icmp::IcmpError;
use crate::protocol::ipv4::Ipv4Packet;
use crate::{Error, Result};
use std::net::Ipv4Addr;
use tracing::trace;

/// A complete IPv4 datagram ready for the link layer
pub type Frame = Vec<u8>;

/// Link-layer output
pub trait LinkLayer: Send + Sync {
    /// Send `frame` out of `ifindex` towards `next_hop`
    fn transmit(&self, frame: Frame, ifindex: IfIndex, next_hop: Ipv4Addr) -> Result<()>;
}

/// Splits an oversized datagram into fragments no longer than `mtu`
pub trait Fragmenter: Send + Sync {
    fn fragment(&self, packet: Ipv4Packet, mtu: u16, caps: ChecksumOffload) -> Result<Vec<Frame>>;
}

/// Emits ICMP errors back to the source of `original`
///
/// `original` is an IPv4 datagram, or its leading bytes; see
/// [`IcmpError::message`] for building the ICMP body.
pub trait IcmpSender: Send + Sync {
    fn send_error(&self, original: &[u8], error: IcmpError);
}

/// How a routed packet will leave
#[derive(Debug)]
pub enum TxPlan {
    Single(Packet),
    Fragmented(Vec<Frame>),
    /// Too big for `mtu` and fragmentation is forbidden
    NeedFragButDf { mtu: u16, packet: Packet },
}

impl TxPlan {
    /// Choose how to send `packet` over `nexthop`
    ///
    /// Fails only when the fragmenter does; nothing has been sent then.
    pub fn plan(
        packet: Packet,
        nexthop: &Nexthop,
        caps: ChecksumOffload,
        fragmenter: &dyn Fragmenter,
    ) -> Result<Self> {
        let len = packet.ip().total_length();
        if len <= nexthop.mtu {
            return Ok(TxPlan::Single(packet));
        }
        if packet.ip().dont_fragment() {
            return Ok(TxPlan::NeedFragButDf {
                mtu: nexthop.mtu,
                packet,
            });
        }

        let frames = fragmenter.fragment(packet.into_ip(), nexthop.mtu, caps)?;
        if frames.is_empty() {
            return Err(Error::Fragment("fragmenter produced no frames".into()));
        }
        trace!(len, mtu = nexthop.mtu, count = frames.len(), "fragmented");
        Ok(TxPlan::Fragmented(frames))
    }
}

/// Frames and bytes accepted by the link layer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Sent {
    pub frames: usize,
    pub bytes: usize,
}

/// Hand `frames` to the link layer in order
///
/// Stops at the first failure; the frames not yet sent are released with
/// the iterator.
pub fn send_frames(
    link: &dyn LinkLayer,
    frames: Vec<Frame>,
    ifindex: IfIndex,
    next_hop: Ipv4Addr,
) -> Result<Sent> {
    let mut sent = Sent::default();
    for frame in frames {
        let len = frame.len();
        link.transmit(frame, ifindex, next_hop)?;
        sent.frames += 1;
        sent.bytes += len;
    }
    Ok(sent)
}
