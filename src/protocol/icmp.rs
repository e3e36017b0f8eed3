//! ICMP (Internet Control Message Protocol) - RFC 792
//!
//! Only the error messages a forwarding router originates are covered:
//! Destination Unreachable, Time Exceeded and Redirect.

use crate::{Error, Result};
use std::net::Ipv4Addr;

/// ICMP header size (minimum)
pub const ICMP_HEADER_SIZE: usize = 8;

/// Bytes of the offending datagram's payload quoted after its header
pub const QUOTE_PAYLOAD_LEN: usize = 8;

/// ICMP message types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum IcmpType {
    DestinationUnreachable = 3,
    Redirect = 5,
    TimeExceeded = 11,
}

impl IcmpType {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            3 => Some(IcmpType::DestinationUnreachable),
            5 => Some(IcmpType::Redirect),
            11 => Some(IcmpType::TimeExceeded),
            _ => None,
        }
    }
}

/// Destination Unreachable codes (RFC 792, RFC 1812)
pub mod dest_unreachable {
    /// Host unreachable
    pub const HOST_UNREACHABLE: u8 = 1;
    /// Fragmentation needed but DF set
    pub const FRAGMENTATION_NEEDED: u8 = 4;
    /// Communication administratively prohibited
    pub const COMM_PROHIBITED: u8 = 13;
}

/// Time Exceeded codes (RFC 792)
pub mod time_exceeded {
    /// TTL exceeded in transit
    pub const TTL_EXCEEDED: u8 = 0;
}

/// Redirect codes (RFC 792)
pub mod redirect {
    /// Redirect datagrams for the network
    pub const NETWORK: u8 = 0;
    /// Redirect datagrams for the host
    pub const HOST: u8 = 1;
}

/// An ICMP error the forwarding path asks to have sent back to a packet's source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IcmpError {
    /// No usable route, or a reject route
    HostUnreachable,
    /// TTL ran out in transit
    TimeExceeded,
    /// Packet exceeds the next-hop MTU and carries DF
    NeedFrag { mtu: u16 },
    /// Sender should use `gateway` for this destination
    Redirect { gateway: Ipv4Addr },
    /// IP options refused by policy
    AdminProhibited,
}

impl IcmpError {
    pub fn icmp_type(&self) -> IcmpType {
        match self {
            IcmpError::HostUnreachable | IcmpError::NeedFrag { .. } | IcmpError::AdminProhibited => {
                IcmpType::DestinationUnreachable
            }
            IcmpError::TimeExceeded => IcmpType::TimeExceeded,
            IcmpError::Redirect { .. } => IcmpType::Redirect,
        }
    }

    pub fn code(&self) -> u8 {
        match self {
            IcmpError::HostUnreachable => dest_unreachable::HOST_UNREACHABLE,
            IcmpError::NeedFrag { .. } => dest_unreachable::FRAGMENTATION_NEEDED,
            IcmpError::AdminProhibited => dest_unreachable::COMM_PROHIBITED,
            IcmpError::TimeExceeded => time_exceeded::TTL_EXCEEDED,
            IcmpError::Redirect { .. } => redirect::HOST,
        }
    }

    /// Build the ICMP message quoting `original` (an IPv4 packet or its leading bytes)
    pub fn message(&self, original: &[u8]) -> Result<Vec<u8>> {
        let header_len = quoted_header_len(original)?;
        let (header, payload) = original.split_at(header_len);

        Ok(match *self {
            IcmpError::HostUnreachable | IcmpError::AdminProhibited => {
                build_destination_unreachable(self.code(), header, payload, 0)
            }
            IcmpError::NeedFrag { mtu } => {
                build_destination_unreachable(self.code(), header, payload, mtu)
            }
            IcmpError::TimeExceeded => build_time_exceeded(self.code(), header, payload),
            IcmpError::Redirect { gateway } => build_redirect(self.code(), gateway, header, payload),
        })
    }
}

fn quoted_header_len(original: &[u8]) -> Result<usize> {
    if original.is_empty() {
        return Err(Error::Parse("nothing to quote in ICMP error".into()));
    }
    let header_len = (original[0] & 0x0F) as usize * 4;
    if header_len < 20 || original.len() < header_len {
        return Err(Error::Parse("quoted IPv4 header truncated".into()));
    }
    Ok(header_len)
}

/// Parsed ICMP message
#[derive(Debug)]
pub struct IcmpPacket<'a> {
    buffer: &'a [u8],
}

impl<'a> IcmpPacket<'a> {
    pub fn parse(buffer: &'a [u8]) -> Result<Self> {
        if buffer.len() < ICMP_HEADER_SIZE {
            return Err(Error::Parse("ICMP packet too short".into()));
        }

        Ok(Self { buffer })
    }

    pub fn icmp_type(&self) -> u8 {
        self.buffer[0]
    }

    pub fn code(&self) -> u8 {
        self.buffer[1]
    }

    pub fn checksum(&self) -> u16 {
        u16::from_be_bytes([self.buffer[2], self.buffer[3]])
    }

    /// For Fragmentation Needed: the next-hop MTU
    pub fn next_hop_mtu(&self) -> u16 {
        u16::from_be_bytes([self.buffer[6], self.buffer[7]])
    }

    /// For Redirect: the gateway address
    pub fn gateway(&self) -> Ipv4Addr {
        Ipv4Addr::new(
            self.buffer[4],
            self.buffer[5],
            self.buffer[6],
            self.buffer[7],
        )
    }

    /// Get the typed ICMP message type
    pub fn message_type(&self) -> Option<IcmpType> {
        IcmpType::from_u8(self.icmp_type())
    }

    /// Validate the ICMP checksum
    pub fn validate_checksum(&self) -> bool {
        icmp_checksum(self.buffer) == 0
    }

    /// The original IP header + 8 bytes carried by an error message
    pub fn original_datagram(&self) -> &[u8] {
        &self.buffer[ICMP_HEADER_SIZE..]
    }
}

/// Calculate ICMP checksum
pub fn icmp_checksum(data: &[u8]) -> u16 {
    let mut sum: u32 = 0;

    for i in (0..data.len()).step_by(2) {
        let word = if i + 1 < data.len() {
            u16::from_be_bytes([data[i], data[i + 1]])
        } else {
            u16::from_be_bytes([data[i], 0])
        };
        sum = sum.wrapping_add(word as u32);
    }

    // Fold 32-bit sum to 16 bits
    while sum >> 16 != 0 {
        sum = (sum & 0xFFFF) + (sum >> 16);
    }

    !(sum as u16)
}

/// Lay out an error message: type, code, four bytes of rest-of-header,
/// the original header and the first 8 bytes of its payload.
fn build_error(
    icmp_type: IcmpType,
    code: u8,
    rest: [u8; 4],
    original_header: &[u8],
    original_payload: &[u8],
) -> Vec<u8> {
    let payload_len = original_payload.len().min(QUOTE_PAYLOAD_LEN);
    let total_len = ICMP_HEADER_SIZE + original_header.len() + payload_len;
    let mut packet = vec![0u8; total_len];

    packet[0] = icmp_type as u8;
    packet[1] = code;
    packet[4..8].copy_from_slice(&rest);
    packet[8..8 + original_header.len()].copy_from_slice(original_header);
    packet[8 + original_header.len()..].copy_from_slice(&original_payload[..payload_len]);

    let checksum = icmp_checksum(&packet);
    packet[2..4].copy_from_slice(&checksum.to_be_bytes());

    packet
}

/// Build a Destination Unreachable message
///
/// # Arguments
/// * `code` - The unreachable code (see `dest_unreachable` module)
/// * `original_header` - The original IP header that caused the error
/// * `original_payload` - The first 8 bytes of the original datagram payload
/// * `mtu` - For FRAGMENTATION_NEEDED (code 4), the next-hop MTU; otherwise 0
pub fn build_destination_unreachable(
    code: u8,
    original_header: &[u8],
    original_payload: &[u8],
    mtu: u16,
) -> Vec<u8> {
    let mut rest = [0u8; 4];
    // For FRAGMENTATION_NEEDED, bytes 6-7 contain the next-hop MTU (RFC 1191)
    if code == dest_unreachable::FRAGMENTATION_NEEDED {
        rest[2..4].copy_from_slice(&mtu.to_be_bytes());
    }
    build_error(
        IcmpType::DestinationUnreachable,
        code,
        rest,
        original_header,
        original_payload,
    )
}

/// Build a Time Exceeded message
pub fn build_time_exceeded(code: u8, original_header: &[u8], original_payload: &[u8]) -> Vec<u8> {
    build_error(
        IcmpType::TimeExceeded,
        code,
        [0u8; 4],
        original_header,
        original_payload,
    )
}

/// Build a Redirect message pointing the sender at `gateway`
pub fn build_redirect(
    code: u8,
    gateway: Ipv4Addr,
    original_header: &[u8],
    original_payload: &[u8],
) -> Vec<u8> {
    build_error(
        IcmpType::Redirect,
        code,
        gateway.octets(),
        original_header,
        original_payload,
    )
}
