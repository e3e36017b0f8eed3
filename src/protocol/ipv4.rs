//! IPv4 protocol - RFC 791

use crate::{Error, Result};
use std::fmt;
use std::net::Ipv4Addr;

/// Minimum IPv4 header size (without options)
pub const MIN_HEADER_SIZE: usize = 20;

/// Minimum MTU every IPv4 link must support (RFC 791)
pub const MIN_MTU: u16 = 68;

/// Byte offset of the TTL field
const TTL_OFFSET: usize = 8;

/// Byte offset of the header checksum
const CHECKSUM_OFFSET: usize = 10;

/// Byte offsets of the source and destination addresses
const SRC_OFFSET: usize = 12;
const DST_OFFSET: usize = 16;

/// Fragment flags
pub mod flags {
    /// Don't Fragment
    pub const DF: u8 = 0b010;
    /// More Fragments
    pub const MF: u8 = 0b001;
}

/// Parsed IPv4 header (zero-copy reference)
#[derive(Debug)]
pub struct Ipv4Header<'a> {
    buffer: &'a [u8],
    header_len: usize,
}

impl<'a> Ipv4Header<'a> {
    pub fn parse(buffer: &'a [u8]) -> Result<Self> {
        let header_len = parse_header_len(buffer)?;
        Ok(Self { buffer, header_len })
    }

    pub fn version(&self) -> u8 {
        self.buffer[0] >> 4
    }

    pub fn ihl(&self) -> u8 {
        self.buffer[0] & 0x0F
    }

    pub fn total_length(&self) -> u16 {
        u16::from_be_bytes([self.buffer[2], self.buffer[3]])
    }

    pub fn identification(&self) -> u16 {
        u16::from_be_bytes([self.buffer[4], self.buffer[5]])
    }

    pub fn flags(&self) -> u8 {
        self.buffer[6] >> 5
    }

    pub fn fragment_offset(&self) -> u16 {
        u16::from_be_bytes([self.buffer[6] & 0x1F, self.buffer[7]])
    }

    pub fn ttl(&self) -> u8 {
        self.buffer[TTL_OFFSET]
    }

    pub fn protocol(&self) -> u8 {
        self.buffer[9]
    }

    pub fn checksum(&self) -> u16 {
        u16::from_be_bytes([self.buffer[10], self.buffer[11]])
    }

    pub fn src_addr(&self) -> Ipv4Addr {
        Ipv4Addr::new(
            self.buffer[12],
            self.buffer[13],
            self.buffer[14],
            self.buffer[15],
        )
    }

    pub fn dst_addr(&self) -> Ipv4Addr {
        Ipv4Addr::new(
            self.buffer[16],
            self.buffer[17],
            self.buffer[18],
            self.buffer[19],
        )
    }

    pub fn header_len(&self) -> usize {
        self.header_len
    }

    pub fn payload(&self) -> &[u8] {
        &self.buffer[self.header_len..]
    }

    /// Check if Don't Fragment flag is set
    pub fn dont_fragment(&self) -> bool {
        (self.flags() & flags::DF) != 0
    }

    /// Check if More Fragments flag is set
    pub fn more_fragments(&self) -> bool {
        (self.flags() & flags::MF) != 0
    }

    /// Check if this is a fragment (MF set or offset > 0)
    pub fn is_fragment(&self) -> bool {
        self.more_fragments() || self.fragment_offset() > 0
    }

    /// Validate header checksum
    pub fn validate_checksum(&self) -> bool {
        checksum(&self.buffer[..self.header_len]) == 0
    }

    /// Get raw header bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer[..self.header_len]
    }
}

fn parse_header_len(buffer: &[u8]) -> Result<usize> {
    if buffer.len() < MIN_HEADER_SIZE {
        return Err(Error::Parse("IPv4 header too short".into()));
    }

    let version = buffer[0] >> 4;
    if version != 4 {
        return Err(Error::Parse("not an IPv4 packet".into()));
    }

    let header_len = (buffer[0] & 0x0F) as usize * 4;
    if header_len < MIN_HEADER_SIZE {
        return Err(Error::Parse("IPv4 IHL below minimum".into()));
    }

    if buffer.len() < header_len {
        return Err(Error::Parse("IPv4 header truncated".into()));
    }

    Ok(header_len)
}

/// Calculate IPv4 header checksum
pub fn checksum(header: &[u8]) -> u16 {
    let mut sum: u32 = 0;

    for i in (0..header.len()).step_by(2) {
        let word = if i + 1 < header.len() {
            u16::from_be_bytes([header[i], header[i + 1]])
        } else {
            u16::from_be_bytes([header[i], 0])
        };
        sum = sum.wrapping_add(word as u32);
    }

    // Fold 32-bit sum to 16 bits
    while sum >> 16 != 0 {
        sum = (sum & 0xFFFF) + (sum >> 16);
    }

    !(sum as u16)
}

/// Incrementally update a one's complement checksum after a 16-bit word
/// changed from `old_field` to `new_field`.
///
/// Uses RFC 1624 Eqn. 3, `HC' = ~(~HC + ~m + m')`. For a header whose
/// checksum was correct before the change, the result is identical to
/// recomputing the checksum over the whole modified header.
pub fn adjust_checksum(old_checksum: u16, old_field: u16, new_field: u16) -> u16 {
    let mut sum = (!old_checksum) as u32 + (!old_field) as u32 + new_field as u32;
    // Three 16-bit terms carry at most twice
    sum = (sum & 0xFFFF) + (sum >> 16);
    sum = (sum & 0xFFFF) + (sum >> 16);
    !(sum as u16)
}

/// Owned, mutable IPv4 packet.
///
/// The buffer may carry trailing link-layer padding past the total length;
/// it is kept so an untouched packet can be handed back bit-identical.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ipv4Packet {
    buffer: Vec<u8>,
    header_len: usize,
}

impl Ipv4Packet {
    /// Take ownership of a received buffer after validating its header
    pub fn new(buffer: Vec<u8>) -> Result<Self> {
        let header_len = parse_header_len(&buffer)?;

        let total_length = u16::from_be_bytes([buffer[2], buffer[3]]) as usize;
        if total_length < header_len {
            return Err(Error::InvalidPacket(format!(
                "total length {} shorter than header length {}",
                total_length, header_len
            )));
        }
        if total_length > buffer.len() {
            return Err(Error::InvalidPacket(format!(
                "total length {} exceeds buffer of {} bytes",
                total_length,
                buffer.len()
            )));
        }

        Ok(Self { buffer, header_len })
    }

    pub fn header(&self) -> Ipv4Header<'_> {
        Ipv4Header {
            buffer: &self.buffer,
            header_len: self.header_len,
        }
    }

    pub fn ttl(&self) -> u8 {
        self.buffer[TTL_OFFSET]
    }

    pub fn protocol(&self) -> u8 {
        self.buffer[9]
    }

    pub fn checksum(&self) -> u16 {
        u16::from_be_bytes([self.buffer[CHECKSUM_OFFSET], self.buffer[CHECKSUM_OFFSET + 1]])
    }

    pub fn src_addr(&self) -> Ipv4Addr {
        self.header().src_addr()
    }

    pub fn dst_addr(&self) -> Ipv4Addr {
        self.header().dst_addr()
    }

    pub fn total_length(&self) -> u16 {
        u16::from_be_bytes([self.buffer[2], self.buffer[3]])
    }

    pub fn header_len(&self) -> usize {
        self.header_len
    }

    /// Whether the header carries IP options
    pub fn has_options(&self) -> bool {
        self.header_len > MIN_HEADER_SIZE
    }

    pub fn dont_fragment(&self) -> bool {
        self.header().dont_fragment()
    }

    /// Payload up to the total length (padding excluded)
    pub fn payload(&self) -> &[u8] {
        &self.buffer[self.header_len..self.total_length() as usize]
    }

    /// Header and payload, padding excluded
    pub fn datagram(&self) -> &[u8] {
        &self.buffer[..self.total_length() as usize]
    }

    /// Header plus at most `payload_len` payload bytes
    pub fn leading_bytes(&self, payload_len: usize) -> &[u8] {
        let end = (self.header_len + payload_len).min(self.total_length() as usize);
        &self.buffer[..end]
    }

    /// Set TTL, updating the checksum incrementally
    pub fn set_ttl(&mut self, ttl: u8) {
        let old_word = self.word(TTL_OFFSET);
        self.buffer[TTL_OFFSET] = ttl;
        let new_word = self.word(TTL_OFFSET);
        self.adjust(old_word, new_word);
    }

    /// Rewrite the destination address, updating the checksum incrementally
    pub fn set_dst_addr(&mut self, addr: Ipv4Addr) {
        self.set_addr(DST_OFFSET, addr);
    }

    /// Rewrite the source address, updating the checksum incrementally
    pub fn set_src_addr(&mut self, addr: Ipv4Addr) {
        self.set_addr(SRC_OFFSET, addr);
    }

    fn set_addr(&mut self, base: usize, addr: Ipv4Addr) {
        let octets = addr.octets();
        for (i, pair) in octets.chunks_exact(2).enumerate() {
            let offset = base + i * 2;
            let old_word = self.word(offset);
            self.buffer[offset..offset + 2].copy_from_slice(pair);
            self.adjust(old_word, self.word(offset));
        }
    }

    fn word(&self, offset: usize) -> u16 {
        u16::from_be_bytes([self.buffer[offset], self.buffer[offset + 1]])
    }

    fn adjust(&mut self, old_word: u16, new_word: u16) {
        let sum = adjust_checksum(self.checksum(), old_word, new_word);
        self.buffer[CHECKSUM_OFFSET..CHECKSUM_OFFSET + 2].copy_from_slice(&sum.to_be_bytes());
    }

    /// Get a reference to the whole buffer, padding included
    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }

    /// Consume and return the buffer unchanged
    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }

    /// Consume and return the buffer cut to the total length
    pub fn into_wire(mut self) -> Vec<u8> {
        let len = self.total_length() as usize;
        self.buffer.truncate(len);
        self.buffer
    }
}

/// IPv4 address with prefix length, e.g. an interface address "192.168.1.1/24"
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ipv4Cidr {
    addr: Ipv4Addr,
    prefix_len: u8,
}

impl Ipv4Cidr {
    /// Create a new IPv4 CIDR (prefix lengths above 32 are clamped)
    pub fn new(addr: Ipv4Addr, prefix_len: u8) -> Self {
        Self {
            addr,
            prefix_len: prefix_len.min(32),
        }
    }

    /// Parse from string like "192.168.1.0/24"
    pub fn parse(s: &str) -> Option<Self> {
        let (addr, prefix_len) = s.split_once('/')?;
        let addr: Ipv4Addr = addr.trim().parse().ok()?;
        let prefix_len: u8 = prefix_len.trim().parse().ok()?;
        if prefix_len > 32 {
            return None;
        }
        Some(Self::new(addr, prefix_len))
    }

    pub fn addr(&self) -> Ipv4Addr {
        self.addr
    }

    pub fn prefix_len(&self) -> u8 {
        self.prefix_len
    }

    pub fn mask(&self) -> u32 {
        prefix_to_mask(self.prefix_len)
    }

    pub fn network(&self) -> Ipv4Addr {
        Ipv4Addr::from(u32::from(self.addr) & self.mask())
    }

    /// Subnet-directed broadcast address
    pub fn broadcast(&self) -> Ipv4Addr {
        Ipv4Addr::from(u32::from(self.addr) | !self.mask())
    }

    /// Check if an address is within this CIDR range
    pub fn contains(&self, addr: Ipv4Addr) -> bool {
        let mask = self.mask();
        (u32::from(self.addr) & mask) == (u32::from(addr) & mask)
    }
}

impl fmt::Display for Ipv4Cidr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.addr, self.prefix_len)
    }
}

fn prefix_to_mask(prefix_len: u8) -> u32 {
    if prefix_len == 0 {
        0
    } else {
        !0u32 << (32 - prefix_len)
    }
}

/// Builder for constructing IPv4 packets
#[derive(Debug, Clone)]
pub struct Ipv4Builder {
    identification: u16,
    dont_fragment: bool,
    more_fragments: bool,
    fragment_offset: u16,
    ttl: u8,
    protocol: u8,
    src_addr: Ipv4Addr,
    dst_addr: Ipv4Addr,
    options: Vec<u8>,
    payload: Vec<u8>,
}

impl Ipv4Builder {
    pub fn new() -> Self {
        Self {
            identification: 0,
            dont_fragment: true,
            more_fragments: false,
            fragment_offset: 0,
            ttl: 64,
            protocol: 0,
            src_addr: Ipv4Addr::UNSPECIFIED,
            dst_addr: Ipv4Addr::UNSPECIFIED,
            options: Vec::new(),
            payload: Vec::new(),
        }
    }

    pub fn identification(mut self, id: u16) -> Self {
        self.identification = id;
        self
    }

    pub fn dont_fragment(mut self, df: bool) -> Self {
        self.dont_fragment = df;
        self
    }

    pub fn more_fragments(mut self, mf: bool) -> Self {
        self.more_fragments = mf;
        self
    }

    pub fn fragment_offset(mut self, offset: u16) -> Self {
        self.fragment_offset = offset & 0x1FFF;
        self
    }

    pub fn ttl(mut self, ttl: u8) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn protocol(mut self, protocol: u8) -> Self {
        self.protocol = protocol;
        self
    }

    pub fn src_addr(mut self, addr: Ipv4Addr) -> Self {
        self.src_addr = addr;
        self
    }

    pub fn dst_addr(mut self, addr: Ipv4Addr) -> Self {
        self.dst_addr = addr;
        self
    }

    /// Raw option bytes, zero-padded to a 4-byte boundary
    pub fn options(mut self, options: &[u8]) -> Self {
        self.options = options.to_vec();
        let padded = self.options.len().div_ceil(4) * 4;
        self.options.resize(padded.min(40), 0);
        self
    }

    pub fn payload(mut self, payload: &[u8]) -> Self {
        self.payload = payload.to_vec();
        self
    }

    pub fn build(self) -> Vec<u8> {
        let header_len = MIN_HEADER_SIZE + self.options.len();
        let total_length = (header_len + self.payload.len()) as u16;
        let mut buffer = vec![0u8; header_len + self.payload.len()];

        // Version (4) + IHL
        buffer[0] = 0x40 | (header_len / 4) as u8;
        buffer[2..4].copy_from_slice(&total_length.to_be_bytes());
        buffer[4..6].copy_from_slice(&self.identification.to_be_bytes());

        let mut flags_frag = self.fragment_offset;
        if self.dont_fragment {
            flags_frag |= 0x4000;
        }
        if self.more_fragments {
            flags_frag |= 0x2000;
        }
        buffer[6..8].copy_from_slice(&flags_frag.to_be_bytes());

        buffer[TTL_OFFSET] = self.ttl;
        buffer[9] = self.protocol;
        buffer[12..16].copy_from_slice(&self.src_addr.octets());
        buffer[16..20].copy_from_slice(&self.dst_addr.octets());
        buffer[MIN_HEADER_SIZE..header_len].copy_from_slice(&self.options);
        buffer[header_len..].copy_from_slice(&self.payload);

        let sum = checksum(&buffer[..header_len]);
        buffer[CHECKSUM_OFFSET..CHECKSUM_OFFSET + 2].copy_from_slice(&sum.to_be_bytes());

        buffer
    }
}

impl Default for Ipv4Builder {
    fn default() -> Self {
        Self::new()
    }
}
