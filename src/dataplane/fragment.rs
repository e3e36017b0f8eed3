//! IPv4 fragmentation (RFC 791 section 3.2)

use crate::dataplane::transmit::{Fragmenter, Frame};
use crate::dataplane::ChecksumOffload;
use crate::protocol::ipv4::{checksum, Ipv4Packet};
use crate::{Error, Result};

const FRAGMENT_UNIT: usize = 8;
const MAX_FRAGMENT_OFFSET: usize = 0x1FFF;

// Bits of the flags/offset word
const RESERVED_DF_MASK: u16 = 0xC000;
const MF_BIT: u16 = 0x2000;

const OPT_EOL: u8 = 0;
const OPT_NOP: u8 = 1;
const OPT_COPIED: u8 = 0x80;

/// Splits a datagram into fragments that fit an MTU
///
/// The first fragment carries the full header. Later fragments carry only
/// the options marked "copied". Fragments of an already fragmented datagram
/// keep their place in the original: offsets are relative to the original
/// offset, and the final piece keeps the original MF bit.
#[derive(Debug, Clone, Copy, Default)]
pub struct Ipv4Fragmenter;

impl Ipv4Fragmenter {
    pub fn new() -> Self {
        Self
    }
}

impl Fragmenter for Ipv4Fragmenter {
    fn fragment(&self, packet: Ipv4Packet, mtu: u16, caps: ChecksumOffload) -> Result<Vec<Frame>> {
        let header_len = packet.header_len();
        let first_header = &packet.as_bytes()[..header_len];
        let later_header = copied_header(first_header);
        let payload = packet.payload();

        let ip = packet.header();
        let base_offset = ip.fragment_offset() as usize;
        let more_after = ip.more_fragments();

        // Fail before producing anything if the MTU is unusable
        chunk_size(mtu, first_header.len())?;

        let mut frames = Vec::new();
        let mut pos = 0;
        while pos < payload.len() {
            let header = if pos == 0 { first_header } else { &later_header[..] };
            let end = (pos + chunk_size(mtu, header.len())?).min(payload.len());

            let offset = base_offset + pos / FRAGMENT_UNIT;
            if offset > MAX_FRAGMENT_OFFSET {
                return Err(Error::Fragment(format!(
                    "fragment offset {} out of range",
                    offset
                )));
            }

            let more = end < payload.len() || more_after;
            frames.push(build_fragment(header, &payload[pos..end], offset as u16, more, caps));
            pos = end;
        }

        Ok(frames)
    }
}

/// Payload bytes that fit after a header of `header_len`, rounded down to the fragment unit
fn chunk_size(mtu: u16, header_len: usize) -> Result<usize> {
    let room = (mtu as usize).saturating_sub(header_len) & !(FRAGMENT_UNIT - 1);
    if room < FRAGMENT_UNIT {
        return Err(Error::Fragment(format!(
            "MTU {} cannot carry a fragment after a {} byte header",
            mtu, header_len
        )));
    }
    Ok(room)
}

/// Header for non-initial fragments: fixed part plus copied options, padded
fn copied_header(header: &[u8]) -> Vec<u8> {
    let mut out = header[..20].to_vec();
    let options = &header[20..];

    let mut i = 0;
    while i < options.len() {
        let kind = options[i];
        if kind == OPT_EOL {
            break;
        }
        if kind == OPT_NOP {
            i += 1;
            continue;
        }
        let len = match options.get(i + 1) {
            Some(&len) if len >= 2 && i + len as usize <= options.len() => len as usize,
            // Malformed option list; copy nothing further
            _ => break,
        };
        if kind & OPT_COPIED != 0 {
            out.extend_from_slice(&options[i..i + len]);
        }
        i += len;
    }

    while out.len() % 4 != 0 {
        out.push(OPT_EOL);
    }
    out
}

fn build_fragment(header: &[u8], chunk: &[u8], offset: u16, more: bool, caps: ChecksumOffload) -> Frame {
    let header_len = header.len();
    let mut frame = Vec::with_capacity(header_len + chunk.len());
    frame.extend_from_slice(header);
    frame.extend_from_slice(chunk);

    frame[0] = 0x40 | (header_len / 4) as u8;
    let total_len = frame.len() as u16;
    frame[2..4].copy_from_slice(&total_len.to_be_bytes());

    let orig = u16::from_be_bytes([frame[6], frame[7]]);
    let mut word = (orig & RESERVED_DF_MASK) | offset;
    if more {
        word |= MF_BIT;
    }
    frame[6..8].copy_from_slice(&word.to_be_bytes());

    frame[10] = 0;
    frame[11] = 0;
    if !caps.contains(ChecksumOffload::IPV4) {
        let sum = checksum(&frame[..header_len]);
        frame[10..12].copy_from_slice(&sum.to_be_bytes());
    }

    frame
}
