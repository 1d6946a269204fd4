//! Datagram codec: nonce construction, seal, and open.
//!
//! # Wire Format
//!
//! Each UDP payload is:
//!
//! ```text
//! noncePrefix(8) || ciphertext(|plaintext|) || tag(16)
//! ```
//!
//! where the encrypted plaintext is `BE16(timestamp) || BE16(timestampReply)
//! || payload`. The full 12-byte nonce is `0x00 × 4 || BE64(dirBit<<63 | seq
//! & 0x7FFFFFFFFFFFFFFF)`; only the last 8 bytes travel on the wire, the
//! caller-known direction supplies the high bit back on open.

use crate::ocb3::Ocb3;

/// Minimum valid datagram length: 8-byte nonce prefix + 16-byte tag, zero
/// ciphertext bytes.
pub const MIN_DATAGRAM_LEN: usize = 24;

/// Direction a datagram travels, which is folded into the nonce's top bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Client to server.
    ToServer,
    /// Server to client.
    ToClient,
}

impl Direction {
    fn bit(self) -> u64 {
        match self {
            Direction::ToServer => 0,
            Direction::ToClient => 1,
        }
    }

    fn from_bit(bit: u64) -> Self {
        if bit == 0 {
            Direction::ToServer
        } else {
            Direction::ToClient
        }
    }
}

/// A decoded (or to-be-encoded) Mosh packet: the unit SSP sends and
/// receives over the authenticated channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoshPacket {
    /// Sequence number, unique per direction for this session's lifetime.
    pub sequence_number: u64,
    /// Direction this packet travels.
    pub direction: Direction,
    /// Sender's local timestamp, `ms_since_epoch mod 65536`.
    pub timestamp: u16,
    /// Echo of the peer's timestamp, adjusted for processing delay.
    pub timestamp_reply: u16,
    /// Opaque payload (a fragment-framed, zlib-compressed instruction).
    pub payload: Vec<u8>,
}

/// Build the 12-byte OCB3 nonce for `(direction, seq)`.
///
/// The direction bit lives explicitly in the MSB of the high byte of the
/// big-endian `u64` at nonce offset 4 — it is placed there directly rather
/// than derived arithmetically, since that placement is load-bearing wire
/// format, not an implementation detail.
#[must_use]
pub fn build_nonce(direction: Direction, seq: u64) -> [u8; 12] {
    let mut nonce = [0u8; 12];
    let value = (direction.bit() << 63) | (seq & 0x7FFF_FFFF_FFFF_FFFF);
    nonce[4..12].copy_from_slice(&value.to_be_bytes());
    nonce
}

fn decode_nonce_prefix(prefix: &[u8; 8]) -> (Direction, u64) {
    let value = u64::from_be_bytes(*prefix);
    let dir_bit = value >> 63;
    let seq = value & 0x7FFF_FFFF_FFFF_FFFF;
    (Direction::from_bit(dir_bit), seq)
}

/// Seal `packet` into a wire datagram using `cipher`.
#[must_use]
pub fn seal(cipher: &Ocb3, packet: &MoshPacket) -> Vec<u8> {
    let nonce = build_nonce(packet.direction, packet.sequence_number);

    let mut plaintext = Vec::with_capacity(4 + packet.payload.len());
    plaintext.extend_from_slice(&packet.timestamp.to_be_bytes());
    plaintext.extend_from_slice(&packet.timestamp_reply.to_be_bytes());
    plaintext.extend_from_slice(&packet.payload);

    let (ciphertext, tag) = cipher.encrypt(&nonce, &plaintext);

    let mut datagram = Vec::with_capacity(8 + ciphertext.len() + 16);
    datagram.extend_from_slice(&nonce[4..12]);
    datagram.extend_from_slice(&ciphertext);
    datagram.extend_from_slice(&tag);
    datagram
}

/// Attempt to open `datagram` as a packet travelling in `expected_direction`.
///
/// Returns `None` on any length violation or decrypt/tag failure — the
/// caller (the SSP receive path) treats this exactly like "no packet
/// arrived"; there is no partial-trust fallback.
#[must_use]
pub fn open(cipher: &Ocb3, datagram: &[u8], expected_direction: Direction) -> Option<MoshPacket> {
    if datagram.len() < MIN_DATAGRAM_LEN {
        log::debug!(
            "dropping datagram shorter than minimum ({} < {MIN_DATAGRAM_LEN})",
            datagram.len()
        );
        return None;
    }

    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&datagram[0..8]);
    let mut full_nonce = [0u8; 12];
    full_nonce[4..12].copy_from_slice(&prefix);
    let (direction, sequence_number) = decode_nonce_prefix(&prefix);

    if direction != expected_direction {
        // The nonce decoded to a direction bit the caller didn't expect; the
        // datagram was never ours to process regardless of whether it
        // happens to authenticate.
        log::debug!("dropping datagram with unexpected direction bit");
        return None;
    }

    let tag_start = datagram.len() - 16;
    let ciphertext = &datagram[8..tag_start];
    let tag = &datagram[tag_start..];

    let plaintext = cipher.decrypt(&full_nonce, ciphertext, tag)?;
    if plaintext.len() < 4 {
        log::debug!("dropping datagram whose plaintext is too short to hold the header");
        return None;
    }

    let timestamp = u16::from_be_bytes([plaintext[0], plaintext[1]]);
    let timestamp_reply = u16::from_be_bytes([plaintext[2], plaintext[3]]);
    let payload = plaintext[4..].to_vec();

    Some(MoshPacket {
        sequence_number,
        direction,
        timestamp,
        timestamp_reply,
        payload,
    })
}
