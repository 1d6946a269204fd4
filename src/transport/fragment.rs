//! Fragment codec and reassembly.
//!
//! Wire header (10 bytes, matching the length-prefixed framing idiom used
//! elsewhere in this codebase): `BE64(instruction_id) || BE16(final_bit <<
//! 15 | fragment_num)`. Large instructions are zlib-compressed then split
//! into chunks of at most `mtu - 10` bytes before sealing; [`Assembler`]
//! reassembles them on the receive side, keyed by `instruction_id`.

use std::collections::BTreeMap;
use std::io::{Read, Write};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;

/// Header size in bytes.
pub const HEADER_LEN: usize = 10;

/// Default MTU; fragments are sized to fit `mtu - HEADER_LEN` bytes.
pub const DEFAULT_MTU: usize = 1280;

/// Bound on how many fragments a single instruction may be split into.
///
/// The assembler is a short-lived per-instruction arena, not an unbounded
/// map — a buggy or adversarial peer claiming a fragment number beyond this
/// bound is simply ignored rather than growing the map without limit.
pub const MAX_FRAGMENTS: usize = 4096;

/// A single wire fragment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    /// Monotonically increasing per outbound instruction.
    pub instruction_id: u64,
    /// 0-based index of this fragment within its instruction.
    pub fragment_num: u16,
    /// Whether this is the last fragment of its instruction.
    pub is_final: bool,
    /// Fragment payload bytes (a slice of the compressed instruction).
    pub contents: Vec<u8>,
}

impl Fragment {
    /// Serialize the 10-byte header followed by `contents`.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(HEADER_LEN + self.contents.len());
        buf.extend_from_slice(&self.instruction_id.to_be_bytes());
        let final_bit = u16::from(self.is_final) << 15;
        buf.extend_from_slice(&(final_bit | self.fragment_num).to_be_bytes());
        buf.extend_from_slice(&self.contents);
        buf
    }

    /// Parse a fragment from wire bytes.
    ///
    /// Returns `None` if shorter than [`HEADER_LEN`].
    #[must_use]
    pub fn parse(bytes: &[u8]) -> Option<Fragment> {
        if bytes.len() < HEADER_LEN {
            return None;
        }
        let mut id_bytes = [0u8; 8];
        id_bytes.copy_from_slice(&bytes[0..8]);
        let instruction_id = u64::from_be_bytes(id_bytes);

        let field = u16::from_be_bytes([bytes[8], bytes[9]]);
        let is_final = field & 0x8000 != 0;
        let fragment_num = field & 0x7fff;

        Some(Fragment {
            instruction_id,
            fragment_num,
            is_final,
            contents: bytes[HEADER_LEN..].to_vec(),
        })
    }
}

/// zlib-compress `data` (RFC 1950).
#[must_use]
pub fn deflate(data: &[u8]) -> Vec<u8> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    // Writing to a `Vec<u8>` target cannot fail.
    encoder.write_all(data).expect("in-memory zlib write cannot fail");
    encoder.finish().expect("in-memory zlib finish cannot fail")
}

/// zlib-decompress `data`, doubling the output buffer and retrying once on
/// an undersized allocation before giving up.
///
/// Returns `None` on malformed zlib input or if the data still doesn't fit
/// after the single retry — per spec, larger runs fail rather than loop.
#[must_use]
pub fn inflate(data: &[u8]) -> Option<Vec<u8>> {
    let mut capacity = data.len().max(256) * 4;
    for _ in 0..2 {
        let mut decoder = ZlibDecoder::new(data);
        let mut out = Vec::with_capacity(capacity);
        match decoder.read_to_end(&mut out) {
            Ok(_) => return Some(out),
            Err(_) => capacity *= 2,
        }
    }
    None
}

/// Split a zlib-compressed instruction into fragments of at most `mtu -
/// HEADER_LEN` bytes each.
#[must_use]
pub fn fragment_compressed(instruction_id: u64, compressed: &[u8], mtu: usize) -> Vec<Fragment> {
    let chunk_size = mtu.saturating_sub(HEADER_LEN).max(1);
    if compressed.is_empty() {
        return vec![Fragment {
            instruction_id,
            fragment_num: 0,
            is_final: true,
            contents: Vec::new(),
        }];
    }

    let chunks: Vec<&[u8]> = compressed.chunks(chunk_size).collect();
    let last = chunks.len() - 1;
    chunks
        .into_iter()
        .enumerate()
        .map(|(i, chunk)| Fragment {
            instruction_id,
            fragment_num: i as u16,
            is_final: i == last,
            contents: chunk.to_vec(),
        })
        .collect()
}

/// Reassembles fragments for a single session.
///
/// Not shareable across sessions: holds mutable per-instruction state that a
/// concurrent session would corrupt.
#[derive(Debug, Default)]
pub struct Assembler {
    current_instruction_id: Option<u64>,
    fragments: BTreeMap<u16, Vec<u8>>,
    fragments_total: Option<u16>,
}

impl Assembler {
    /// Create an empty assembler.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one fragment. Returns the reassembled, decompressed instruction
    /// bytes once every fragment of the current instruction has arrived.
    ///
    /// A change in observed `instruction_id` resets all accumulated state —
    /// fragments of a stale instruction are discarded, not merged.
    pub fn feed(&mut self, fragment: Fragment) -> Option<Vec<u8>> {
        if fragment.fragment_num as usize >= MAX_FRAGMENTS {
            log::debug!(
                "dropping fragment {} beyond MAX_FRAGMENTS",
                fragment.fragment_num
            );
            return None;
        }

        if self.current_instruction_id != Some(fragment.instruction_id) {
            self.current_instruction_id = Some(fragment.instruction_id);
            self.fragments.clear();
            self.fragments_total = None;
        }

        if fragment.is_final {
            self.fragments_total = Some(fragment.fragment_num + 1);
        }
        self.fragments.insert(fragment.fragment_num, fragment.contents);

        let total = self.fragments_total?;
        if self.fragments.len() != total as usize {
            return None;
        }

        let mut compressed = Vec::new();
        for i in 0..total {
            compressed.extend_from_slice(self.fragments.get(&i)?);
        }

        // Whatever the outcome, this instruction is done with; reset so a
        // decode failure doesn't wedge the assembler on a poisoned id.
        self.current_instruction_id = None;
        self.fragments.clear();
        self.fragments_total = None;

        match inflate(&compressed) {
            Some(decompressed) => Some(decompressed),
            None => {
                log::debug!("dropping instruction: zlib inflate failed");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_roundtrip() {
        let f = Fragment {
            instruction_id: 0x0102030405060708,
            fragment_num: 7,
            is_final: true,
            contents: vec![1, 2, 3],
        };
        let encoded = f.encode();
        assert_eq!(encoded.len(), HEADER_LEN + 3);
        let decoded = Fragment::parse(&encoded).expect("parses");
        assert_eq!(decoded, f);
    }

    #[test]
    fn parse_rejects_short_input() {
        assert!(Fragment::parse(&[0u8; 9]).is_none());
    }

    #[test]
    fn deflate_inflate_roundtrip() {
        let data = b"the quick brown fox jumps over the lazy dog".repeat(20);
        let compressed = deflate(&data);
        assert!(compressed.len() < data.len());
        let decompressed = inflate(&compressed).expect("inflates");
        assert_eq!(decompressed, data);
    }

    #[test]
    fn single_fragment_when_small() {
        let compressed = deflate(b"tiny instruction");
        let fragments = fragment_compressed(1, &compressed, DEFAULT_MTU);
        assert_eq!(fragments.len(), 1);
        assert!(fragments[0].is_final);
        assert_eq!(fragments[0].fragment_num, 0);
    }

    #[test]
    fn multi_fragment_reassembles_out_of_order() {
        let original = b"x".repeat(5000);
        let compressed = deflate(&original);
        let fragments = fragment_compressed(9, &compressed, 256);
        assert!(fragments.len() > 1);

        let mut shuffled = fragments.clone();
        // Reverse order, a concrete "out of order" permutation.
        shuffled.reverse();

        let mut assembler = Assembler::new();
        let mut result = None;
        for f in shuffled {
            result = assembler.feed(f);
        }
        assert_eq!(result.expect("reassembles"), original);
    }

    #[test]
    fn dropping_a_non_final_fragment_never_completes() {
        let original = b"y".repeat(5000);
        let compressed = deflate(&original);
        let fragments = fragment_compressed(3, &compressed, 256);
        assert!(fragments.len() > 2);

        let mut assembler = Assembler::new();
        let mut result = None;
        for (i, f) in fragments.into_iter().enumerate() {
            if i == 1 {
                continue; // drop a middle, non-final fragment
            }
            result = assembler.feed(f);
        }
        assert!(result.is_none());
    }

    #[test]
    fn instruction_id_change_resets_assembler() {
        let mut assembler = Assembler::new();
        assembler.feed(Fragment {
            instruction_id: 1,
            fragment_num: 0,
            is_final: false,
            contents: vec![1],
        });
        // A new instruction id arrives before the first completes.
        let done = assembler.feed(Fragment {
            instruction_id: 2,
            fragment_num: 0,
            is_final: true,
            contents: deflate(b"hello"),
        });
        assert_eq!(done, Some(b"hello".to_vec()));
    }
}
