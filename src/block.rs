//! 128-bit block value and single-block AES-128 primitive.
//!
//! `Block` is the unit OCB3 operates on: a 16-byte value with GF(2¹²⁸)
//! doubling (the RFC 7253 polynomial) and bytewise XOR. `encipher`/`decipher`
//! wrap the `aes` crate's fixed-function block cipher directly — exactly one
//! block in, one block out, no padding, no mode of operation. OCB3 builds its
//! own chaining on top of this primitive.

use aes::cipher::{BlockDecrypt, BlockEncrypt, KeyInit};
use aes::Aes128;
use zeroize::Zeroize;

/// A 128-bit (16-byte) block.
#[derive(Clone, Copy, PartialEq, Eq, Zeroize)]
pub struct Block(pub [u8; 16]);

impl Block {
    /// The all-zero block.
    pub const ZERO: Block = Block([0u8; 16]);

    /// Build a block from a byte slice.
    ///
    /// # Panics
    ///
    /// Panics if `bytes.len() != 16`.
    #[must_use]
    pub fn from_slice(bytes: &[u8]) -> Self {
        let mut buf = [0u8; 16];
        buf.copy_from_slice(bytes);
        Block(buf)
    }

    /// Bytewise XOR of two blocks.
    #[must_use]
    pub fn xor(&self, other: &Block) -> Block {
        let mut out = [0u8; 16];
        for i in 0..16 {
            out[i] = self.0[i] ^ other.0[i];
        }
        Block(out)
    }

    /// Double this block in GF(2¹²⁸) under the RFC 7253 polynomial.
    ///
    /// Shift left by one bit across the whole 16-byte value (MSB of byte i
    /// becomes LSB of byte i-1); if the original top bit was set, XOR the
    /// last byte with `0x87`.
    #[must_use]
    pub fn double(&self) -> Block {
        let carry_in = (self.0[0] & 0x80) != 0;
        let mut out = [0u8; 16];
        for i in 0..16 {
            let shifted = self.0[i] << 1;
            let incoming = if i + 1 < 16 {
                u8::from((self.0[i + 1] & 0x80) != 0)
            } else {
                0
            };
            out[i] = shifted | incoming;
        }
        if carry_in {
            out[15] ^= 0x87;
        }
        Block(out)
    }

    /// Raw bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    /// Truncate to the first `n` bytes (`n <= 16`).
    #[must_use]
    pub fn prefix(&self, n: usize) -> Vec<u8> {
        self.0[..n].to_vec()
    }
}

impl std::fmt::Debug for Block {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Block({})", hex(&self.0))
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Single-block AES-128, fatal on a malformed key.
///
/// Exactly one block in, one block out. No padding is applied; this is ECB
/// of a single block, used only as OCB3's underlying block cipher.
pub struct Aes128Block {
    cipher: Aes128,
}

impl Aes128Block {
    /// Construct from a 16-byte key.
    ///
    /// # Panics
    ///
    /// Panics if `key.len() != 16` — a key-length mismatch here means the
    /// caller already failed to validate the session key and is a
    /// programmer error, not a recoverable runtime condition.
    #[must_use]
    pub fn new(key: &[u8]) -> Self {
        assert_eq!(key.len(), 16, "AES-128 key must be 16 bytes");
        let mut key_bytes = [0u8; 16];
        key_bytes.copy_from_slice(key);
        let cipher = Aes128::new_from_slice(&key_bytes).expect("valid 16-byte key");
        key_bytes.zeroize();
        Self { cipher }
    }

    /// Encipher a single block.
    #[must_use]
    pub fn encipher(&self, block: &Block) -> Block {
        let mut ga = block.0.into();
        self.cipher.encrypt_block(&mut ga);
        Block(ga.into())
    }

    /// Decipher a single block.
    #[must_use]
    pub fn decipher(&self, block: &Block) -> Block {
        let mut ga = block.0.into();
        self.cipher.decrypt_block(&mut ga);
        Block(ga.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn double_zero_is_zero() {
        assert_eq!(Block::ZERO.double(), Block::ZERO);
    }

    #[test]
    fn double_shifts_without_top_bit() {
        let b = Block::from_slice(&[
            0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
            0x00, 0x00,
        ]);
        let doubled = b.double();
        assert_eq!(doubled.0[0], 0x02);
        assert_eq!(doubled.0[15], 0x00);
    }

    #[test]
    fn double_with_top_bit_xors_polynomial() {
        let b = Block::from_slice(&[
            0x80, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
            0x00, 0x00,
        ]);
        let doubled = b.double();
        assert_eq!(doubled.0[0], 0x00);
        assert_eq!(doubled.0[15], 0x87);
    }

    #[test]
    fn xor_is_involution() {
        let a = Block::from_slice(&[1u8; 16]);
        let b = Block::from_slice(&[2u8; 16]);
        assert_eq!(a.xor(&b).xor(&b), a);
    }

    #[test]
    fn encipher_decipher_roundtrip() {
        let key = [0x2bu8; 16];
        let aes = Aes128Block::new(&key);
        let pt = Block::from_slice(&[0x11u8; 16]);
        let ct = aes.encipher(&pt);
        assert_ne!(ct, pt);
        assert_eq!(aes.decipher(&ct), pt);
    }

    #[test]
    fn fips197_vector() {
        // FIPS-197 Appendix B vector.
        let key = hex_decode("000102030405060708090a0b0c0d0e0f");
        let pt = Block::from_slice(&hex_decode("00112233445566778899aabbccddeeff"));
        let expected = hex_decode("69c4e0d86a7b0430d8cdb78070b4c55a");
        let aes = Aes128Block::new(&key);
        let ct = aes.encipher(&pt);
        assert_eq!(ct.as_bytes(), &expected[..]);
    }

    fn hex_decode(s: &str) -> Vec<u8> {
        (0..s.len())
            .step_by(2)
            .map(|i| u8::from_str_radix(&s[i..i + 2], 16).expect("valid hex"))
            .collect()
    }
}
