//! Key material: the caller's 256-bit key and its expanded round keys.

use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::error::{Error, Result};
use crate::{BLOCK_SIZE, Block, EXPANDED_KEY_SIZE, KEY_SIZE, ROUNDS};

/// A 256-bit AES key.
///
/// Always an owned copy: [`Key::from_slice`] copies out of the caller's
/// buffer, so the engine never holds on to memory it does not own.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct Key([u8; KEY_SIZE]);

impl Key {
    pub fn new(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != KEY_SIZE {
            return Err(Error::invalid(format!(
                "key must be {KEY_SIZE} bytes, got {}",
                bytes.len()
            )));
        }
        let mut key = [0u8; KEY_SIZE];
        key.copy_from_slice(bytes);
        Ok(Self(key))
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }
}

impl core::fmt::Debug for Key {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("Key(..)")
    }
}

/// The 15 round keys of the AES-256 schedule (240 bytes).
///
/// A pure function of the key: every backend produces the same bytes, so an
/// expanded key may be cached and shared read-only across threads for as long
/// as the key is unchanged.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct ExpandedKey(pub(crate) [Block; ROUNDS + 1]);

impl ExpandedKey {
    pub(crate) fn zeroed() -> Self {
        Self([[0u8; BLOCK_SIZE]; ROUNDS + 1])
    }

    pub fn round_key(&self, round: usize) -> &Block {
        &self.0[round]
    }

    pub fn round_keys(&self) -> &[Block; ROUNDS + 1] {
        &self.0
    }

    pub fn to_bytes(&self) -> Zeroizing<[u8; EXPANDED_KEY_SIZE]> {
        let mut out = Zeroizing::new([0u8; EXPANDED_KEY_SIZE]);
        for (dst, rk) in out.chunks_exact_mut(BLOCK_SIZE).zip(self.0.iter()) {
            dst.copy_from_slice(rk);
        }
        out
    }

    /// The cipher key, which the AES-256 schedule keeps verbatim as its first
    /// two round keys.
    pub(crate) fn cipher_key(&self) -> Zeroizing<[u8; KEY_SIZE]> {
        let mut key = Zeroizing::new([0u8; KEY_SIZE]);
        key[..BLOCK_SIZE].copy_from_slice(&self.0[0]);
        key[BLOCK_SIZE..].copy_from_slice(&self.0[1]);
        key
    }
}

impl core::fmt::Debug for ExpandedKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("ExpandedKey(..)")
    }
}
