//! Big-endian CTR counter: a fixed nonce prefix followed by the block index.

use crate::error::{Error, Result};
use crate::{BLOCK_SIZE, Block, NONCE_SIZE};

/// Width of the block-index suffix in bytes.
pub const BLOCK_INDEX_SIZE: usize = BLOCK_SIZE - NONCE_SIZE;

const _: () = assert!(BLOCK_INDEX_SIZE >= 8, "block index must leave 8 bytes of counter space");

/// A 16-byte CTR counter.
///
/// Bytes `0..NONCE_SIZE` hold the nonce and never change; the remaining
/// bytes are the big-endian block index. Increments that would carry past
/// the index are rejected with [`Error::Overflow`].
///
/// The counter is caller-owned: the engine advances it in place so a stream
/// can later resume exactly where it stopped. It is not synchronized; two
/// threads must not drive the same counter without their own locking.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Counter([u8; BLOCK_SIZE]);

impl Counter {
    /// Counter positioned at block 0 of the stream identified by `nonce`.
    pub fn new(nonce: [u8; NONCE_SIZE]) -> Self {
        let mut bytes = [0u8; BLOCK_SIZE];
        bytes[..NONCE_SIZE].copy_from_slice(&nonce);
        Self(bytes)
    }

    pub fn from_bytes(bytes: [u8; BLOCK_SIZE]) -> Self {
        Self(bytes)
    }

    /// Counter for the block holding logical byte `position` of the stream.
    pub fn at_position(nonce: [u8; NONCE_SIZE], position: u64) -> Result<Self> {
        let mut counter = Self::new(nonce);
        counter.add(position / BLOCK_SIZE as u64)?;
        Ok(counter)
    }

    pub fn nonce(&self) -> [u8; NONCE_SIZE] {
        let mut nonce = [0u8; NONCE_SIZE];
        nonce.copy_from_slice(&self.0[..NONCE_SIZE]);
        nonce
    }

    /// Low 64 bits of the block index.
    pub fn block_index(&self) -> u64 {
        let mut low = [0u8; 8];
        low.copy_from_slice(&self.0[BLOCK_SIZE - 8..]);
        u64::from_be_bytes(low)
    }

    pub fn as_bytes(&self) -> &Block {
        &self.0
    }

    pub fn to_block(self) -> Block {
        self.0
    }

    /// Adds `n` blocks to the index.
    ///
    /// Negative values are rejected with [`Error::InvalidArgument`]; a carry
    /// into the nonce is [`Error::Overflow`]. On error the counter is left
    /// untouched.
    pub fn increment(&mut self, n: i64) -> Result<()> {
        if n < 0 {
            return Err(Error::invalid(format!(
                "counter increment must be positive, got {n}"
            )));
        }
        self.add(n as u64)
    }

    /// Returns a copy advanced by `n` blocks.
    pub fn offset(&self, n: u64) -> Result<Self> {
        let mut next = *self;
        next.add(n)?;
        Ok(next)
    }

    /// Blocks that can still be encrypted from this position, the current
    /// one included. Saturates at `u64::MAX`.
    pub fn remaining_blocks(&self) -> u64 {
        // Index bytes above the low 64 bits only matter for wider indices.
        let high_saturated = self.0[NONCE_SIZE..BLOCK_SIZE - 8]
            .iter()
            .all(|&b| b == 0xFF);
        if !high_saturated {
            return u64::MAX;
        }
        (u64::MAX - self.block_index()).saturating_add(1)
    }

    fn add(&mut self, mut value: u64) -> Result<()> {
        let mut next = self.0;
        let mut carry = 0u16;
        let mut index = BLOCK_SIZE;
        while value > 0 || carry > 0 {
            if index == NONCE_SIZE {
                return Err(Error::Overflow);
            }
            index -= 1;
            let sum = next[index] as u16 + (value & 0xFF) as u16 + carry;
            next[index] = sum as u8;
            carry = sum >> 8;
            value >>= 8;
        }
        self.0 = next;
        Ok(())
    }
}

impl From<[u8; BLOCK_SIZE]> for Counter {
    fn from(bytes: [u8; BLOCK_SIZE]) -> Self {
        Self(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NONCE: [u8; NONCE_SIZE] = [0xA1, 0xB2, 0xC3, 0xD4, 0xE5, 0xF6, 0x07, 0x18];

    #[test]
    fn increment_carries_big_endian() {
        let mut bytes = [0u8; BLOCK_SIZE];
        bytes[..NONCE_SIZE].copy_from_slice(&NONCE);
        bytes[15] = 0xFF;
        bytes[14] = 0xFF;
        let mut ctr = Counter::from_bytes(bytes);
        ctr.increment(1).unwrap();
        assert_eq!(ctr.block_index(), 0x1_0000);
        assert_eq!(ctr.nonce(), NONCE);
    }

    #[test]
    fn increment_by_large_value() {
        let mut ctr = Counter::new(NONCE);
        ctr.increment(0x0102_0304_0506).unwrap();
        assert_eq!(ctr.block_index(), 0x0102_0304_0506);
        ctr.increment(0).unwrap();
        assert_eq!(ctr.block_index(), 0x0102_0304_0506);
    }

    #[test]
    fn negative_increment_is_rejected() {
        let mut ctr = Counter::new(NONCE);
        assert!(matches!(ctr.increment(-1), Err(Error::InvalidArgument(_))));
        assert_eq!(ctr, Counter::new(NONCE));
    }

    #[test]
    fn overflow_never_touches_nonce() {
        let mut bytes = [0xFFu8; BLOCK_SIZE];
        bytes[..NONCE_SIZE].copy_from_slice(&NONCE);
        let mut ctr = Counter::from_bytes(bytes);
        let before = ctr;
        assert_eq!(ctr.increment(1), Err(Error::Overflow));
        assert_eq!(ctr, before);
        assert_eq!(ctr.nonce(), NONCE);
    }

    #[test]
    fn last_block_is_reachable() {
        let mut ctr = Counter::new(NONCE);
        ctr.increment(i64::MAX).unwrap();
        ctr.increment(i64::MAX).unwrap();
        ctr.increment(1).unwrap();
        assert_eq!(ctr.block_index(), u64::MAX);
        assert_eq!(ctr.remaining_blocks(), 1);
        assert_eq!(ctr.increment(1), Err(Error::Overflow));
    }

    #[test]
    fn at_position_rounds_down_to_block() {
        let ctr = Counter::at_position(NONCE, 16 * 5 + 7).unwrap();
        assert_eq!(ctr.block_index(), 5);
        assert_eq!(ctr.nonce(), NONCE);
    }

    #[test]
    fn offset_does_not_mutate() {
        let ctr = Counter::new(NONCE);
        let later = ctr.offset(9).unwrap();
        assert_eq!(ctr.block_index(), 0);
        assert_eq!(later.block_index(), 9);
        assert_eq!(ctr.remaining_blocks(), u64::MAX);
    }
}
