//! The streaming CTR transform over tag-interleaved buffers.
//!
//! Three coordinate spaces are tracked separately:
//!
//! ```text
//! logical   plaintext bytes handled by this call        drives the Counter
//! physical  position in the buffer that carries tags    skips tag gaps
//! block     position inside the current keystream block  0..16
//! ```
//!
//! A chunked physical stream looks like
//! `[tag 0][chunk 0 ciphertext][tag 1][chunk 1 ciphertext]...`. Tags never
//! advance the counter; only logical bytes do.

use std::time::Instant;

use crate::backends::BlockCipher;
use crate::error::{Error, Result};
use crate::rijndael::xor_into;
use crate::{BLOCK_SIZE, Block, Counter, ExpandedKey, MAX_BATCH_BLOCKS};

/// Bytes of plaintext processed so far in one call.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct LogicalOffset(pub usize);

/// Position in the tag-carrying buffer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct PhysicalOffset(pub usize);

/// Position inside the current 16-byte keystream block.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct BlockOffset(usize);

impl BlockOffset {
    pub fn new(offset: usize) -> Result<Self> {
        if offset >= BLOCK_SIZE {
            return Err(Error::invalid(format!(
                "block offset {offset} must be below {BLOCK_SIZE}"
            )));
        }
        Ok(Self(offset))
    }

    pub fn get(self) -> usize {
        self.0
    }

    /// Bytes left in the block.
    fn remaining(self) -> usize {
        BLOCK_SIZE - self.0
    }
}

/// Where the integrity tags sit in the physical stream, and where inside the
/// first chunk a call starts.
///
/// `chunk_size == 0` means no tags; only `block_offset` applies then.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ChunkGeometry {
    /// Logical bytes per chunk; a multiple of 16, or 0.
    pub chunk_size: usize,
    /// Physical bytes reserved in front of each chunk.
    pub tag_length: usize,
    /// Bytes of the first chunk before the block holding the first
    /// requested byte. Applies to the first step of a call only.
    pub chunk_to_block_offset: usize,
    /// Bytes of that block before the first requested byte.
    pub block_offset: usize,
}

impl ChunkGeometry {
    pub const fn unchunked() -> Self {
        Self {
            chunk_size: 0,
            tag_length: 0,
            chunk_to_block_offset: 0,
            block_offset: 0,
        }
    }

    pub const fn chunked(chunk_size: usize, tag_length: usize) -> Self {
        Self {
            chunk_size,
            tag_length,
            chunk_to_block_offset: 0,
            block_offset: 0,
        }
    }

    pub const fn with_chunk_offset(mut self, chunk_to_block_offset: usize) -> Self {
        self.chunk_to_block_offset = chunk_to_block_offset;
        self
    }

    pub const fn with_block_offset(mut self, block_offset: usize) -> Self {
        self.block_offset = block_offset;
        self
    }

    pub fn is_chunked(&self) -> bool {
        self.chunk_size > 0
    }

    pub fn validate(&self) -> Result<()> {
        BlockOffset::new(self.block_offset)?;
        if !self.is_chunked() {
            return Ok(());
        }
        if self.chunk_size % BLOCK_SIZE != 0 {
            return Err(Error::invalid(format!(
                "chunk size {} is not a multiple of {BLOCK_SIZE}",
                self.chunk_size
            )));
        }
        if self.chunk_to_block_offset + self.block_offset >= self.chunk_size {
            return Err(Error::invalid(format!(
                "start offset {} lies outside the {}-byte chunk",
                self.chunk_to_block_offset + self.block_offset,
                self.chunk_size
            )));
        }
        Ok(())
    }

    /// Offset of the first requested byte from the start of its chunk (from
    /// its cipher block when unchunked).
    fn start(&self) -> usize {
        if self.is_chunked() {
            self.chunk_to_block_offset + self.block_offset
        } else {
            self.block_offset
        }
    }

    /// Whether a tag sits in front of the logical byte `logical` of a call.
    fn tag_before(&self, logical: LogicalOffset) -> bool {
        self.is_chunked() && (self.start() + logical.0) % self.chunk_size == 0
    }

    /// Physical bytes an encrypt call of `count` bytes writes, tag gaps
    /// included.
    pub fn physical_len(&self, count: usize) -> usize {
        if !self.is_chunked() || count == 0 {
            return count;
        }
        let start = self.start();
        let tags = (start + count).div_ceil(self.chunk_size) - start.div_ceil(self.chunk_size);
        count + tags * self.tag_length
    }
}

/// Position of a transform in all three coordinate spaces.
#[derive(Clone, Copy, Debug)]
struct Cursor {
    logical: LogicalOffset,
    physical: PhysicalOffset,
    block: BlockOffset,
}

impl Cursor {
    fn new(block: BlockOffset) -> Self {
        Self {
            logical: LogicalOffset::default(),
            physical: PhysicalOffset::default(),
            block,
        }
    }

    fn skip_physical(&mut self, n: usize) {
        self.physical.0 += n;
    }

    /// Moves past `n` bytes of data; returns true when that completed the
    /// current keystream block.
    fn advance(&mut self, n: usize) -> bool {
        self.logical.0 += n;
        self.physical.0 += n;
        let next = self.block.0 + n;
        debug_assert!(next <= BLOCK_SIZE);
        if next == BLOCK_SIZE {
            self.block = BlockOffset(0);
            true
        } else {
            self.block = BlockOffset(next);
            false
        }
    }

    /// Keystream blocks needed to cover `remaining` more logical bytes.
    fn blocks_for(&self, remaining: usize) -> usize {
        (self.block.0 + remaining).div_ceil(BLOCK_SIZE)
    }
}

/// Keystream blocks produced ahead of the counter, one batch at a time.
///
/// Block `i` of the batch belongs to the counter value the caller's counter
/// had when the batch was filled, plus `i`. The caller's counter itself only
/// moves as blocks are consumed.
struct Keystream<'a> {
    cipher: &'a dyn BlockCipher,
    key: &'a ExpandedKey,
    batch_blocks: usize,
    blocks: [Block; MAX_BATCH_BLOCKS],
    filled: usize,
    next: usize,
}

impl<'a> Keystream<'a> {
    fn new(cipher: &'a dyn BlockCipher, key: &'a ExpandedKey, batch_blocks: usize) -> Self {
        Self {
            cipher,
            key,
            batch_blocks: batch_blocks.clamp(1, MAX_BATCH_BLOCKS),
            blocks: [[0u8; BLOCK_SIZE]; MAX_BATCH_BLOCKS],
            filled: 0,
            next: 0,
        }
    }

    /// The keystream block for `counter`, refilling when the batch is spent.
    fn current(&mut self, counter: &Counter, blocks_wanted: usize) -> Result<&Block> {
        if self.next == self.filled {
            let n = blocks_wanted
                .clamp(1, self.batch_blocks)
                .min(usize::try_from(counter.remaining_blocks()).unwrap_or(usize::MAX));
            self.cipher.keystream(self.key, counter, &mut self.blocks[..n])?;
            self.filled = n;
            self.next = 0;
        }
        Ok(&self.blocks[self.next])
    }

    fn consume(&mut self) {
        self.next += 1;
    }
}

impl Drop for Keystream<'_> {
    fn drop(&mut self) {
        use zeroize::Zeroize;
        self.blocks.zeroize();
    }
}

/// Drives one backend over caller buffers with a caller-owned [`Counter`].
///
/// Holds no stream state of its own: everything needed to resume lives in
/// the counter and the geometry of the next call.
#[derive(Clone, Copy)]
pub struct StreamTransform<'a> {
    cipher: &'a dyn BlockCipher,
    key: &'a ExpandedKey,
    batch_blocks: usize,
    log_details: bool,
}

impl<'a> StreamTransform<'a> {
    pub fn new(cipher: &'a dyn BlockCipher, key: &'a ExpandedKey) -> Self {
        Self {
            cipher,
            key,
            batch_blocks: crate::engine::DEFAULT_BATCH_BLOCKS,
            log_details: false,
        }
    }

    pub fn with_batch_blocks(mut self, batch_blocks: usize) -> Self {
        self.batch_blocks = batch_blocks.clamp(1, MAX_BATCH_BLOCKS);
        self
    }

    pub fn with_log_details(mut self, log_details: bool) -> Self {
        self.log_details = log_details;
        self
    }

    /// Encrypts `count` bytes of `src` into the physical stream `dest`.
    ///
    /// `src` starts at the first byte to encrypt and `dest` at the same spot
    /// of the physical stream. A tag gap of `tag_length` bytes is left (not
    /// written) in front of every byte that starts a chunk. `counter` must
    /// address the block holding the first byte; it is advanced as blocks are
    /// completed, so a partial trailing block leaves it in place.
    ///
    /// Returns the logical bytes written, i.e. `count`. On
    /// [`Error::Overflow`] the output written so far is valid but the call
    /// has failed.
    pub fn encrypt(
        &self,
        counter: &mut Counter,
        geometry: &ChunkGeometry,
        src: &[u8],
        dest: &mut [u8],
        count: usize,
    ) -> Result<usize> {
        geometry.validate()?;
        if src.len() < count {
            return Err(Error::invalid(format!(
                "source holds {} bytes, {count} requested",
                src.len()
            )));
        }
        let needed = geometry.physical_len(count);
        if dest.len() < needed {
            return Err(Error::invalid(format!(
                "destination holds {} bytes, {needed} required",
                dest.len()
            )));
        }

        let started = self.log_details.then(Instant::now);
        let first_block = BlockOffset(geometry.start() % BLOCK_SIZE);
        let base_index = counter.block_index();
        let mut cursor = Cursor::new(first_block);
        let mut keystream = Keystream::new(self.cipher, self.key, self.batch_blocks);

        while cursor.logical.0 < count {
            debug_assert_eq!(
                counter.block_index(),
                base_index.wrapping_add(((first_block.0 + cursor.logical.0) / BLOCK_SIZE) as u64)
            );
            let remaining = count - cursor.logical.0;
            let length = cursor.block.remaining().min(remaining);

            if geometry.tag_before(cursor.logical) {
                cursor.skip_physical(geometry.tag_length);
            }

            let pad = keystream.current(counter, cursor.blocks_for(remaining))?;
            let from = cursor.logical.0;
            let to = cursor.physical.0;
            let offset = cursor.block.0;
            xor_into(
                &mut dest[to..to + length],
                &src[from..from + length],
                &pad[offset..offset + length],
            );

            if cursor.advance(length) {
                advance_counter(counter)?;
                keystream.consume();
            }
        }

        if let Some(started) = started {
            tracing::debug!(
                backend = %self.cipher.kind(),
                bytes = cursor.logical.0,
                physical = cursor.physical.0,
                elapsed_us = started.elapsed().as_micros() as u64,
                "encrypt"
            );
        }
        Ok(cursor.logical.0)
    }

    /// Decrypts up to `count` bytes from the physical stream `src` into
    /// `dest`.
    ///
    /// `src` starts at a chunk boundary (its tag first) when the geometry is
    /// chunked, otherwise at the start of the cipher block holding the first
    /// requested byte. Skips happen in a fixed order on the first step: the
    /// tag, then `chunk_to_block_offset`, then `block_offset`.
    /// `bytes_available` caps the logical bytes taken from `src`; running out
    /// of `src` itself ends the call early.
    ///
    /// Returns the bytes decrypted. Fewer than `count` is a short read, not
    /// an error; see [`decrypt_exact`](Self::decrypt_exact).
    pub fn decrypt(
        &self,
        counter: &mut Counter,
        geometry: &ChunkGeometry,
        src: &[u8],
        bytes_available: usize,
        dest: &mut [u8],
        count: usize,
    ) -> Result<usize> {
        geometry.validate()?;
        let limit = count.min(bytes_available);
        if dest.len() < limit {
            return Err(Error::invalid(format!(
                "destination holds {} bytes, {limit} required",
                dest.len()
            )));
        }

        let started = self.log_details.then(Instant::now);
        let first_block = BlockOffset(geometry.start() % BLOCK_SIZE);
        let base_index = counter.block_index();
        let mut cursor = Cursor::new(first_block);
        let mut keystream = Keystream::new(self.cipher, self.key, self.batch_blocks);

        if geometry.is_chunked() {
            cursor.skip_physical(geometry.tag_length);
            cursor.skip_physical(geometry.chunk_to_block_offset);
        }
        cursor.skip_physical(geometry.block_offset);

        while cursor.logical.0 < limit {
            debug_assert_eq!(
                counter.block_index(),
                base_index.wrapping_add(((first_block.0 + cursor.logical.0) / BLOCK_SIZE) as u64)
            );
            if cursor.logical.0 > 0 && geometry.tag_before(cursor.logical) {
                cursor.skip_physical(geometry.tag_length);
            }

            let remaining = limit - cursor.logical.0;
            let length = cursor.block.remaining().min(remaining);
            let physical = cursor.physical.0;
            let read = length.min(src.len().saturating_sub(physical));
            if read == 0 {
                break;
            }

            let pad = keystream.current(counter, cursor.blocks_for(remaining))?;
            let to = cursor.logical.0;
            let offset = cursor.block.0;
            xor_into(
                &mut dest[to..to + read],
                &src[physical..physical + read],
                &pad[offset..offset + read],
            );

            if cursor.advance(read) {
                advance_counter(counter)?;
                keystream.consume();
            }
            if read < length {
                break;
            }
        }

        if let Some(started) = started {
            tracing::debug!(
                backend = %self.cipher.kind(),
                bytes = cursor.logical.0,
                requested = count,
                elapsed_us = started.elapsed().as_micros() as u64,
                "decrypt"
            );
        }
        Ok(cursor.logical.0)
    }

    /// [`decrypt`](Self::decrypt), but a short read is
    /// [`Error::ShortRead`].
    pub fn decrypt_exact(
        &self,
        counter: &mut Counter,
        geometry: &ChunkGeometry,
        src: &[u8],
        dest: &mut [u8],
        count: usize,
    ) -> Result<usize> {
        let read = self.decrypt(counter, geometry, src, count, dest, count)?;
        if read < count {
            return Err(Error::ShortRead {
                requested: count,
                read,
            });
        }
        Ok(read)
    }

    /// Plain CTR over `src` into `dest` (same length), starting at the
    /// beginning of the counter's block. Whole blocks advance the counter.
    pub fn apply_keystream(&self, counter: &mut Counter, src: &[u8], dest: &mut [u8]) -> Result<usize> {
        if dest.len() < src.len() {
            return Err(Error::invalid(format!(
                "destination holds {} bytes, {} required",
                dest.len(),
                src.len()
            )));
        }
        self.encrypt(counter, &ChunkGeometry::unchunked(), src, dest, src.len())
    }
}

fn advance_counter(counter: &mut Counter) -> Result<()> {
    counter.increment(1).inspect_err(|_| {
        tracing::warn!(
            block_index = counter.block_index(),
            "counter exhausted for this nonce"
        );
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Key;
    use crate::backends::Software;

    fn setup() -> (Software, ExpandedKey) {
        let cipher = Software;
        let key = cipher.expand_key(&Key::new([0x11; 32]));
        (cipher, key)
    }

    fn plaintext(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 7 + 3) as u8).collect()
    }

    #[test]
    fn physical_len_counts_tags() {
        let g = ChunkGeometry::chunked(64, 32);
        assert_eq!(g.physical_len(0), 0);
        assert_eq!(g.physical_len(1), 33);
        assert_eq!(g.physical_len(64), 96);
        assert_eq!(g.physical_len(65), 129);
        assert_eq!(g.physical_len(128), 192);
        // Starting mid-chunk: no tag until the next boundary.
        assert_eq!(g.with_chunk_offset(16).physical_len(48), 48);
        assert_eq!(g.with_chunk_offset(16).physical_len(49), 81);
        assert_eq!(ChunkGeometry::unchunked().physical_len(77), 77);
    }

    #[test]
    fn geometry_validation() {
        assert!(ChunkGeometry::unchunked().with_block_offset(16).validate().is_err());
        assert!(ChunkGeometry::chunked(50, 32).validate().is_err());
        assert!(ChunkGeometry::chunked(64, 32).with_chunk_offset(64).validate().is_err());
        assert!(ChunkGeometry::chunked(64, 32).with_chunk_offset(48).with_block_offset(15).validate().is_ok());
        // Chunk offset is meaningless without chunks.
        assert!(ChunkGeometry::unchunked().with_chunk_offset(1000).validate().is_ok());
    }

    #[test]
    fn encrypt_leaves_tag_gaps_untouched() {
        let (cipher, key) = setup();
        let t = StreamTransform::new(&cipher, &key);
        let g = ChunkGeometry::chunked(32, 8);
        let pt = plaintext(40);
        let mut out = vec![0xEEu8; g.physical_len(40)];
        assert_eq!(out.len(), 40 + 16);
        let mut ctr = Counter::new([0; 8]);
        t.encrypt(&mut ctr, &g, &pt, &mut out, 40).unwrap();
        assert!(out[..8].iter().all(|&b| b == 0xEE));
        assert!(out[40..48].iter().all(|&b| b == 0xEE));

        // Same bytes as plain CTR once the gaps are removed.
        let mut plain = vec![0u8; 40];
        t.apply_keystream(&mut Counter::new([0; 8]), &pt, &mut plain).unwrap();
        assert_eq!(&out[8..40], &plain[..32]);
        assert_eq!(&out[48..], &plain[32..]);
    }

    #[test]
    fn partial_block_does_not_advance_counter() {
        let (cipher, key) = setup();
        let t = StreamTransform::new(&cipher, &key);
        let pt = plaintext(21);
        let mut out = vec![0u8; 21];
        let mut ctr = Counter::new([3; 8]);
        t.apply_keystream(&mut ctr, &pt, &mut out).unwrap();
        assert_eq!(ctr.block_index(), 1);
    }

    #[test]
    fn decrypt_stops_when_physical_input_runs_out() {
        let (cipher, key) = setup();
        let t = StreamTransform::new(&cipher, &key);
        let pt = plaintext(48);
        let mut ct = vec![0u8; 48];
        t.apply_keystream(&mut Counter::new([0; 8]), &pt, &mut ct).unwrap();

        let mut out = vec![0u8; 48];
        let mut ctr = Counter::new([0; 8]);
        let n = t
            .decrypt(&mut ctr, &ChunkGeometry::unchunked(), &ct[..20], 48, &mut out, 48)
            .unwrap();
        assert_eq!(n, 20);
        assert_eq!(&out[..20], &pt[..20]);
        assert_eq!(ctr.block_index(), 1);
    }

    #[test]
    fn decrypt_exact_reports_short_read() {
        let (cipher, key) = setup();
        let t = StreamTransform::new(&cipher, &key);
        let mut out = [0u8; 32];
        let err = t
            .decrypt_exact(&mut Counter::new([0; 8]), &ChunkGeometry::unchunked(), &[0u8; 10], &mut out, 32)
            .unwrap_err();
        assert_eq!(err, Error::ShortRead { requested: 32, read: 10 });
    }

    #[test]
    fn undersized_destination_is_rejected() {
        let (cipher, key) = setup();
        let t = StreamTransform::new(&cipher, &key);
        let mut out = [0u8; 40];
        let err = t
            .encrypt(&mut Counter::new([0; 8]), &ChunkGeometry::chunked(32, 8), &[0u8; 40], &mut out, 40)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn overflow_mid_stream_keeps_nonce() {
        let (cipher, key) = setup();
        let t = StreamTransform::new(&cipher, &key);
        let mut bytes = [0xFFu8; 16];
        bytes[..8].copy_from_slice(&[1, 2, 3, 4, 5, 6, 7, 8]);
        let mut ctr = Counter::from_bytes(bytes);
        let mut out = [0u8; 32];
        let err = t.apply_keystream(&mut ctr, &[0u8; 32], &mut out).unwrap_err();
        assert_eq!(err, Error::Overflow);
        assert_eq!(ctr.nonce(), [1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(ctr.block_index(), u64::MAX);

        // The final partial block is still usable.
        let mut tail = [0u8; 15];
        assert_eq!(t.apply_keystream(&mut ctr, &[0u8; 15], &mut tail), Ok(15));
    }
}
