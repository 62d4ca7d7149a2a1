//! `cipher`-crate integration: AES-256 CTR as a [`StreamCipherCore`].
//!
//! The IV is the full 16-byte initial counter block (nonce prefix plus block
//! index). Seek positions count blocks from that initial block.

use cipher::consts::{U8, U16, U32};
use cipher::{
    BlockSizeUser, Iv, IvSizeUser, KeyIvInit, KeySizeUser, ParBlocks, ParBlocksSizeUser,
    StreamBackend, StreamCipherCore, StreamCipherSeekCore, StreamClosure,
};
use zeroize::ZeroizeOnDrop;

use crate::backends::{BlockCipher, Software, Vector};
use crate::{BLOCK_SIZE, Block, Counter, ExpandedKey, Key, NONCE_SIZE};

/// Core state: the expanded key, the initial counter and the block position.
pub struct Aes256CtrCore {
    key: ExpandedKey,
    initial: Counter,
    position: u64,
    /// Present when the CPU has AES instructions.
    vector: Option<Vector>,
}

impl Aes256CtrCore {
    /// Counter block for `position` blocks past the initial counter. The
    /// index wraps instead of failing; `remaining_blocks` keeps callers from
    /// getting that far.
    fn counter_block(&self, position: u64) -> Block {
        let mut block = self.initial.to_block();
        let index = self.initial.block_index().wrapping_add(position);
        block[NONCE_SIZE..].copy_from_slice(&index.to_be_bytes());
        block
    }

    fn fill(&mut self, out: &mut [Block]) {
        for (i, block) in out.iter_mut().enumerate() {
            *block = self.counter_block(self.position.wrapping_add(i as u64));
        }
        match &self.vector {
            Some(vector) => vector.encrypt_all(&self.key, out),
            None => {
                for block in out.iter_mut() {
                    crate::rijndael::encrypt_block(&self.key, block);
                }
            }
        }
        self.position = self.position.wrapping_add(out.len() as u64);
    }
}

impl KeySizeUser for Aes256CtrCore {
    type KeySize = U32;
}

impl IvSizeUser for Aes256CtrCore {
    type IvSize = U16;
}

impl BlockSizeUser for Aes256CtrCore {
    type BlockSize = U16;
}

impl KeyIvInit for Aes256CtrCore {
    fn new(key: &cipher::Key<Self>, iv: &Iv<Self>) -> Self {
        let key = Key::new((*key).into());
        let vector = Vector::new().ok();
        let key = match &vector {
            Some(vector) => vector.expand_key(&key),
            None => Software.expand_key(&key),
        };
        let initial: [u8; BLOCK_SIZE] = (*iv).into();
        Self {
            key,
            initial: Counter::from_bytes(initial),
            position: 0,
            vector,
        }
    }
}

impl StreamCipherCore for Aes256CtrCore {
    fn remaining_blocks(&self) -> Option<usize> {
        let left = self.initial.remaining_blocks().saturating_sub(self.position);
        usize::try_from(left).ok()
    }

    fn process_with_backend(&mut self, f: impl StreamClosure<BlockSize = Self::BlockSize>) {
        f.call(&mut Backend(self));
    }
}

impl StreamCipherSeekCore for Aes256CtrCore {
    type Counter = u64;

    fn get_block_pos(&self) -> u64 {
        self.position
    }

    fn set_block_pos(&mut self, pos: u64) {
        self.position = pos;
    }
}

impl ZeroizeOnDrop for Aes256CtrCore {}

impl core::fmt::Debug for Aes256CtrCore {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("Aes256CtrCore { .. }")
    }
}

struct Backend<'a>(&'a mut Aes256CtrCore);

impl BlockSizeUser for Backend<'_> {
    type BlockSize = U16;
}

impl ParBlocksSizeUser for Backend<'_> {
    type ParBlocksSize = U8;
}

impl StreamBackend for Backend<'_> {
    #[inline]
    fn gen_ks_block(&mut self, block: &mut cipher::Block<Self>) {
        let mut out = [[0u8; BLOCK_SIZE]; 1];
        self.0.fill(&mut out);
        block.copy_from_slice(&out[0]);
    }

    #[inline]
    fn gen_par_ks_blocks(&mut self, blocks: &mut ParBlocks<Self>) {
        let mut out = [[0u8; BLOCK_SIZE]; 8];
        self.0.fill(&mut out);
        for (dst, src) in blocks.iter_mut().zip(out.iter()) {
            dst.copy_from_slice(src);
        }
    }
}

#[cfg(test)]
mod tests {
    use cipher::{KeyIvInit, StreamCipher, StreamCipherSeek};

    use crate::Aes256Ctr;

    const KEY: &str = "603deb1015ca71be2b73aef0857d77811f352c073b6108d72d9810a30914dff4";
    const IV: &str = "f0f1f2f3f4f5f6f7f8f9fafbfcfdfeff";
    const PLAIN: &str = "6bc1bee22e409f96e93d7e117393172a\
                         ae2d8a571e03ac9c9eb76fac45af8e51\
                         30c81c46a35ce411e5fbc1191a0a52ef\
                         f69f2445df4f9b17ad2b417be66c3710";
    const CIPHER: &str = "601ec313775789a5b7a7f504bbf3d228\
                          f443e3ca4d62b59aca84e990cacaf5c5\
                          2b0930daa23de94ce87017ba2d84988d\
                          dfc9c58db67aada613c2dd08457941a6";

    fn cipher() -> Aes256Ctr {
        let key = hex::decode(KEY).unwrap();
        let iv = hex::decode(IV).unwrap();
        Aes256Ctr::new_from_slices(&key, &iv).unwrap()
    }

    #[test]
    fn sp800_38a_ctr_aes256() {
        let mut data = hex::decode(PLAIN).unwrap();
        cipher().apply_keystream(&mut data);
        assert_eq!(hex::encode(&data), CIPHER);
    }

    #[test]
    fn wide_buffers_use_parallel_blocks() {
        // 8 blocks take the parallel path; compare against block-at-a-time.
        let mut wide = vec![0u8; 16 * 19 + 5];
        cipher().apply_keystream(&mut wide);
        let mut narrow = vec![0u8; wide.len()];
        let mut c = cipher();
        for chunk in narrow.chunks_mut(7) {
            c.apply_keystream(chunk);
        }
        assert_eq!(wide, narrow);
    }

    #[test]
    fn seek_is_relative_to_initial_counter() {
        let mut c = cipher();
        c.seek(32u64);
        let mut data = hex::decode(&PLAIN[64..]).unwrap();
        c.apply_keystream(&mut data);
        assert_eq!(hex::encode(&data), &CIPHER[64..]);
        assert_eq!(c.current_pos::<u64>(), 64);
    }

    #[test]
    fn exhausted_counter_is_an_error() {
        let key = [0u8; 32];
        let mut iv = [0xFFu8; 16];
        iv[..8].copy_from_slice(&[9; 8]);
        iv[15] = 0xFE;
        let mut c = Aes256Ctr::new(&key.into(), &iv.into());
        let mut two_blocks = [0u8; 32];
        assert!(c.try_apply_keystream(&mut two_blocks).is_ok());
        let mut more = [0u8; 1];
        assert!(c.try_apply_keystream(&mut more).is_err());
    }
}
