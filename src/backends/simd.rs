use cfg_if::cfg_if;

use crate::Tokens;
use crate::backends::{BackendKind, BlockCipher};
use crate::error::{Error, Result};
use crate::{Block, ExpandedKey, Key};

/// Blocks encrypted together by the pipelined path.
pub(crate) const LANES: usize = 8;

/// The vector backend: AES round instructions, eight blocks in flight.
///
/// Holding a `Vector` proves the CPU supports the instructions, which is what
/// makes the `unsafe` calls below sound.
#[derive(Clone, Copy, Debug)]
pub struct Vector {
    _token: Tokens,
}

impl Vector {
    pub fn new() -> Result<Self> {
        probe().map(|token| Vector { _token: token })
    }

    /// Encrypts independent blocks in place, eight at a time.
    pub(crate) fn encrypt_all(&self, key: &ExpandedKey, blocks: &mut [Block]) {
        let mut chunks = blocks.chunks_exact_mut(LANES);
        for chunk in &mut chunks {
            // SAFETY: see the type-level comment.
            unsafe { imp::encrypt8(key, chunk) };
        }
        for block in chunks.into_remainder() {
            // SAFETY: see the type-level comment.
            unsafe { imp::encrypt1(key, block) };
        }
    }
}

impl BlockCipher for Vector {
    fn kind(&self) -> BackendKind {
        BackendKind::Vector
    }

    fn expand_key(&self, key: &Key) -> ExpandedKey {
        // SAFETY: see the type-level comment.
        unsafe { imp::expand_key(key.as_bytes()) }
    }

    #[inline]
    fn encrypt_block(&self, key: &ExpandedKey, block: &mut Block) -> Result<()> {
        // SAFETY: see the type-level comment.
        unsafe { imp::encrypt1(key, block) };
        Ok(())
    }

    fn encrypt_blocks(&self, key: &ExpandedKey, blocks: &mut [Block]) -> Result<()> {
        self.encrypt_all(key, blocks);
        Ok(())
    }
}

fn unavailable(reason: &'static str) -> Error {
    Error::BackendUnavailable {
        backend: BackendKind::Vector,
        reason,
    }
}

cfg_if! {
    if #[cfg(aesctr_force_soft)] {
        pub(crate) fn probe() -> Result<Tokens> {
            Err(unavailable("built with aesctr_force_soft"))
        }
    } else if #[cfg(any(target_arch = "x86", target_arch = "x86_64", target_arch = "aarch64"))] {
        pub(crate) fn probe() -> Result<Tokens> {
            let (token, available) = crate::aes_cpuid::init_get();
            if available {
                Ok(token)
            } else {
                Err(unavailable("CPU lacks AES instructions"))
            }
        }
    } else {
        pub(crate) fn probe() -> Result<Tokens> {
            Err(unavailable("no AES instructions on this architecture"))
        }
    }
}

cfg_if! {
    if #[cfg(all(any(target_arch = "x86", target_arch = "x86_64"), not(aesctr_force_soft)))] {
        // AES-NI, following Intel's AES-NI white paper for the 256-bit schedule.
        #[allow(unused_unsafe)]
        mod imp {
            #[cfg(target_arch = "x86")]
            use core::arch::x86::*;
            #[cfg(target_arch = "x86_64")]
            use core::arch::x86_64::*;

            use super::LANES;
            use crate::{Block, ExpandedKey, KEY_SIZE, ROUNDS};

            #[inline]
            #[target_feature(enable = "aes,sse2")]
            unsafe fn assist_1(temp1: __m128i, temp2: __m128i) -> __m128i {
                unsafe {
                    let temp2 = _mm_shuffle_epi32(temp2, 0xff);
                    let mut temp4 = _mm_slli_si128(temp1, 0x4);
                    let mut temp1 = _mm_xor_si128(temp1, temp4);
                    temp4 = _mm_slli_si128(temp4, 0x4);
                    temp1 = _mm_xor_si128(temp1, temp4);
                    temp4 = _mm_slli_si128(temp4, 0x4);
                    temp1 = _mm_xor_si128(temp1, temp4);
                    _mm_xor_si128(temp1, temp2)
                }
            }

            #[inline]
            #[target_feature(enable = "aes,sse2")]
            unsafe fn assist_2(temp1: __m128i, temp3: __m128i) -> __m128i {
                unsafe {
                    let temp2 = _mm_shuffle_epi32(_mm_aeskeygenassist_si128(temp1, 0x0), 0xaa);
                    let mut temp4 = _mm_slli_si128(temp3, 0x4);
                    let mut temp3 = _mm_xor_si128(temp3, temp4);
                    temp4 = _mm_slli_si128(temp4, 0x4);
                    temp3 = _mm_xor_si128(temp3, temp4);
                    temp4 = _mm_slli_si128(temp4, 0x4);
                    temp3 = _mm_xor_si128(temp3, temp4);
                    _mm_xor_si128(temp3, temp2)
                }
            }

            // Two round keys per round constant; the rcon must be a literal.
            macro_rules! expand_pair {
                ($schedule:ident, $index:expr, $temp1:ident, $temp3:ident, $rcon:literal) => {
                    $temp1 = assist_1($temp1, _mm_aeskeygenassist_si128($temp3, $rcon));
                    $schedule[$index] = $temp1;
                    $temp3 = assist_2($temp1, $temp3);
                    $schedule[$index + 1] = $temp3;
                };
            }

            #[target_feature(enable = "aes,sse2")]
            pub(super) unsafe fn expand_key(key: &[u8; KEY_SIZE]) -> ExpandedKey {
                unsafe {
                    let mut schedule = [_mm_setzero_si128(); ROUNDS + 1];
                    let mut temp1 = _mm_loadu_si128(key.as_ptr().cast());
                    let mut temp3 = _mm_loadu_si128(key[16..].as_ptr().cast());
                    schedule[0] = temp1;
                    schedule[1] = temp3;
                    expand_pair!(schedule, 2, temp1, temp3, 0x01);
                    expand_pair!(schedule, 4, temp1, temp3, 0x02);
                    expand_pair!(schedule, 6, temp1, temp3, 0x04);
                    expand_pair!(schedule, 8, temp1, temp3, 0x08);
                    expand_pair!(schedule, 10, temp1, temp3, 0x10);
                    expand_pair!(schedule, 12, temp1, temp3, 0x20);
                    temp1 = assist_1(temp1, _mm_aeskeygenassist_si128(temp3, 0x40));
                    schedule[14] = temp1;

                    let mut expanded = ExpandedKey::zeroed();
                    for (dst, rk) in expanded.0.iter_mut().zip(schedule.iter()) {
                        _mm_storeu_si128(dst.as_mut_ptr().cast(), *rk);
                    }
                    expanded
                }
            }

            #[inline]
            #[target_feature(enable = "aes,sse2")]
            unsafe fn load_round_keys(key: &ExpandedKey) -> [__m128i; ROUNDS + 1] {
                unsafe {
                    let mut round_keys = [_mm_setzero_si128(); ROUNDS + 1];
                    for (dst, rk) in round_keys.iter_mut().zip(key.0.iter()) {
                        *dst = _mm_loadu_si128(rk.as_ptr().cast());
                    }
                    round_keys
                }
            }

            #[inline]
            #[target_feature(enable = "aes,sse2")]
            pub(super) unsafe fn encrypt1(key: &ExpandedKey, block: &mut Block) {
                unsafe {
                    let round_keys = load_round_keys(key);
                    let mut state = _mm_loadu_si128(block.as_ptr().cast());
                    state = _mm_xor_si128(state, round_keys[0]);
                    for rk in &round_keys[1..ROUNDS] {
                        state = _mm_aesenc_si128(state, *rk);
                    }
                    state = _mm_aesenclast_si128(state, round_keys[ROUNDS]);
                    _mm_storeu_si128(block.as_mut_ptr().cast(), state);
                }
            }

            /// `blocks` must hold exactly `LANES` blocks.
            #[target_feature(enable = "aes,sse2")]
            pub(super) unsafe fn encrypt8(key: &ExpandedKey, blocks: &mut [Block]) {
                debug_assert_eq!(blocks.len(), LANES);
                unsafe {
                    let round_keys = load_round_keys(key);
                    let mut lanes = [_mm_setzero_si128(); LANES];
                    for (lane, block) in lanes.iter_mut().zip(blocks.iter()) {
                        *lane = _mm_xor_si128(_mm_loadu_si128(block.as_ptr().cast()), round_keys[0]);
                    }
                    for rk in &round_keys[1..ROUNDS] {
                        for lane in lanes.iter_mut() {
                            *lane = _mm_aesenc_si128(*lane, *rk);
                        }
                    }
                    for (lane, block) in lanes.iter().zip(blocks.iter_mut()) {
                        let out = _mm_aesenclast_si128(*lane, round_keys[ROUNDS]);
                        _mm_storeu_si128(block.as_mut_ptr().cast(), out);
                    }
                }
            }
        }
    } else if #[cfg(all(target_arch = "aarch64", not(aesctr_force_soft)))] {
        // ARMv8 crypto extensions. AESE folds AddRoundKey in front of
        // SubBytes/ShiftRows, so the last round key is a plain XOR.
        #[allow(unused_unsafe)]
        mod imp {
            use core::arch::aarch64::*;

            use super::LANES;
            use crate::{Block, ExpandedKey, KEY_SIZE, ROUNDS};

            /// The instructions only cover the rounds; the schedule is the
            /// portable one.
            pub(super) unsafe fn expand_key(key: &[u8; KEY_SIZE]) -> ExpandedKey {
                crate::rijndael::expand_key(key)
            }

            #[inline]
            #[target_feature(enable = "aes,neon")]
            pub(super) unsafe fn encrypt1(key: &ExpandedKey, block: &mut Block) {
                unsafe {
                    let mut state = vld1q_u8(block.as_ptr());
                    for rk in &key.0[..ROUNDS - 1] {
                        state = vaesmcq_u8(vaeseq_u8(state, vld1q_u8(rk.as_ptr())));
                    }
                    state = vaeseq_u8(state, vld1q_u8(key.0[ROUNDS - 1].as_ptr()));
                    state = veorq_u8(state, vld1q_u8(key.0[ROUNDS].as_ptr()));
                    vst1q_u8(block.as_mut_ptr(), state);
                }
            }

            /// `blocks` must hold exactly `LANES` blocks.
            #[target_feature(enable = "aes,neon")]
            pub(super) unsafe fn encrypt8(key: &ExpandedKey, blocks: &mut [Block]) {
                debug_assert_eq!(blocks.len(), LANES);
                unsafe {
                    let mut lanes = [vdupq_n_u8(0); LANES];
                    for (lane, block) in lanes.iter_mut().zip(blocks.iter()) {
                        *lane = vld1q_u8(block.as_ptr());
                    }
                    for rk in &key.0[..ROUNDS - 1] {
                        let rk = vld1q_u8(rk.as_ptr());
                        for lane in lanes.iter_mut() {
                            *lane = vaesmcq_u8(vaeseq_u8(*lane, rk));
                        }
                    }
                    let penultimate = vld1q_u8(key.0[ROUNDS - 1].as_ptr());
                    let last = vld1q_u8(key.0[ROUNDS].as_ptr());
                    for (lane, block) in lanes.iter().zip(blocks.iter_mut()) {
                        let out = veorq_u8(vaeseq_u8(*lane, penultimate), last);
                        vst1q_u8(block.as_mut_ptr(), out);
                    }
                }
            }
        }
    } else {
        // Never reached: `probe` refuses to build a `Vector` here.
        mod imp {
            use crate::{Block, ExpandedKey, KEY_SIZE};

            pub(super) unsafe fn expand_key(key: &[u8; KEY_SIZE]) -> ExpandedKey {
                crate::rijndael::expand_key(key)
            }

            pub(super) unsafe fn encrypt1(key: &ExpandedKey, block: &mut Block) {
                crate::rijndael::encrypt_block(key, block);
            }

            pub(super) unsafe fn encrypt8(key: &ExpandedKey, blocks: &mut [Block]) {
                for block in blocks.iter_mut() {
                    crate::rijndael::encrypt_block(key, block);
                }
            }
        }
    }
}
