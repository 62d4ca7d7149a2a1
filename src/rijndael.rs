//! Rijndael building blocks shared by the backends.
//!
//! The state is kept in input byte order, i.e. column-major: byte
//! `4 * column + row`.

use zeroize::Zeroize;

use crate::{Block, ExpandedKey, KEY_SIZE, ROUNDS};

/// Words in the key (Nk) for AES-256.
const KEY_WORDS: usize = KEY_SIZE / 4;

#[rustfmt::skip]
pub(crate) const SBOX: [u8; 256] = [
    0x63, 0x7c, 0x77, 0x7b, 0xf2, 0x6b, 0x6f, 0xc5, 0x30, 0x01, 0x67, 0x2b, 0xfe, 0xd7, 0xab, 0x76,
    0xca, 0x82, 0xc9, 0x7d, 0xfa, 0x59, 0x47, 0xf0, 0xad, 0xd4, 0xa2, 0xaf, 0x9c, 0xa4, 0x72, 0xc0,
    0xb7, 0xfd, 0x93, 0x26, 0x36, 0x3f, 0xf7, 0xcc, 0x34, 0xa5, 0xe5, 0xf1, 0x71, 0xd8, 0x31, 0x15,
    0x04, 0xc7, 0x23, 0xc3, 0x18, 0x96, 0x05, 0x9a, 0x07, 0x12, 0x80, 0xe2, 0xeb, 0x27, 0xb2, 0x75,
    0x09, 0x83, 0x2c, 0x1a, 0x1b, 0x6e, 0x5a, 0xa0, 0x52, 0x3b, 0xd6, 0xb3, 0x29, 0xe3, 0x2f, 0x84,
    0x53, 0xd1, 0x00, 0xed, 0x20, 0xfc, 0xb1, 0x5b, 0x6a, 0xcb, 0xbe, 0x39, 0x4a, 0x4c, 0x58, 0xcf,
    0xd0, 0xef, 0xaa, 0xfb, 0x43, 0x4d, 0x33, 0x85, 0x45, 0xf9, 0x02, 0x7f, 0x50, 0x3c, 0x9f, 0xa8,
    0x51, 0xa3, 0x40, 0x8f, 0x92, 0x9d, 0x38, 0xf5, 0xbc, 0xb6, 0xda, 0x21, 0x10, 0xff, 0xf3, 0xd2,
    0xcd, 0x0c, 0x13, 0xec, 0x5f, 0x97, 0x44, 0x17, 0xc4, 0xa7, 0x7e, 0x3d, 0x64, 0x5d, 0x19, 0x73,
    0x60, 0x81, 0x4f, 0xdc, 0x22, 0x2a, 0x90, 0x88, 0x46, 0xee, 0xb8, 0x14, 0xde, 0x5e, 0x0b, 0xdb,
    0xe0, 0x32, 0x3a, 0x0a, 0x49, 0x06, 0x24, 0x5c, 0xc2, 0xd3, 0xac, 0x62, 0x91, 0x95, 0xe4, 0x79,
    0xe7, 0xc8, 0x37, 0x6d, 0x8d, 0xd5, 0x4e, 0xa9, 0x6c, 0x56, 0xf4, 0xea, 0x65, 0x7a, 0xae, 0x08,
    0xba, 0x78, 0x25, 0x2e, 0x1c, 0xa6, 0xb4, 0xc6, 0xe8, 0xdd, 0x74, 0x1f, 0x4b, 0xbd, 0x8b, 0x8a,
    0x70, 0x3e, 0xb5, 0x66, 0x48, 0x03, 0xf6, 0x0e, 0x61, 0x35, 0x57, 0xb9, 0x86, 0xc1, 0x1d, 0x9e,
    0xe1, 0xf8, 0x98, 0x11, 0x69, 0xd9, 0x8e, 0x94, 0x9b, 0x1e, 0x87, 0xe9, 0xce, 0x55, 0x28, 0xdf,
    0x8c, 0xa1, 0x89, 0x0d, 0xbf, 0xe6, 0x42, 0x68, 0x41, 0x99, 0x2d, 0x0f, 0xb0, 0x54, 0xbb, 0x16,
];

/// Round constants; index `i` is used for word `8 * i` of the schedule.
const RCON: [u8; 8] = [0x00, 0x01, 0x02, 0x04, 0x08, 0x10, 0x20, 0x40];

/// The AES-256 key expansion over 60 words.
pub(crate) fn expand_key(key: &[u8; KEY_SIZE]) -> ExpandedKey {
    let mut words = [[0u8; 4]; 4 * (ROUNDS + 1)];
    for (word, chunk) in words.iter_mut().zip(key.chunks_exact(4)) {
        word.copy_from_slice(chunk);
    }

    for i in KEY_WORDS..words.len() {
        let mut temp = words[i - 1];
        if i % KEY_WORDS == 0 {
            temp.rotate_left(1);
            sub_word(&mut temp);
            temp[0] ^= RCON[i / KEY_WORDS];
        } else if i % KEY_WORDS == 4 {
            sub_word(&mut temp);
        }
        for j in 0..4 {
            words[i][j] = words[i - KEY_WORDS][j] ^ temp[j];
        }
    }

    let mut expanded = ExpandedKey::zeroed();
    for (i, word) in words.iter().enumerate() {
        let start = (i % 4) * 4;
        expanded.0[i / 4][start..start + 4].copy_from_slice(word);
    }
    words.zeroize();
    expanded
}

#[inline(always)]
fn sub_word(word: &mut [u8; 4]) {
    for b in word.iter_mut() {
        *b = SBOX[*b as usize];
    }
}

#[inline(always)]
pub(crate) fn add_round_key(state: &mut Block, round_key: &Block) {
    for (s, k) in state.iter_mut().zip(round_key.iter()) {
        *s ^= k;
    }
}

#[inline(always)]
pub(crate) fn sub_bytes(state: &mut Block) {
    for b in state.iter_mut() {
        *b = SBOX[*b as usize];
    }
}

/// Row `r` rotates left by `r` columns.
#[inline(always)]
pub(crate) fn shift_rows(state: &mut Block) {
    let old = *state;
    for column in 0..4 {
        for row in 1..4 {
            state[4 * column + row] = old[4 * ((column + row) % 4) + row];
        }
    }
}

#[inline(always)]
fn xtime(b: u8) -> u8 {
    (b << 1) ^ ((b >> 7) * 0x1b)
}

#[inline(always)]
pub(crate) fn mix_columns(state: &mut Block) {
    for column in state.chunks_exact_mut(4) {
        let [a0, a1, a2, a3] = [column[0], column[1], column[2], column[3]];
        let all = a0 ^ a1 ^ a2 ^ a3;
        column[0] = a0 ^ all ^ xtime(a0 ^ a1);
        column[1] = a1 ^ all ^ xtime(a1 ^ a2);
        column[2] = a2 ^ all ^ xtime(a2 ^ a3);
        column[3] = a3 ^ all ^ xtime(a3 ^ a0);
    }
}

/// Full 14-round forward cipher, in place.
#[inline]
pub(crate) fn encrypt_block(key: &ExpandedKey, state: &mut Block) {
    add_round_key(state, &key.0[0]);
    for round in 1..ROUNDS {
        sub_bytes(state);
        shift_rows(state);
        mix_columns(state);
        add_round_key(state, &key.0[round]);
    }
    sub_bytes(state);
    shift_rows(state);
    add_round_key(state, &key.0[ROUNDS]);
}

/// `dst = src ^ keystream`, over `src.len()` bytes.
#[inline(always)]
pub(crate) fn xor_into(dst: &mut [u8], src: &[u8], keystream: &[u8]) {
    debug_assert!(dst.len() == src.len() && src.len() <= keystream.len());
    for ((d, s), k) in dst.iter_mut().zip(src.iter()).zip(keystream.iter()) {
        *d = s ^ k;
    }
}
