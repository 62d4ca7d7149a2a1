//! AES-256 in counter mode for tag-interleaved streams.
//!
//! The crate encrypts and decrypts byte streams in which fixed-size chunks
//! of ciphertext are separated by integrity tags it never touches. Three
//! backends produce identical output:
//!
//! - [`Software`](backends::Software): portable table-driven Rijndael.
//! - [`Vector`](backends::Vector): AES-NI or ARMv8 crypto instructions,
//!   eight blocks in flight.
//! - [`Delegated`](backends::Delegated): batches handed to a
//!   [`DeviceQueue`](backends::DeviceQueue).
//!
//! ```
//! use aesctr_engine::{BackendKind, ChunkGeometry, Counter, Engine, EngineConfig, Key};
//!
//! let engine = Engine::new(EngineConfig::with_backend(BackendKind::Software))?;
//! let key = engine.expand_key(&Key::new([7u8; 32]));
//! let geometry = ChunkGeometry::chunked(64, 16);
//!
//! let plaintext = b"attack at dawn";
//! let mut sealed = vec![0u8; geometry.physical_len(plaintext.len())];
//! let mut counter = Counter::new([1, 2, 3, 4, 5, 6, 7, 8]);
//! engine.encrypt(&key, &mut counter, &geometry, plaintext, &mut sealed, plaintext.len())?;
//!
//! let mut opened = vec![0u8; plaintext.len()];
//! let mut counter = Counter::new([1, 2, 3, 4, 5, 6, 7, 8]);
//! let n = engine.decrypt(&key, &mut counter, &geometry, &sealed, plaintext.len(), &mut opened, plaintext.len())?;
//! assert_eq!(&opened[..n], plaintext);
//! # Ok::<(), aesctr_engine::Error>(())
//! ```

pub use cipher; // Re-export cipher crate for downstream users

use cfg_if::cfg_if;

cfg_if! {
    if #[cfg(aesctr_force_soft)] {
        pub(crate) type Tokens = ();
    } else if #[cfg(any(target_arch = "x86", target_arch = "x86_64"))] {
        cpufeatures::new!(aes_cpuid, "aes", "sse2");
        pub(crate) type Tokens = aes_cpuid::InitToken;
    } else if #[cfg(target_arch = "aarch64")] {
        cpufeatures::new!(aes_cpuid, "aes");
        pub(crate) type Tokens = aes_cpuid::InitToken;
    } else {
        pub(crate) type Tokens = ();
    }
}

pub mod backends;
mod core;
mod counter;
mod engine;
mod error;
mod key;
mod rijndael;
pub mod transform;

// --- Constants ---
pub const BLOCK_SIZE: usize = 16;
pub const KEY_SIZE: usize = 32;
/// Bytes of the counter block that identify the stream and never change.
pub const NONCE_SIZE: usize = 8;
pub const ROUNDS: usize = 14;
pub const EXPANDED_KEY_SIZE: usize = BLOCK_SIZE * (ROUNDS + 1);
/// Upper bound on keystream blocks computed per backend call.
pub const MAX_BATCH_BLOCKS: usize = 64;

pub type Block = [u8; BLOCK_SIZE];

pub use crate::backends::{BackendKind, BlockCipher};
pub use crate::core::Aes256CtrCore;
pub use crate::counter::{BLOCK_INDEX_SIZE, Counter};
pub use crate::engine::{DEFAULT_BATCH_BLOCKS, Engine, EngineConfig};
pub use crate::error::{Error, Result};
pub use crate::key::{ExpandedKey, Key};
pub use crate::transform::{ChunkGeometry, StreamTransform};

/// AES-256 CTR for the `cipher` traits; the IV is the initial counter block.
pub type Aes256Ctr = cipher::StreamCipherCoreWrapper<Aes256CtrCore>;
