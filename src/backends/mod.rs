//! Interchangeable block-cipher backends.
//!
//! Every backend implements [`BlockCipher`] and must produce byte-identical
//! output for identical `(key, block)` input.

use core::fmt;
use core::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::{Block, Counter, ExpandedKey, Key};

pub(crate) mod delegated;
pub(crate) mod simd;
pub(crate) mod soft;

pub use delegated::{CipherDevice, Delegated, DeviceQueue};
pub use simd::Vector;
pub use soft::Software;

/// Which [`BlockCipher`] implementation services an engine.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Portable byte-oriented Rijndael.
    #[default]
    Software,
    /// AES instructions (AES-NI or ARMv8 crypto extensions).
    Vector,
    /// Whole batches handed to an external device queue.
    Delegated,
}

impl BackendKind {
    pub const ALL: [BackendKind; 3] = [
        BackendKind::Software,
        BackendKind::Vector,
        BackendKind::Delegated,
    ];

    /// Fastest backend the running CPU supports without an external device.
    pub fn best_available() -> Self {
        if simd::probe().is_ok() {
            BackendKind::Vector
        } else {
            BackendKind::Software
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Software => "software",
            BackendKind::Vector => "vector",
            BackendKind::Delegated => "delegated",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "software" | "soft" => Ok(BackendKind::Software),
            "vector" | "simd" | "intrinsics" => Ok(BackendKind::Vector),
            "delegated" | "gpu" | "device" => Ok(BackendKind::Delegated),
            other => Err(Error::invalid(format!("unknown backend `{other}`"))),
        }
    }
}

/// Single-block AES-256 encryption plus a batched keystream path.
///
/// Implementations are stateless apart from their configuration, so one
/// instance may serve many streams from many threads.
pub trait BlockCipher: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// Expands `key` into this backend's round keys. Pure; the result may be
    /// cached for as long as the key is unchanged.
    fn expand_key(&self, key: &Key) -> ExpandedKey;

    /// Encrypts one block in place.
    fn encrypt_block(&self, key: &ExpandedKey, block: &mut Block) -> Result<()>;

    /// Encrypts independent blocks in place. Backends override this to share
    /// round-key loads and pipeline rounds across blocks.
    fn encrypt_blocks(&self, key: &ExpandedKey, blocks: &mut [Block]) -> Result<()> {
        for block in blocks.iter_mut() {
            self.encrypt_block(key, block)?;
        }
        Ok(())
    }

    /// Fills `out` with the keystream for `out.len()` consecutive counter
    /// values starting at `start`. `start` itself is not advanced.
    ///
    /// Equivalent to one [`encrypt_block`](Self::encrypt_block) per counter
    /// value; fails with [`Error::Overflow`] instead of wrapping.
    fn keystream(&self, key: &ExpandedKey, start: &Counter, out: &mut [Block]) -> Result<()> {
        let Some((first, rest)) = out.split_first_mut() else {
            return Ok(());
        };
        let mut counter = *start;
        *first = counter.to_block();
        for block in rest.iter_mut() {
            counter.increment(1)?;
            *block = counter.to_block();
        }
        self.encrypt_blocks(key, out)
    }
}

/// Builds the backend for `kind`, probing for the hardware it needs.
///
/// [`BackendKind::Delegated`] gets the stock [`CipherDevice`]; use
/// [`Delegated::new`] to plug in another device.
pub fn select(kind: BackendKind) -> Result<Arc<dyn BlockCipher>> {
    match kind {
        BackendKind::Software => Ok(Arc::new(Software)),
        BackendKind::Vector => Ok(Arc::new(Vector::new()?)),
        BackendKind::Delegated => Ok(Arc::new(Delegated::new(Arc::new(CipherDevice))?)),
    }
}
