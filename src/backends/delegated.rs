//! Offload backend: batches of counter blocks are handed to a device queue.

use std::sync::{Arc, Mutex};

use aes::Aes256;
use aes::cipher::{BlockEncrypt, KeyInit, generic_array::GenericArray};

use crate::rijndael;
use crate::backends::{BackendKind, BlockCipher};
use crate::error::{Error, Result};
use crate::{Block, ExpandedKey, Key};

/// An execution queue that encrypts whole batches of blocks.
///
/// `run` is synchronous from the caller's point of view: enqueue, wait for
/// completion, then return. It may block for a long time.
pub trait DeviceQueue: Send + Sync {
    fn name(&self) -> &str;

    /// Checked once when the backend is built.
    fn probe(&self) -> Result<()> {
        Ok(())
    }

    /// Encrypts `blocks` in place under `key`.
    fn run(&self, key: &ExpandedKey, blocks: &mut [Block]) -> Result<()>;
}

/// The stock device: the RustCrypto `aes` crate, which picks its own
/// hardware path at runtime.
#[derive(Clone, Copy, Debug, Default)]
pub struct CipherDevice;

impl DeviceQueue for CipherDevice {
    fn name(&self) -> &str {
        "rustcrypto-aes"
    }

    fn run(&self, key: &ExpandedKey, blocks: &mut [Block]) -> Result<()> {
        let cipher_key = key.cipher_key();
        let cipher = Aes256::new(GenericArray::from_slice(&cipher_key[..]));
        for block in blocks.iter_mut() {
            cipher.encrypt_block(GenericArray::from_mut_slice(&mut block[..]));
        }
        Ok(())
    }
}

/// The delegated backend.
///
/// Key expansion is the portable schedule; block work goes to the device.
/// A device context is never entered by two calls at once.
pub struct Delegated {
    device: Arc<dyn DeviceQueue>,
    context: Mutex<()>,
}

impl Delegated {
    pub fn new(device: Arc<dyn DeviceQueue>) -> Result<Self> {
        device.probe().map_err(|e| {
            tracing::debug!(device = device.name(), error = %e, "device probe failed");
            Error::BackendUnavailable {
                backend: BackendKind::Delegated,
                reason: "device probe failed",
            }
        })?;
        Ok(Self {
            device,
            context: Mutex::new(()),
        })
    }

    pub fn device_name(&self) -> &str {
        self.device.name()
    }
}

impl core::fmt::Debug for Delegated {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Delegated")
            .field("device", &self.device.name())
            .finish()
    }
}

impl BlockCipher for Delegated {
    fn kind(&self) -> BackendKind {
        BackendKind::Delegated
    }

    fn expand_key(&self, key: &Key) -> ExpandedKey {
        rijndael::expand_key(key.as_bytes())
    }

    fn encrypt_block(&self, key: &ExpandedKey, block: &mut Block) -> Result<()> {
        self.encrypt_blocks(key, core::slice::from_mut(block))
    }

    fn encrypt_blocks(&self, key: &ExpandedKey, blocks: &mut [Block]) -> Result<()> {
        if blocks.is_empty() {
            return Ok(());
        }
        let _guard = self
            .context
            .lock()
            .map_err(|_| Error::Device("device context poisoned".into()))?;
        self.device.run(key, blocks)
    }
}
