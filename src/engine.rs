//! The engine: one backend, its configuration, and the encrypt/decrypt entry
//! points over caller-owned counters.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::backends::{self, BackendKind, BlockCipher, Delegated, DeviceQueue};
use crate::error::{Error, Result};
use crate::transform::{ChunkGeometry, StreamTransform};
use crate::{Counter, ExpandedKey, Key, MAX_BATCH_BLOCKS};

/// Keystream blocks computed per backend call unless configured otherwise.
pub const DEFAULT_BATCH_BLOCKS: usize = 8;

/// How an [`Engine`] is built.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub backend: BackendKind,
    /// Keystream blocks per backend call, `1..=64`.
    pub batch_blocks: usize,
    /// Emit a `debug` event with timing for every encrypt/decrypt call.
    pub log_details: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::best_available(),
            batch_blocks: DEFAULT_BATCH_BLOCKS,
            log_details: false,
        }
    }
}

impl EngineConfig {
    pub fn with_backend(backend: BackendKind) -> Self {
        Self {
            backend,
            ..Self::default()
        }
    }

    /// Defaults overridden by `AESCTR_BACKEND`, `AESCTR_BATCH_BLOCKS` and
    /// `AESCTR_LOG_DETAILS`.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        if let Ok(backend) = std::env::var("AESCTR_BACKEND") {
            config.backend = backend.parse()?;
        }
        if let Ok(batch) = std::env::var("AESCTR_BATCH_BLOCKS") {
            config.batch_blocks = batch
                .trim()
                .parse()
                .map_err(|_| Error::invalid(format!("AESCTR_BATCH_BLOCKS=`{batch}` is not a number")))?;
        }
        if let Ok(flag) = std::env::var("AESCTR_LOG_DETAILS") {
            config.log_details = matches!(flag.trim(), "1" | "true" | "yes" | "on");
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !(1..=MAX_BATCH_BLOCKS).contains(&self.batch_blocks) {
            return Err(Error::invalid(format!(
                "batch_blocks must be in 1..={MAX_BATCH_BLOCKS}, got {}",
                self.batch_blocks
            )));
        }
        Ok(())
    }
}

/// An AES-256 CTR engine bound to one backend.
///
/// Cheap to clone and safe to share: all per-stream state lives in the
/// caller's [`Counter`] and [`ExpandedKey`].
#[derive(Clone)]
pub struct Engine {
    cipher: Arc<dyn BlockCipher>,
    config: EngineConfig,
}

impl Engine {
    /// Builds the backend named by `config`, failing with
    /// [`Error::BackendUnavailable`] if the hardware is missing.
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let cipher = backends::select(config.backend).inspect_err(|e| {
            tracing::debug!(backend = %config.backend, error = %e, "backend probe failed");
        })?;
        tracing::debug!(
            backend = %config.backend,
            batch_blocks = config.batch_blocks,
            "engine ready"
        );
        Ok(Self { cipher, config })
    }

    /// Engine on the fastest backend available without a device.
    pub fn best_available() -> Result<Self> {
        Self::new(EngineConfig::default())
    }

    /// Delegated engine on a caller-supplied device queue.
    pub fn with_device(device: Arc<dyn DeviceQueue>, mut config: EngineConfig) -> Result<Self> {
        config.backend = BackendKind::Delegated;
        config.validate()?;
        let delegated = Delegated::new(device)?;
        tracing::debug!(device = delegated.device_name(), "engine ready on device");
        Ok(Self {
            cipher: Arc::new(delegated),
            config,
        })
    }

    pub fn backend(&self) -> BackendKind {
        self.cipher.kind()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn cipher(&self) -> &dyn BlockCipher {
        self.cipher.as_ref()
    }

    pub fn expand_key(&self, key: &Key) -> ExpandedKey {
        self.cipher.expand_key(key)
    }

    pub fn expand_key_bytes(&self, key: &[u8]) -> Result<ExpandedKey> {
        Key::from_slice(key).map(|key| self.expand_key(&key))
    }

    /// The transform for one expanded key, configured like this engine.
    pub fn transform<'a>(&'a self, key: &'a ExpandedKey) -> StreamTransform<'a> {
        StreamTransform::new(self.cipher.as_ref(), key)
            .with_batch_blocks(self.config.batch_blocks)
            .with_log_details(self.config.log_details)
    }

    /// See [`StreamTransform::encrypt`].
    pub fn encrypt(
        &self,
        key: &ExpandedKey,
        counter: &mut Counter,
        geometry: &ChunkGeometry,
        src: &[u8],
        dest: &mut [u8],
        count: usize,
    ) -> Result<usize> {
        self.transform(key).encrypt(counter, geometry, src, dest, count)
    }

    /// See [`StreamTransform::decrypt`].
    #[allow(clippy::too_many_arguments)]
    pub fn decrypt(
        &self,
        key: &ExpandedKey,
        counter: &mut Counter,
        geometry: &ChunkGeometry,
        src: &[u8],
        bytes_available: usize,
        dest: &mut [u8],
        count: usize,
    ) -> Result<usize> {
        self.transform(key)
            .decrypt(counter, geometry, src, bytes_available, dest, count)
    }

    /// See [`StreamTransform::decrypt_exact`].
    pub fn decrypt_exact(
        &self,
        key: &ExpandedKey,
        counter: &mut Counter,
        geometry: &ChunkGeometry,
        src: &[u8],
        dest: &mut [u8],
        count: usize,
    ) -> Result<usize> {
        self.transform(key)
            .decrypt_exact(counter, geometry, src, dest, count)
    }

    /// See [`StreamTransform::apply_keystream`].
    pub fn apply_keystream(
        &self,
        key: &ExpandedKey,
        counter: &mut Counter,
        src: &[u8],
        dest: &mut [u8],
    ) -> Result<usize> {
        self.transform(key).apply_keystream(counter, src, dest)
    }
}

impl core::fmt::Debug for Engine {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Engine")
            .field("backend", &self.cipher.kind())
            .field("config", &self.config)
            .finish()
    }
}
