use crate::rijndael;
use crate::backends::{BackendKind, BlockCipher};
use crate::error::Result;
use crate::{Block, ExpandedKey, Key};

/// The software backend: plain Rijndael arithmetic, available everywhere.
#[derive(Clone, Copy, Debug, Default)]
pub struct Software;

impl BlockCipher for Software {
    fn kind(&self) -> BackendKind {
        BackendKind::Software
    }

    fn expand_key(&self, key: &Key) -> ExpandedKey {
        rijndael::expand_key(key.as_bytes())
    }

    #[inline]
    fn encrypt_block(&self, key: &ExpandedKey, block: &mut Block) -> Result<()> {
        rijndael::encrypt_block(key, block);
        Ok(())
    }
}
