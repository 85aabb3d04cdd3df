//! No-op [`super::Cipher`]: data passes through unchanged. Used by tests and
//! by deployments that terminate encryption below the core (e.g. inside an
//! already-encrypted transport).

use super::Cipher;
use crate::error::Result;

#[derive(Debug, Default, Clone, Copy)]
pub struct PlainCipher;

impl PlainCipher {
    pub fn new() -> Self {
        PlainCipher
    }
}

impl Cipher for PlainCipher {
    fn encrypt(&self, _data: &mut Vec<u8>) -> Result<()> {
        Ok(())
    }

    fn decrypt(&self, _data: &mut Vec<u8>) -> Result<()> {
        Ok(())
    }
}
