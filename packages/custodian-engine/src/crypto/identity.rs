//! Identity cipher (`alg = none`): ciphertext equals plaintext, nonce is
//! always empty. The degenerate case of the envelope, used for records that
//! are not encrypted at all.

use custodian_core::CoreError;

use super::{Decrypt, Encrypt};

/// No-op cipher: `encrypt`/`decrypt` are both the identity function.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityCipher;

impl Encrypt for IdentityCipher {
    fn encrypt(&self, plaintext: &[u8]) -> Result<(Vec<u8>, Vec<u8>), CoreError> {
        Ok((plaintext.to_vec(), Vec::new()))
    }
}

impl Decrypt for IdentityCipher {
    fn decrypt(&self, data: &[u8], _nonce: &[u8]) -> Result<Vec<u8>, CoreError> {
        Ok(data.to_vec())
    }
}
