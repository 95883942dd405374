//! Encryption envelope: the `Encrypt`/`Decrypt` capability pair the storage
//! layer consumes, plus a decrypter registry keyed by `(alg, kid)`.
//!
//! Trait-only contracts plus a `DashMap`-backed registry keyed by a tuple,
//! so a new algorithm/key-id pair registers without touching dispatch code.

pub mod identity;
pub mod keys;
pub mod nacl_box;
pub mod rsa_cipher;

use dashmap::DashMap;
use custodian_core::AlgTag;
use std::sync::Arc;

/// Encrypts plaintext into the `(data, nonce)` pair stored on a [`custodian_core::Record`].
pub trait Encrypt: Send + Sync {
    /// Encrypts `plaintext`, returning `(data, nonce)`.
    ///
    /// # Errors
    ///
    /// Returns [`custodian_core::CoreError::Decryption`] if the message
    /// cannot be encrypted under this key (e.g. too long for RSA-OAEP).
    fn encrypt(&self, plaintext: &[u8]) -> Result<(Vec<u8>, Vec<u8>), custodian_core::CoreError>;
}

/// Decrypts the `(data, nonce)` pair stored on a [`custodian_core::Record`]
/// back into plaintext.
pub trait Decrypt: Send + Sync {
    /// Decrypts `data`/`nonce` back into the original plaintext.
    ///
    /// # Errors
    ///
    /// Returns [`custodian_core::CoreError::Decryption`] if ciphertext or
    /// signature validation fails.
    fn decrypt(&self, data: &[u8], nonce: &[u8]) -> Result<Vec<u8>, custodian_core::CoreError>;
}

/// Maps `(alg, kid)` pairs to the `Decrypt` instance readers use to decrypt
/// records produced under rotated keys.
#[derive(Default, Clone)]
pub struct DecrypterRegistry {
    entries: Arc<DashMap<(AlgTag, String), Arc<dyn Decrypt>>>,
}

impl DecrypterRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self { entries: Arc::new(DashMap::new()) }
    }

    /// Registers `decrypter` under `(alg, kid)`, replacing any existing
    /// entry for that pair.
    pub fn register(&self, alg: AlgTag, kid: impl Into<String>, decrypter: Arc<dyn Decrypt>) {
        self.entries.insert((alg, kid.into()), decrypter);
    }

    /// Looks up the decrypter registered for `(alg, kid)`. Returns `None`
    /// on a miss; the caller converts that into a
    /// [`custodian_core::CoreError::Decryption`].
    #[must_use]
    pub fn get(&self, alg: AlgTag, kid: &str) -> Option<Arc<dyn Decrypt>> {
        self.entries.get(&(alg, kid.to_string())).map(|entry| entry.value().clone())
    }

    /// Decrypts a record's ciphertext, looking up the decrypter by
    /// `(alg, kid)`.
    ///
    /// # Errors
    ///
    /// Returns [`custodian_core::CoreError::Decryption`] if no decrypter is
    /// registered for `(alg, kid)`, or if decryption itself fails.
    pub fn decrypt_record(&self, record: &custodian_core::Record) -> Result<Vec<u8>, custodian_core::CoreError> {
        let decrypter = self
            .get(record.alg, &record.kid)
            .ok_or_else(|| custodian_core::CoreError::Decryption(format!("no decrypter registered for ({}, {})", record.alg, record.kid)))?;
        decrypter.decrypt(&record.data, &record.nonce)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::identity::IdentityCipher;

    #[test]
    fn registry_returns_registered_decrypter() {
        let registry = DecrypterRegistry::new();
        registry.register(AlgTag::Box, "coolio", Arc::new(IdentityCipher));
        assert!(registry.get(AlgTag::Box, "coolio").is_some());
    }

    #[test]
    fn registry_miss_returns_none() {
        let registry = DecrypterRegistry::new();
        assert!(registry.get(AlgTag::None, "neato").is_none());
    }
}
