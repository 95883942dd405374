//! Authenticated box cipher (`alg = box`): a NaCl-compatible sealed message
//! using XSalsa20-Poly1305, matching libsodium's `crypto_box`. `nonce`
//! carries the 24-byte nonce generated at encryption time.

use crypto_box::aead::{Aead, AeadCore, OsRng};
use crypto_box::{PublicKey, SalsaBox, SecretKey};
use custodian_core::CoreError;

use super::{Decrypt, Encrypt};

/// Encrypts under a box keyed by the recipient's public key and the
/// sender's secret key.
pub struct BoxEncrypt {
    sealer: SalsaBox,
}

impl BoxEncrypt {
    /// Creates an encrypter for the (sender secret key, recipient public
    /// key) pair.
    #[must_use]
    pub fn new(sender_secret_key: &SecretKey, recipient_public_key: &PublicKey) -> Self {
        Self { sealer: SalsaBox::new(recipient_public_key, sender_secret_key) }
    }
}

impl Encrypt for BoxEncrypt {
    fn encrypt(&self, plaintext: &[u8]) -> Result<(Vec<u8>, Vec<u8>), CoreError> {
        let nonce = SalsaBox::generate_nonce(&mut OsRng);
        let ciphertext = self
            .sealer
            .encrypt(&nonce, plaintext)
            .map_err(|err| CoreError::Decryption(format!("box encrypt failed: {err}")))?;
        Ok((ciphertext, nonce.to_vec()))
    }
}

/// Decrypts a box sealed by the sender's secret key for this recipient.
pub struct BoxDecrypt {
    opener: SalsaBox,
}

impl BoxDecrypt {
    /// Creates a decrypter for the (recipient secret key, sender public
    /// key) pair.
    #[must_use]
    pub fn new(recipient_secret_key: &SecretKey, sender_public_key: &PublicKey) -> Self {
        Self { opener: SalsaBox::new(sender_public_key, recipient_secret_key) }
    }
}

impl Decrypt for BoxDecrypt {
    fn decrypt(&self, data: &[u8], nonce: &[u8]) -> Result<Vec<u8>, CoreError> {
        if nonce.len() != 24 {
            return Err(CoreError::Decryption(format!("box nonce must be 24 bytes, got {}", nonce.len())));
        }
        let nonce = crypto_box::Nonce::from_slice(nonce);
        self.opener
            .decrypt(nonce, data)
            .map_err(|err| CoreError::Decryption(format!("box decrypt failed: {err}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn generate_keypair() -> (SecretKey, PublicKey) {
        let secret = SecretKey::generate(&mut OsRng);
        let public = secret.public_key();
        (secret, public)
    }

    #[test]
    fn round_trips_arbitrary_length_messages() {
        let (alice_secret, alice_public) = generate_keypair();
        let (bob_secret, bob_public) = generate_keypair();

        let encrypter = BoxEncrypt::new(&alice_secret, &bob_public);
        let decrypter = BoxDecrypt::new(&bob_secret, &alice_public);

        for message in [b"".as_slice(), b"short", &[7u8; 4096]] {
            let (data, nonce) = encrypter.encrypt(message).unwrap();
            assert_eq!(nonce.len(), 24);
            assert_eq!(decrypter.decrypt(&data, &nonce).unwrap(), message);
        }
    }

    #[test]
    fn mismatched_nonce_fails_decryption() {
        let (alice_secret, alice_public) = generate_keypair();
        let (bob_secret, bob_public) = generate_keypair();

        let encrypter = BoxEncrypt::new(&alice_secret, &bob_public);
        let decrypter = BoxDecrypt::new(&bob_secret, &alice_public);

        let (data, mut nonce) = encrypter.encrypt(b"hello").unwrap();
        nonce[0] ^= 0xFF;
        assert!(decrypter.decrypt(&data, &nonce).is_err());
    }
}
