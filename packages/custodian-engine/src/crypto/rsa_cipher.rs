//! RSA family cipher (`alg = rsa-sym` / `rsa-asy`): RSA-OAEP ciphertext
//! under a chosen hash, with an optional PSS signature carried in `nonce`
//! for the asymmetric variant.

use blake2::Blake2b512;
use custodian_core::{CoreError, HashTag};
use md5::Md5;
use rsa::pss::{Signature, SigningKey, VerifyingKey};
use rsa::rand_core::OsRng;
use rsa::signature::{RandomizedSigner, SignatureEncoding, Verifier};
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use sha1::Sha1;
use sha2::Sha512;

fn oaep_for(hash: HashTag) -> Oaep {
    match hash {
        HashTag::Blake2b512 => Oaep::new::<Blake2b512>(),
        HashTag::Sha1 => Oaep::new::<Sha1>(),
        HashTag::Sha512 => Oaep::new::<Sha512>(),
        HashTag::Md5 => Oaep::new::<Md5>(),
    }
}

/// Encrypts under RSA-OAEP for the symmetric variant (`rsa-sym`): no
/// signature is produced, `nonce` is always empty.
pub struct RsaSymEncrypt {
    public_key: RsaPublicKey,
    hash: HashTag,
}

impl RsaSymEncrypt {
    /// Creates an encrypter for `public_key` using `hash` as the OAEP
    /// digest.
    #[must_use]
    pub fn new(public_key: RsaPublicKey, hash: HashTag) -> Self {
        Self { public_key, hash }
    }
}

impl super::Encrypt for RsaSymEncrypt {
    fn encrypt(&self, plaintext: &[u8]) -> Result<(Vec<u8>, Vec<u8>), CoreError> {
        let mut rng = OsRng;
        let ciphertext = self
            .public_key
            .encrypt(&mut rng, oaep_for(self.hash), plaintext)
            .map_err(|err| CoreError::Decryption(format!("rsa-oaep encrypt failed: {err}")))?;
        Ok((ciphertext, Vec::new()))
    }
}

/// Decrypts RSA-OAEP ciphertext for the symmetric variant: no signature is
/// verified.
pub struct RsaSymDecrypt {
    private_key: RsaPrivateKey,
    hash: HashTag,
}

impl RsaSymDecrypt {
    /// Creates a decrypter for `private_key` using `hash` as the OAEP
    /// digest.
    #[must_use]
    pub fn new(private_key: RsaPrivateKey, hash: HashTag) -> Self {
        Self { private_key, hash }
    }
}

impl super::Decrypt for RsaSymDecrypt {
    fn decrypt(&self, data: &[u8], _nonce: &[u8]) -> Result<Vec<u8>, CoreError> {
        self.private_key
            .decrypt(oaep_for(self.hash), data)
            .map_err(|err| CoreError::Decryption(format!("rsa-oaep decrypt failed: {err}")))
    }
}

/// Encrypts under RSA-OAEP for the asymmetric variant (`rsa-asy`): also
/// signs the plaintext's digest with the sender's PSS private key, carrying
/// the signature in `nonce`.
pub struct RsaAsyEncrypt {
    public_key: RsaPublicKey,
    signing_key: SigningKey<Sha512>,
    hash: HashTag,
}

impl RsaAsyEncrypt {
    /// Creates an encrypter that encrypts under `public_key` and signs with
    /// `sender_private_key`.
    #[must_use]
    pub fn new(public_key: RsaPublicKey, sender_private_key: RsaPrivateKey, hash: HashTag) -> Self {
        Self { public_key, signing_key: SigningKey::<Sha512>::new(sender_private_key), hash }
    }
}

impl super::Encrypt for RsaAsyEncrypt {
    fn encrypt(&self, plaintext: &[u8]) -> Result<(Vec<u8>, Vec<u8>), CoreError> {
        let mut rng = OsRng;
        let ciphertext = self
            .public_key
            .encrypt(&mut rng, oaep_for(self.hash), plaintext)
            .map_err(|err| CoreError::Decryption(format!("rsa-oaep encrypt failed: {err}")))?;
        let signature = self.signing_key.sign_with_rng(&mut rng, plaintext);
        Ok((ciphertext, signature.to_bytes().to_vec()))
    }
}

/// Decrypts RSA-OAEP ciphertext for the asymmetric variant, verifying the
/// PSS signature carried in `nonce` against the sender's public key.
pub struct RsaAsyDecrypt {
    private_key: RsaPrivateKey,
    verifying_key: VerifyingKey<Sha512>,
    hash: HashTag,
}

impl RsaAsyDecrypt {
    /// Creates a decrypter that decrypts with `private_key` and verifies
    /// signatures against `sender_public_key`.
    #[must_use]
    pub fn new(private_key: RsaPrivateKey, sender_public_key: RsaPublicKey, hash: HashTag) -> Self {
        Self { private_key, verifying_key: VerifyingKey::<Sha512>::new(sender_public_key), hash }
    }
}

impl super::Decrypt for RsaAsyDecrypt {
    fn decrypt(&self, data: &[u8], nonce: &[u8]) -> Result<Vec<u8>, CoreError> {
        let plaintext = self
            .private_key
            .decrypt(oaep_for(self.hash), data)
            .map_err(|err| CoreError::Decryption(format!("rsa-oaep decrypt failed: {err}")))?;
        let signature = Signature::try_from(nonce)
            .map_err(|err| CoreError::Decryption(format!("malformed pss signature: {err}")))?;
        self.verifying_key
            .verify(&plaintext, &signature)
            .map_err(|err| CoreError::Decryption(format!("pss signature verification failed: {err}")))?;
        Ok(plaintext)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_KEY_BITS: usize = 2048;

    fn generate_keypair() -> (RsaPrivateKey, RsaPublicKey) {
        let mut rng = OsRng;
        let private = RsaPrivateKey::new(&mut rng, TEST_KEY_BITS).unwrap();
        let public = RsaPublicKey::from(&private);
        (private, public)
    }

    #[test]
    fn sym_round_trip_ascii_and_utf8() {
        let (private, public) = generate_keypair();
        let encrypter = RsaSymEncrypt::new(public, HashTag::Blake2b512);
        let decrypter = RsaSymDecrypt::new(private, HashTag::Blake2b512);

        for message in ["Hello World", "Hello, 世界"] {
            let (data, nonce) = encrypter.encrypt(message.as_bytes()).unwrap();
            assert_eq!(decrypter.decrypt(&data, &nonce).unwrap(), message.as_bytes());
        }
    }

    #[test]
    fn oversized_message_fails_with_recognizable_error() {
        let (_private, public) = generate_keypair();
        let encrypter = RsaSymEncrypt::new(public, HashTag::Blake2b512);
        let oversized = vec![0u8; TEST_KEY_BITS];
        let err = encrypter.encrypt(&oversized).unwrap_err();
        assert!(matches!(err, CoreError::Decryption(_)));
    }

    #[test]
    fn asy_round_trip_verifies_sender_signature() {
        let (recipient_private, recipient_public) = generate_keypair();
        let (sender_private, sender_public) = generate_keypair();

        let encrypter = RsaAsyEncrypt::new(recipient_public, sender_private, HashTag::Blake2b512);
        let decrypter = RsaAsyDecrypt::new(recipient_private, sender_public, HashTag::Blake2b512);

        let (data, nonce) = encrypter.encrypt(b"Hello World").unwrap();
        assert_eq!(decrypter.decrypt(&data, &nonce).unwrap(), b"Hello World");
    }
}
