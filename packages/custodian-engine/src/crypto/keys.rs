//! PEM key loading with custom labels: RSA keys are PKCS#1-encoded under
//! `RSA PRIVATE KEY`/`RSA PUBLIC KEY`; box keys are raw 32-byte bodies under
//! `BOX PRIVATE KEY`/`BOX PUBLIC KEY`.

use crypto_box::{PublicKey as BoxPublicKey, SecretKey as BoxSecretKey};
use custodian_core::CoreError;
use rsa::pkcs1::{DecodeRsaPrivateKey, DecodeRsaPublicKey};
use rsa::{RsaPrivateKey, RsaPublicKey};

const RSA_PRIVATE_KEY_TAG: &str = "RSA PRIVATE KEY";
const RSA_PUBLIC_KEY_TAG: &str = "RSA PUBLIC KEY";
const BOX_PRIVATE_KEY_TAG: &str = "BOX PRIVATE KEY";
const BOX_PUBLIC_KEY_TAG: &str = "BOX PUBLIC KEY";
const BOX_KEY_LEN: usize = 32;

fn parse_tagged(pem_text: &str, expected_tag: &str) -> Result<Vec<u8>, CoreError> {
    let parsed = pem::parse(pem_text).map_err(|err| CoreError::Config(format!("invalid PEM: {err}")))?;
    if parsed.tag() != expected_tag {
        return Err(CoreError::Config(format!(
            "PEM type mismatch: expected {expected_tag:?}, got {:?}",
            parsed.tag()
        )));
    }
    Ok(parsed.contents().to_vec())
}

/// Parses an RSA private key from a `RSA PRIVATE KEY` PEM block.
///
/// # Errors
///
/// Returns [`CoreError::Config`] if the PEM tag does not match or the body
/// is not valid PKCS#1 DER.
pub fn parse_rsa_private_key(pem_text: &str) -> Result<RsaPrivateKey, CoreError> {
    let der = parse_tagged(pem_text, RSA_PRIVATE_KEY_TAG)?;
    RsaPrivateKey::from_pkcs1_der(&der).map_err(|err| CoreError::Config(format!("invalid RSA private key: {err}")))
}

/// Parses an RSA public key from a `RSA PUBLIC KEY` PEM block.
///
/// # Errors
///
/// Returns [`CoreError::Config`] if the PEM tag does not match or the body
/// is not valid PKCS#1 DER.
pub fn parse_rsa_public_key(pem_text: &str) -> Result<RsaPublicKey, CoreError> {
    let der = parse_tagged(pem_text, RSA_PUBLIC_KEY_TAG)?;
    RsaPublicKey::from_pkcs1_der(&der).map_err(|err| CoreError::Config(format!("invalid RSA public key: {err}")))
}

/// Parses a box secret key from a `BOX PRIVATE KEY` PEM block whose body is
/// exactly 32 bytes.
///
/// # Errors
///
/// Returns [`CoreError::Config`] if the PEM tag does not match or the body
/// is not exactly 32 bytes.
pub fn parse_box_secret_key(pem_text: &str) -> Result<BoxSecretKey, CoreError> {
    let bytes = parse_tagged(pem_text, BOX_PRIVATE_KEY_TAG)?;
    let array: [u8; BOX_KEY_LEN] = bytes
        .try_into()
        .map_err(|bytes: Vec<u8>| CoreError::Config(format!("box private key must be 32 bytes, got {}", bytes.len())))?;
    Ok(BoxSecretKey::from(array))
}

/// Parses a box public key from a `BOX PUBLIC KEY` PEM block whose body is
/// exactly 32 bytes.
///
/// # Errors
///
/// Returns [`CoreError::Config`] if the PEM tag does not match or the body
/// is not exactly 32 bytes.
pub fn parse_box_public_key(pem_text: &str) -> Result<BoxPublicKey, CoreError> {
    let bytes = parse_tagged(pem_text, BOX_PUBLIC_KEY_TAG)?;
    let array: [u8; BOX_KEY_LEN] = bytes
        .try_into()
        .map_err(|bytes: Vec<u8>| CoreError::Config(format!("box public key must be 32 bytes, got {}", bytes.len())))?;
    Ok(BoxPublicKey::from(array))
}
