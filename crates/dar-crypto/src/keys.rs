//! P-256 key material parsing and generation.
//!
//! Verification keys travel in provider configuration documents as base64
//! SubjectPublicKeyInfo. Signing keys are configured locally as base64 DER,
//! either SEC1 (`openssl ecparam -genkey`) or PKCS#8.

use base64ct::{Base64, Encoding};
use p256::ecdsa::{SigningKey, VerifyingKey};
use p256::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePublicKey};
use p256::{PublicKey, SecretKey};
use zeroize::Zeroizing;

use crate::error::CryptoError;

/// Parse a base64 SubjectPublicKeyInfo string into a verifying key.
pub fn parse_public_key(public_key: &str) -> Result<VerifyingKey, CryptoError> {
    let der = Base64::decode_vec(public_key)
        .map_err(|e| CryptoError::InvalidPublicKey(e.to_string()))?;
    let key =
        PublicKey::from_public_key_der(&der).map_err(|e| CryptoError::InvalidPublicKey(e.to_string()))?;
    Ok(VerifyingKey::from(key))
}

/// Parse a base64 DER private key (SEC1 or PKCS#8) into a signing key.
pub fn parse_private_key(private_key: &str) -> Result<SigningKey, CryptoError> {
    let der = Zeroizing::new(
        Base64::decode_vec(private_key).map_err(|e| CryptoError::InvalidPrivateKey(e.to_string()))?,
    );
    let secret = SecretKey::from_sec1_der(&der)
        .or_else(|_| SecretKey::from_pkcs8_der(&der))
        .map_err(|e| CryptoError::InvalidPrivateKey(e.to_string()))?;
    Ok(SigningKey::from(secret))
}

/// A freshly generated P-256 key pair in the formats the protocol consumes.
pub struct GeneratedKeyPair {
    /// Base64 SEC1 DER private key, for local signing configuration.
    pub private_key: String,
    /// Base64 SubjectPublicKeyInfo, for publication as an unseal key.
    pub public_key: String,
}

/// Generate a P-256 key pair for provider provisioning (and tests).
pub fn generate_keypair() -> Result<GeneratedKeyPair, CryptoError> {
    let secret = random_secret_key();
    let private_der = secret
        .to_sec1_der()
        .map_err(|e| CryptoError::InvalidPrivateKey(e.to_string()))?;
    let public_der = secret
        .public_key()
        .to_public_key_der()
        .map_err(|e| CryptoError::InvalidPublicKey(e.to_string()))?;

    Ok(GeneratedKeyPair {
        private_key: Base64::encode_string(&private_der),
        public_key: Base64::encode_string(public_der.as_bytes()),
    })
}

fn random_secret_key() -> SecretKey {
    // Rejection-sample until the bytes land inside the curve order.
    loop {
        let mut bytes = [0u8; 32];
        getrandom::getrandom(&mut bytes).expect("getrandom failed");
        if let Ok(secret) = SecretKey::from_slice(&bytes) {
            return secret;
        }
    }
}
