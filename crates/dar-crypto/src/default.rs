//! The default crypto engine: ECDSA P-256 / SHA-256 signatures and
//! AES-256-GCM opaque-payload envelopes.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use p256::ecdsa::signature::{Signer, Verifier};
use p256::ecdsa::Signature;
use serde_json::Value;

use dar_codec::{EncryptedData, AUTH_TAG_LENGTH, IV_LENGTH};

use crate::engine::Encryptor;
use crate::error::CryptoError;
use crate::keys;

const AES_KEY_LENGTH: usize = 32;
const ENVELOPE_VERSION: u8 = 0;

/// Generate a random 12-byte IV for AES-GCM.
fn generate_iv() -> [u8; IV_LENGTH] {
    let mut iv = [0u8; IV_LENGTH];
    getrandom::getrandom(&mut iv).expect("getrandom failed");
    iv
}

/// The engine used when no override is installed.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultEncryptor;

impl Encryptor for DefaultEncryptor {
    fn sign(
        &self,
        payload: &[u8],
        private_key: &str,
        _context: Option<&Value>,
    ) -> Result<Vec<u8>, CryptoError> {
        let signing_key = keys::parse_private_key(private_key)?;
        let signature: Signature = signing_key
            .try_sign(payload)
            .map_err(|e| CryptoError::SigningFailed(e.to_string()))?;
        Ok(signature.to_der().as_bytes().to_vec())
    }

    fn verify(
        &self,
        payload: &[u8],
        signature: &[u8],
        public_key: &str,
        _context: Option<&Value>,
    ) -> Result<bool, CryptoError> {
        let verifying_key = keys::parse_public_key(public_key)?;
        let Ok(signature) = Signature::from_der(signature) else {
            return Ok(false);
        };
        Ok(verifying_key.verify(payload, &signature).is_ok())
    }

    fn encrypt(
        &self,
        plaintext: &[u8],
        key: &[u8],
        _context: Option<&Value>,
    ) -> Result<Vec<u8>, CryptoError> {
        let cipher = new_cipher(key)?;
        let iv = generate_iv();
        let mut ciphertext = cipher
            .encrypt(Nonce::from_slice(&iv), plaintext)
            .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;

        // aes-gcm appends the tag; the envelope carries it as its own field.
        let tag_start = ciphertext.len() - AUTH_TAG_LENGTH;
        let mut auth_tag = [0u8; AUTH_TAG_LENGTH];
        auth_tag.copy_from_slice(&ciphertext[tag_start..]);
        ciphertext.truncate(tag_start);

        let envelope = EncryptedData {
            version: ENVELOPE_VERSION,
            auth_tag,
            iv,
            ciphertext,
        };
        Ok(envelope.to_bytes())
    }

    fn decrypt(
        &self,
        envelope: &[u8],
        key: &[u8],
        _context: Option<&Value>,
    ) -> Result<Vec<u8>, CryptoError> {
        let record = EncryptedData::parse(envelope)?;
        if record.version != ENVELOPE_VERSION {
            return Err(CryptoError::UnsupportedEnvelopeVersion(record.version));
        }

        let cipher = new_cipher(key)?;
        let mut combined = record.ciphertext;
        combined.extend_from_slice(&record.auth_tag);
        cipher
            .decrypt(Nonce::from_slice(&record.iv), combined.as_ref())
            .map_err(|_| CryptoError::DecryptionFailed)
    }
}

fn new_cipher(key: &[u8]) -> Result<Aes256Gcm, CryptoError> {
    if key.len() != AES_KEY_LENGTH {
        return Err(CryptoError::InvalidKeyLength {
            expected: AES_KEY_LENGTH,
            got: key.len(),
        });
    }
    Aes256Gcm::new_from_slice(key).map_err(|e| CryptoError::EncryptionFailed(e.to_string()))
}
