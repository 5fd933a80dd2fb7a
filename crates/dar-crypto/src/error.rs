use dar_codec::SerializationError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("invalid public key format, the key must be base64 SubjectPublicKeyInfo: {0}")]
    InvalidPublicKey(String),

    #[error("invalid private key format, the key must be base64 DER: {0}")]
    InvalidPrivateKey(String),

    /// Sealing was attempted on a provider with no signing key configured.
    /// This is a setup mistake, not a runtime condition to recover from.
    #[error("signing private key must be set")]
    SigningKeyMissing,

    /// Payload encryption was attempted with no symmetric key configured.
    #[error("symmetric encryption key must be set")]
    SymmetricKeyMissing,

    #[error("signing failed: {0}")]
    SigningFailed(String),

    #[error("signature did not verify under any configured unseal key")]
    InvalidSignature,

    #[error("invalid symmetric key length: expected {expected} bytes, got {got}")]
    InvalidKeyLength { expected: usize, got: usize },

    #[error("encryption failed: {0}")]
    EncryptionFailed(String),

    // Deliberately carries no cause: bad tag, bad key and truncated
    // ciphertext must be indistinguishable to callers.
    #[error("unable to decrypt data")]
    DecryptionFailed,

    #[error("unsupported encrypted data version: {0}")]
    UnsupportedEnvelopeVersion(u8),

    #[error(transparent)]
    Serialization(#[from] SerializationError),
}
