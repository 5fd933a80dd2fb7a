//! The opaque-data envelope carried in a type-0 recovery token.
//!
//! Wire layout: `[version:1][auth_tag:16][iv:12][ciphertext:rest]`.
//! The ciphertext runs to the end of the record, so unlike a recovery
//! token this record always consumes its entire input.

use crate::error::SerializationError;
use crate::reader::Reader;

/// AES-GCM authentication tag length (128-bit).
pub const AUTH_TAG_LENGTH: usize = 16;

/// AES-GCM initialization vector length (96-bit, NIST recommended minimum).
pub const IV_LENGTH: usize = 12;

/// A decoded encrypted-data envelope.
///
/// Constructed at encryption time from fresh cipher output, or at
/// decryption time by parsing untrusted bytes. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedData {
    pub version: u8,
    pub auth_tag: [u8; AUTH_TAG_LENGTH],
    pub iv: [u8; IV_LENGTH],
    pub ciphertext: Vec<u8>,
}

impl EncryptedData {
    /// Decode an envelope, consuming the whole of `input`.
    ///
    /// Total decoded length always equals the input length; there is no
    /// such thing as trailing garbage here because the ciphertext claims
    /// every remaining byte.
    pub fn parse(input: &[u8]) -> Result<Self, SerializationError> {
        let mut r = Reader::new(input);
        let version = r.read_u8("version")?;
        let mut auth_tag = [0u8; AUTH_TAG_LENGTH];
        auth_tag.copy_from_slice(r.read_bytes(AUTH_TAG_LENGTH, "auth_tag")?);
        let mut iv = [0u8; IV_LENGTH];
        iv.copy_from_slice(r.read_bytes(IV_LENGTH, "iv")?);
        let ciphertext = r.read_rest().to_vec();

        Ok(Self {
            version,
            auth_tag,
            iv,
            ciphertext,
        })
    }

    /// Serialize the envelope. Total for any well-formed in-memory value.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.num_bytes());
        out.push(self.version);
        out.extend_from_slice(&self.auth_tag);
        out.extend_from_slice(&self.iv);
        out.extend_from_slice(&self.ciphertext);
        out
    }

    /// Number of bytes this envelope occupies on the wire.
    pub fn num_bytes(&self) -> usize {
        1 + AUTH_TAG_LENGTH + IV_LENGTH + self.ciphertext.len()
    }
}
