//! The recovery token record.
//!
//! Wire layout:
//! `[version:1][token_type:1][token_id:16][options:1]` followed by five
//! length-prefixed fields (`u16` big-endian length each): `issuer`,
//! `audience`, `issued_time`, `data`, `binding_data`.
//!
//! A serialized token is usually followed by a detached signature in the
//! same buffer; `parse` stops at the record's own boundary and
//! [`RecoveryToken::num_bytes`] tells callers where that boundary is.

use crate::error::SerializationError;
use crate::reader::{write_prefixed, Reader};

/// Protocol version carried in the `version` field of every record.
pub const PROTOCOL_VERSION: u8 = 0;

/// Byte length of the random token id.
pub const TOKEN_ID_LENGTH: usize = 16;

/// `token_type` of a recovery token issued by an account provider.
pub const RECOVERY_TOKEN_TYPE: u8 = 0;

/// `token_type` of a countersigned token issued by a recovery provider.
pub const COUNTERSIGNED_RECOVERY_TOKEN_TYPE: u8 = 1;

/// A decoded recovery token.
///
/// For `token_type` 0 the `data` field holds a serialized
/// [`EncryptedData`](crate::EncryptedData) envelope; for `token_type` 1 it
/// holds the verbatim bytes of a nested sealed recovery token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveryToken {
    pub version: u8,
    pub token_type: u8,
    pub token_id: [u8; TOKEN_ID_LENGTH],
    pub options: u8,
    /// Origin of the entity that sealed this record.
    pub issuer: String,
    /// Origin for which the record is intended.
    pub audience: String,
    /// ISO-8601 UTC timestamp string.
    pub issued_time: String,
    pub data: Vec<u8>,
    /// Optional browser-binding evidence. Not currently enforced.
    pub binding_data: Vec<u8>,
}

impl RecoveryToken {
    /// Decode a token from the front of `input`.
    ///
    /// Trailing bytes beyond the declared fields (an appended signature, or
    /// the rest of an enclosing buffer) are ignored, never an error.
    pub fn parse(input: &[u8]) -> Result<Self, SerializationError> {
        Self::read(&mut Reader::new(input)).map_err(|e| base64_hint(input, e))
    }

    fn read(r: &mut Reader<'_>) -> Result<Self, SerializationError> {
        let version = r.read_u8("version")?;
        let token_type = r.read_u8("token_type")?;
        let mut token_id = [0u8; TOKEN_ID_LENGTH];
        token_id.copy_from_slice(r.read_bytes(TOKEN_ID_LENGTH, "token_id")?);
        let options = r.read_u8("options")?;
        let issuer = read_string(r, "issuer")?;
        let audience = read_string(r, "audience")?;
        let issued_time = read_string(r, "issued_time")?;
        let data = r.read_prefixed("data")?.to_vec();
        let binding_data = r.read_prefixed("binding_data")?.to_vec();

        Ok(Self {
            version,
            token_type,
            token_id,
            options,
            issuer,
            audience,
            issued_time,
            data,
            binding_data,
        })
    }

    /// Serialize the token. Total for any well-formed in-memory value.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.num_bytes());
        out.push(self.version);
        out.push(self.token_type);
        out.extend_from_slice(&self.token_id);
        out.push(self.options);
        write_prefixed(&mut out, self.issuer.as_bytes());
        write_prefixed(&mut out, self.audience.as_bytes());
        write_prefixed(&mut out, self.issued_time.as_bytes());
        write_prefixed(&mut out, &self.data);
        write_prefixed(&mut out, &self.binding_data);
        out
    }

    /// Number of bytes this token occupies on the wire.
    ///
    /// Equals the length of `to_bytes()` and, after a `parse`, the offset at
    /// which a signature suffix begins.
    pub fn num_bytes(&self) -> usize {
        1 + 1
            + TOKEN_ID_LENGTH
            + 1
            + 2
            + self.issuer.len()
            + 2
            + self.audience.len()
            + 2
            + self.issued_time.len()
            + 2
            + self.data.len()
            + 2
            + self.binding_data.len()
    }
}

fn read_string(r: &mut Reader<'_>, field: &'static str) -> Result<String, SerializationError> {
    let bytes = r.read_prefixed(field)?;
    String::from_utf8(bytes.to_vec()).map_err(|_| SerializationError::InvalidUtf8 { field })
}

/// Swap a truncation error for one with a decoding hint when the input is
/// plausibly base64 text that was never decoded.
fn base64_hint(input: &[u8], err: SerializationError) -> SerializationError {
    let looks_like_base64 = !input.is_empty()
        && input
            .iter()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'+' | b'/' | b'='));
    match err {
        SerializationError::Truncated { field, .. } if looks_like_base64 => {
            SerializationError::TruncatedLikelyBase64 { field }
        }
        other => other,
    }
}
