//! Binary record codec for the Delegated Account Recovery protocol.
//!
//! Two fixed-grammar records: [`RecoveryToken`] (the signed token exchanged
//! between providers) and [`EncryptedData`] (the opaque-payload envelope
//! carried in a recovery token's `data` field). Pure encode/decode — no
//! crypto, no I/O. All multi-byte integers are big-endian.

pub mod encrypted_data;
pub mod error;
mod reader;
pub mod recovery_token;

pub use encrypted_data::{EncryptedData, AUTH_TAG_LENGTH, IV_LENGTH};
pub use error::SerializationError;
pub use recovery_token::{
    RecoveryToken, COUNTERSIGNED_RECOVERY_TOKEN_TYPE, PROTOCOL_VERSION, RECOVERY_TOKEN_TYPE,
    TOKEN_ID_LENGTH,
};
