//! Error types for provider resolution, configuration and token validation.
//!
//! Low-level codec/crypto errors are re-wrapped at each protocol-step
//! boundary into the step-appropriate type here, so callers branch on
//! variants (or on [`CountersignFailure`] tags), never on message text.

use std::fmt;

use thiserror::Error;

pub use dar_codec::SerializationError;
pub use dar_crypto::CryptoError;

use crate::provider::Role;

/// Structurally valid binary data carrying the wrong version or token type.
#[derive(Debug, Error)]
pub enum TokenFormatError {
    #[error("version field must be {expected}, got {got}")]
    UnsupportedVersion { expected: u8, got: u8 },

    #[error("token type must be {expected}, got {got}")]
    UnexpectedTokenType { expected: u8, got: u8 },

    #[error("could not determine provider: {0}")]
    IssuerUnresolvable(String),
}

/// Why `unseal` rejected a sealed token.
#[derive(Debug, Error)]
pub enum UnsealError {
    #[error("invalid base64: {0}")]
    Base64(String),

    #[error(transparent)]
    Serialization(#[from] SerializationError),

    #[error(transparent)]
    Format(#[from] TokenFormatError),

    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

/// An origin that was never registered for the role it was used in.
#[derive(Debug, Error)]
#[error("unknown {role} provider: {origin}")]
pub struct UnknownProviderError {
    pub role: Role,
    pub origin: String,
}

/// A peer's configuration is missing, unreachable or invalid.
#[derive(Debug, Error)]
pub enum ProviderConfigError {
    #[error("unable to retrieve provider config for {origin}: {status}: {body_excerpt}")]
    Fetch {
        origin: String,
        status: u16,
        body_excerpt: String,
    },

    /// Transport-level failure, including fetch timeouts.
    #[error("unable to retrieve provider config for {origin}: {source}")]
    Http {
        origin: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("unable to parse provider config for {origin}: {body_excerpt}")]
    Json {
        origin: String,
        body_excerpt: String,
    },

    /// Every failing field, collected, not just the first.
    #[error("invalid provider config for {origin}: {}", problems.join(", "))]
    Invalid {
        origin: String,
        problems: Vec<String>,
    },

    #[error("invalid symmetric key: {0}")]
    InvalidSymmetricKey(String),

    #[error("unable to build http client: {0}")]
    Client(String),
}

/// Failure to resolve an origin to a live provider.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error(transparent)]
    Unknown(#[from] UnknownProviderError),

    #[error(transparent)]
    Config(#[from] ProviderConfigError),
}

/// Failure while extracting and resolving a token's issuer.
#[derive(Debug, Error)]
pub enum IssuerError {
    #[error(transparent)]
    Serialization(#[from] SerializationError),

    #[error(transparent)]
    Format(#[from] TokenFormatError),

    #[error(transparent)]
    Resolve(#[from] ResolveError),
}

/// A recovery token failed validation at the recovery provider.
#[derive(Debug, Error)]
pub enum RecoveryTokenError {
    #[error("could not determine provider: {0}")]
    ProviderLookup(String),

    #[error("unable to verify signature of token")]
    InvalidSignature,

    #[error("invalid token: {0}")]
    Format(String),

    #[error("unacceptable audience: {0}")]
    UnacceptableAudience(String),

    #[error("issued at time is too far in the past")]
    StaleToken,

    #[error("invalid issued time: {0}")]
    InvalidIssuedTime(String),
}

/// Machine-readable cause tag for countersigned-token validation failures.
///
/// `as_str` yields the stable wire-format tag; callers branch on these, not
/// on messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountersignFailure {
    CountersignedTokenParseError,
    CountersignedInvalidTokenVersion,
    CountersignedInvalidSignature,
    RecoveryTokenTokenParseError,
    RecoveryTokenInvalidTokenType,
    RecoveryTokenInvalidSignature,
    RecoveryTokenInvalidIssuer,
    StaleToken,
    InvalidIssuedTime,
}

impl CountersignFailure {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CountersignedTokenParseError => "countersigned_token_parse_error",
            Self::CountersignedInvalidTokenVersion => "countersigned_invalid_token_version",
            Self::CountersignedInvalidSignature => "countersigned_invalid_signature",
            Self::RecoveryTokenTokenParseError => "recovery_token_token_parse_error",
            Self::RecoveryTokenInvalidTokenType => "recovery_token_invalid_token_type",
            Self::RecoveryTokenInvalidSignature => "recovery_token_invalid_signature",
            Self::RecoveryTokenInvalidIssuer => "recovery_token_invalid_issuer",
            Self::StaleToken => "stale_token",
            Self::InvalidIssuedTime => "invalid_issued_time",
        }
    }
}

impl fmt::Display for CountersignFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A countersigned token failed validation at the account provider.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct CountersignedTokenError {
    pub message: String,
    pub reason: CountersignFailure,
}

impl CountersignedTokenError {
    pub(crate) fn new(message: impl Into<String>, reason: CountersignFailure) -> Self {
        Self {
            message: message.into(),
            reason,
        }
    }
}

/// Failure while countersigning a recovery token.
#[derive(Debug, Error)]
pub enum CountersignError {
    #[error(transparent)]
    Format(#[from] TokenFormatError),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error(transparent)]
    Config(#[from] ProviderConfigError),
}

/// One process serving both roles published two different values under the
/// same well-known configuration key.
#[derive(Debug, Error)]
#[error("inconsistent config value detected {key}: {lhs} != {rhs}")]
pub struct ConfigDocumentError {
    pub key: String,
    pub lhs: serde_json::Value,
    pub rhs: serde_json::Value,
}
