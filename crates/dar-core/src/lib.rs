//! Delegated account recovery protocol core.
//!
//! Two roles cooperate: an account provider issues sealed recovery tokens
//! carrying an encrypted payload, and a recovery provider safekeeps them
//! and countersigns one when the user later proves control of their
//! recovery account. This crate provides both provider types, the
//! [`Registry`] that resolves token issuers to providers (discovering
//! remote peers via their well-known configuration), and the validation
//! state machines for both directions of the exchange.
//!
//! Binary token and envelope formats live in `dar-codec`; signing and
//! payload encryption in `dar-crypto`.

pub mod account;
pub mod discovery;
pub mod error;
pub mod provider;
pub mod recovery;
pub mod registry;
pub mod token;

pub use account::{AccountProvider, AccountProviderBuilder};
pub use discovery::{ConfigCache, MemoryConfigCache, WELL_KNOWN_CONFIG_PATH};
pub use error::{
    CountersignError, CountersignFailure, CountersignedTokenError, ProviderConfigError,
    RecoveryTokenError, ResolveError, TokenFormatError, UnsealError,
};
pub use provider::{KeySource, Provider, Role};
pub use recovery::{RecoveryProvider, RecoveryProviderBuilder};
pub use registry::{Registry, RegistryBuilder};
pub use token::{dangerous_unverified_recovery_token, CLOCK_SKEW_SECONDS};

pub use dar_codec::{
    EncryptedData, RecoveryToken, COUNTERSIGNED_RECOVERY_TOKEN_TYPE, PROTOCOL_VERSION,
    RECOVERY_TOKEN_TYPE, TOKEN_ID_LENGTH,
};
pub use dar_crypto::{generate_keypair, with_encryptor, CryptoError, Encryptor, GeneratedKeyPair};
