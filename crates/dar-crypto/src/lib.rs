//! Cryptography engine for the Delegated Account Recovery protocol.
//!
//! Sealing signatures are ECDSA over P-256 with SHA-256 digests, ASN.1/DER
//! encoded, verified against SubjectPublicKeyInfo (base64) public keys.
//! Opaque token payloads are AES-256-GCM envelopes with a fresh 96-bit IV
//! per encryption and no associated data.
//!
//! All four operations sit behind the [`Encryptor`] capability trait so a
//! substitute engine can be installed globally per provider or scoped to a
//! block via [`with_encryptor`].

pub mod default;
pub mod engine;
pub mod error;
pub mod keys;

pub use default::DefaultEncryptor;
pub use engine::{scoped_encryptor, with_encryptor, Encryptor};
pub use error::CryptoError;
pub use keys::{generate_keypair, GeneratedKeyPair};
