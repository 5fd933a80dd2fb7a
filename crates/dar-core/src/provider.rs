//! Behavior shared by both provider roles: sealing, unsealing, key
//! sources and configuration validation.

use std::fmt;
use std::sync::Arc;

use base64ct::{Base64, Encoding};
use serde_json::Value;
use url::Url;

use dar_codec::{RecoveryToken, PROTOCOL_VERSION};
use dar_crypto::{scoped_encryptor, CryptoError, DefaultEncryptor, Encryptor};

use crate::error::{ProviderConfigError, TokenFormatError, UnsealError};

/// The two protocol roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Account,
    Recovery,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Role::Account => "account",
            Role::Recovery => "recovery",
        })
    }
}

/// Where a provider's verification public keys come from.
///
/// `Static` is an ordered list from configuration. `Dynamic` computes the
/// list from the per-call context, supporting key rotation without a
/// restart; it is resolved once per unseal attempt.
#[derive(Clone)]
pub enum KeySource {
    Static(Vec<String>),
    Dynamic(Arc<dyn Fn(Option<&Value>) -> Vec<String> + Send + Sync>),
}

impl KeySource {
    pub fn resolve(&self, context: Option<&Value>) -> Vec<String> {
        match self {
            KeySource::Static(keys) => keys.clone(),
            KeySource::Dynamic(lookup) => lookup(context),
        }
    }
}

impl From<Vec<String>> for KeySource {
    fn from(keys: Vec<String>) -> Self {
        KeySource::Static(keys)
    }
}

impl fmt::Debug for KeySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeySource::Static(keys) => f.debug_tuple("Static").field(&keys.len()).finish(),
            KeySource::Dynamic(_) => f.write_str("Dynamic(..)"),
        }
    }
}

/// The capability interface shared by [`AccountProvider`] and
/// [`RecoveryProvider`].
///
/// [`AccountProvider`]: crate::AccountProvider
/// [`RecoveryProvider`]: crate::RecoveryProvider
pub trait Provider {
    /// Canonical origin URL, the provider's identity in the registry.
    fn origin(&self) -> &str;

    /// Verification keys to try, in order, when unsealing.
    fn unseal_keys(&self, context: Option<&Value>) -> Vec<String>;

    /// Private signing key (base64 DER). Only ever present on the local
    /// "self" instance, never on a remote peer.
    fn signing_private_key(&self) -> Option<&str>;

    /// Engine installed on this provider instance, if any.
    fn custom_encryptor(&self) -> Option<Arc<dyn Encryptor>>;

    /// The crypto engine for this call: the scoped thread-local override if
    /// one is active, else the provider's own engine, else the default.
    fn encryptor(&self) -> Arc<dyn Encryptor> {
        scoped_encryptor()
            .or_else(|| self.custom_encryptor())
            .unwrap_or_else(|| Arc::new(DefaultEncryptor))
    }

    /// Serialize and sign `token`, returning base64 of
    /// `record_bytes ‖ signature`.
    fn seal(&self, token: &RecoveryToken, context: Option<&Value>) -> Result<String, CryptoError> {
        let private_key = self
            .signing_private_key()
            .ok_or(CryptoError::SigningKeyMissing)?;
        let mut sealed = token.to_bytes();
        let signature = self.encryptor().sign(&sealed, private_key, context)?;
        sealed.extend_from_slice(&signature);
        Ok(Base64::encode_string(&sealed))
    }

    /// Decode and verify a sealed token (raw `record_bytes ‖ signature`).
    ///
    /// Each configured unseal key is tried in order; the first match wins
    /// and only full exhaustion is a signature failure.
    fn unseal(
        &self,
        token_and_signature: &[u8],
        context: Option<&Value>,
    ) -> Result<RecoveryToken, UnsealError> {
        let token = RecoveryToken::parse(token_and_signature)?;
        if token.version != PROTOCOL_VERSION {
            return Err(TokenFormatError::UnsupportedVersion {
                expected: PROTOCOL_VERSION,
                got: token.version,
            }
            .into());
        }

        let (token_bytes, signature) = token_and_signature.split_at(token.num_bytes());
        let engine = self.encryptor();
        for key in self.unseal_keys(context) {
            if engine.verify(token_bytes, signature, &key, context)? {
                return Ok(token);
            }
        }
        Err(CryptoError::InvalidSignature.into())
    }

    /// [`Provider::unseal`] for base64 transport encodings.
    fn unseal_base64(
        &self,
        sealed: &str,
        context: Option<&Value>,
    ) -> Result<RecoveryToken, UnsealError> {
        let raw = Base64::decode_vec(sealed).map_err(|e| UnsealError::Base64(e.to_string()))?;
        self.unseal(&raw, context)
    }
}

/// Collects configuration problems so they can all be reported at once.
pub(crate) struct ConfigCheck {
    allow_unsafe_urls: bool,
    problems: Vec<String>,
}

impl ConfigCheck {
    pub(crate) fn new(allow_unsafe_urls: bool) -> Self {
        Self {
            allow_unsafe_urls,
            problems: Vec::new(),
        }
    }

    /// Record a problem for `field` when `value` is absent or empty.
    pub(crate) fn required(&mut self, field: &str, value: Option<&str>) {
        if value.map_or(true, str::is_empty) {
            self.problems.push(format!("{field} not set"));
        }
    }

    /// `value` must parse as a URL and, unless unsafe URLs are allowed,
    /// use the https scheme. Absent values are reported by `required`.
    pub(crate) fn url(&mut self, field: &str, value: Option<&str>) {
        let Some(value) = value.filter(|v| !v.is_empty()) else {
            return;
        };
        match Url::parse(value) {
            Ok(url) => {
                if !self.allow_unsafe_urls && url.scheme() != "https" {
                    self.problems.push(format!("{field} must be an https URL"));
                }
            }
            Err(_) => self.problems.push(format!("{field} must be a valid URL")),
        }
    }

    pub(crate) fn keys(&mut self, source: &KeySource) {
        let keys = source.resolve(None);
        if keys.is_empty() || keys.iter().any(String::is_empty) {
            self.problems.push("no public key provided".to_string());
        }
    }

    pub(crate) fn problem(&mut self, message: impl Into<String>) {
        self.problems.push(message.into());
    }

    pub(crate) fn finish(self, origin: &str) -> Result<(), ProviderConfigError> {
        if self.problems.is_empty() {
            Ok(())
        } else {
            Err(ProviderConfigError::Invalid {
                origin: origin.to_string(),
                problems: self.problems,
            })
        }
    }
}
