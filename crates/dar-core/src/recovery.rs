//! The recovery provider: stores sealed recovery tokens on behalf of
//! account providers and countersigns them when an account is recovered.

use std::fmt;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Map, Value};

use dar_codec::{RecoveryToken, COUNTERSIGNED_RECOVERY_TOKEN_TYPE};
use dar_crypto::Encryptor;

use crate::account::excerpt;
use crate::error::{
    CountersignError, IssuerError, ProviderConfigError, RecoveryTokenError, ResolveError,
    UnsealError,
};
use crate::provider::{ConfigCheck, KeySource, Provider};
use crate::registry::Registry;
use crate::token::{build_token, check_issued_time, FreshnessError};

/// A recovery provider: the site that safekeeps recovery tokens and vouches
/// for a user during recovery.
#[derive(Clone)]
pub struct RecoveryProvider {
    issuer: String,
    countersign_pubkeys: KeySource,
    token_max_size: u32,
    save_token: String,
    recover_account: String,
    privacy_policy: String,
    icon_152px: Option<String>,
    save_token_async_api_iframe: Option<String>,
    signing_private_key: Option<String>,
    custom_encryptor: Option<Arc<dyn Encryptor>>,
}

#[derive(Debug, Deserialize)]
struct RecoveryProviderDocument {
    issuer: Option<String>,
    #[serde(rename = "countersign-pubkeys-secp256r1")]
    countersign_pubkeys_secp256r1: Option<Vec<String>>,
    #[serde(rename = "token-max-size")]
    token_max_size: Option<u32>,
    #[serde(rename = "save-token")]
    save_token: Option<String>,
    #[serde(rename = "recover-account")]
    recover_account: Option<String>,
    #[serde(rename = "privacy-policy")]
    privacy_policy: Option<String>,
    #[serde(rename = "icon-152px")]
    icon_152px: Option<String>,
    #[serde(rename = "save-token-async-api-iframe")]
    save_token_async_api_iframe: Option<String>,
}

impl RecoveryProvider {
    pub fn builder() -> RecoveryProviderBuilder {
        RecoveryProviderBuilder::default()
    }

    /// Build a remote peer instance from its well-known configuration
    /// document.
    pub fn from_document(
        origin: &str,
        document: &Value,
        allow_unsafe_urls: bool,
    ) -> Result<Self, ProviderConfigError> {
        let doc: RecoveryProviderDocument =
            serde_json::from_value(document.clone()).map_err(|_| ProviderConfigError::Json {
                origin: origin.to_string(),
                body_excerpt: excerpt(document),
            })?;

        let keys = KeySource::from(doc.countersign_pubkeys_secp256r1.clone().unwrap_or_default());

        let mut check = ConfigCheck::new(allow_unsafe_urls);
        check.required("issuer", doc.issuer.as_deref());
        check.required("save_token", doc.save_token.as_deref());
        check.required("recover_account", doc.recover_account.as_deref());
        check.required("privacy_policy", doc.privacy_policy.as_deref());
        check.url("issuer", doc.issuer.as_deref());
        check.url("save_token", doc.save_token.as_deref());
        check.url("recover_account", doc.recover_account.as_deref());
        check.url("privacy_policy", doc.privacy_policy.as_deref());
        check.url("icon_152px", doc.icon_152px.as_deref());
        check.url(
            "save_token_async_api_iframe",
            doc.save_token_async_api_iframe.as_deref(),
        );
        check.keys(&keys);
        if doc.token_max_size.map_or(true, |size| size == 0) {
            check.problem("token_max_size must be a positive integer");
        }
        check.finish(origin)?;

        Ok(Self {
            issuer: doc.issuer.unwrap_or_default(),
            countersign_pubkeys: keys,
            token_max_size: doc.token_max_size.unwrap_or_default(),
            save_token: doc.save_token.unwrap_or_default(),
            recover_account: doc.recover_account.unwrap_or_default(),
            privacy_policy: doc.privacy_policy.unwrap_or_default(),
            icon_152px: doc.icon_152px,
            save_token_async_api_iframe: doc.save_token_async_api_iframe,
            signing_private_key: None,
            custom_encryptor: None,
        })
    }

    pub fn token_max_size(&self) -> u32 {
        self.token_max_size
    }

    pub fn save_token(&self) -> &str {
        &self.save_token
    }

    pub fn recover_account(&self) -> &str {
        &self.recover_account
    }

    pub fn privacy_policy(&self) -> &str {
        &self.privacy_policy
    }

    pub fn icon_152px(&self) -> Option<&str> {
        self.icon_152px.as_deref()
    }

    pub fn save_token_async_api_iframe(&self) -> Option<&str> {
        self.save_token_async_api_iframe.as_deref()
    }

    /// The URL a user visits to begin recovery of the given token.
    pub fn recovery_url(&self, token_id: &[u8]) -> String {
        format!("{}?token_id={}", self.recover_account, hex::encode(token_id))
    }

    /// Validate a recovery token submitted for safekeeping.
    ///
    /// Resolves the issuing account provider from the token itself, checks
    /// the signature under that provider's keys, confirms the token was
    /// addressed to us and that it was issued recently. Stored tokens are
    /// not re-checked for freshness later; staleness only matters at save
    /// time.
    pub fn validate_recovery_token(
        &self,
        raw: &[u8],
        registry: &Registry,
        context: Option<&Value>,
    ) -> Result<RecoveryToken, RecoveryTokenError> {
        let account_provider = registry
            .account_provider_issuer(raw, context)
            .map_err(issuer_to_lookup)?;

        let token = account_provider.unseal(raw, context).map_err(|e| match e {
            UnsealError::Crypto(_) => RecoveryTokenError::InvalidSignature,
            other => RecoveryTokenError::Format(other.to_string()),
        })?;

        if token.audience != self.issuer {
            return Err(RecoveryTokenError::UnacceptableAudience(token.audience));
        }

        match check_issued_time(&token.issued_time) {
            Ok(()) => Ok(token),
            Err(FreshnessError::Stale) => Err(RecoveryTokenError::StaleToken),
            Err(FreshnessError::Unparsable) => Err(RecoveryTokenError::InvalidIssuedTime(
                token.issued_time.clone(),
            )),
        }
    }

    /// Wrap a validated recovery token in a countersigned token sealed under
    /// our own signing key. The original sealed bytes are embedded verbatim
    /// so the account provider can re-verify them independently.
    pub fn countersign_token(
        &self,
        raw: &[u8],
        registry: &Registry,
        context: Option<&Value>,
    ) -> Result<String, CountersignError> {
        let account_provider = registry
            .account_provider_issuer(raw, context)
            .map_err(|e| match e {
                IssuerError::Serialization(e) => {
                    CountersignError::Format(crate::error::TokenFormatError::IssuerUnresolvable(
                        e.to_string(),
                    ))
                }
                IssuerError::Format(e) => CountersignError::Format(
                    crate::error::TokenFormatError::IssuerUnresolvable(e.to_string()),
                ),
                IssuerError::Resolve(ResolveError::Unknown(e)) => CountersignError::Format(
                    crate::error::TokenFormatError::IssuerUnresolvable(e.to_string()),
                ),
                IssuerError::Resolve(ResolveError::Config(e)) => CountersignError::Config(e),
            })?;

        let mut countersigned = build_token(
            self.origin(),
            account_provider.origin(),
            COUNTERSIGNED_RECOVERY_TOKEN_TYPE,
            0x00,
        );
        countersigned.data = raw.to_vec();
        Ok(self.seal(&countersigned, context)?)
    }

    /// This provider's slice of the well-known configuration document.
    pub fn to_document(&self) -> Map<String, Value> {
        let mut doc = Map::new();
        doc.insert("issuer".into(), json!(self.issuer));
        doc.insert(
            "countersign-pubkeys-secp256r1".into(),
            json!(self.countersign_pubkeys.resolve(None)),
        );
        doc.insert("token-max-size".into(), json!(self.token_max_size));
        doc.insert("save-token".into(), json!(self.save_token));
        doc.insert("recover-account".into(), json!(self.recover_account));
        doc.insert("privacy-policy".into(), json!(self.privacy_policy));
        if let Some(icon) = &self.icon_152px {
            doc.insert("icon-152px".into(), json!(icon));
        }
        if let Some(iframe) = &self.save_token_async_api_iframe {
            doc.insert("save-token-async-api-iframe".into(), json!(iframe));
        }
        doc
    }
}

fn issuer_to_lookup(e: IssuerError) -> RecoveryTokenError {
    match e {
        IssuerError::Serialization(e) => {
            RecoveryTokenError::Format(format!("invalid token: {e}"))
        }
        IssuerError::Format(e) => RecoveryTokenError::Format(e.to_string()),
        IssuerError::Resolve(e) => RecoveryTokenError::ProviderLookup(e.to_string()),
    }
}

impl Provider for RecoveryProvider {
    fn origin(&self) -> &str {
        &self.issuer
    }

    fn unseal_keys(&self, context: Option<&Value>) -> Vec<String> {
        self.countersign_pubkeys.resolve(context)
    }

    fn signing_private_key(&self) -> Option<&str> {
        self.signing_private_key.as_deref()
    }

    fn custom_encryptor(&self) -> Option<Arc<dyn Encryptor>> {
        self.custom_encryptor.clone()
    }
}

impl fmt::Debug for RecoveryProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecoveryProvider")
            .field("issuer", &self.issuer)
            .field("countersign_pubkeys", &self.countersign_pubkeys)
            .field("token_max_size", &self.token_max_size)
            .finish_non_exhaustive()
    }
}

/// Builder for the local recovery-provider instance.
#[derive(Default)]
pub struct RecoveryProviderBuilder {
    issuer: Option<String>,
    countersign_pubkeys: Option<KeySource>,
    token_max_size: Option<u32>,
    save_token: Option<String>,
    recover_account: Option<String>,
    privacy_policy: Option<String>,
    icon_152px: Option<String>,
    save_token_async_api_iframe: Option<String>,
    signing_private_key: Option<String>,
    custom_encryptor: Option<Arc<dyn Encryptor>>,
}

impl RecoveryProviderBuilder {
    pub fn issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = Some(issuer.into());
        self
    }

    pub fn countersign_pubkeys(mut self, keys: impl Into<KeySource>) -> Self {
        self.countersign_pubkeys = Some(keys.into());
        self
    }

    /// Largest sealed token, in bytes, this provider will store.
    pub fn token_max_size(mut self, size: u32) -> Self {
        self.token_max_size = Some(size);
        self
    }

    pub fn save_token(mut self, url: impl Into<String>) -> Self {
        self.save_token = Some(url.into());
        self
    }

    pub fn recover_account(mut self, url: impl Into<String>) -> Self {
        self.recover_account = Some(url.into());
        self
    }

    pub fn privacy_policy(mut self, url: impl Into<String>) -> Self {
        self.privacy_policy = Some(url.into());
        self
    }

    pub fn icon_152px(mut self, url: impl Into<String>) -> Self {
        self.icon_152px = Some(url.into());
        self
    }

    pub fn save_token_async_api_iframe(mut self, url: impl Into<String>) -> Self {
        self.save_token_async_api_iframe = Some(url.into());
        self
    }

    pub fn signing_private_key(mut self, key: impl Into<String>) -> Self {
        self.signing_private_key = Some(key.into());
        self
    }

    pub fn custom_encryptor(mut self, encryptor: Arc<dyn Encryptor>) -> Self {
        self.custom_encryptor = Some(encryptor);
        self
    }

    pub fn build(self, allow_unsafe_urls: bool) -> Result<RecoveryProvider, ProviderConfigError> {
        let origin = self.issuer.clone().unwrap_or_default();
        let keys = self
            .countersign_pubkeys
            .unwrap_or_else(|| KeySource::Static(Vec::new()));

        let mut check = ConfigCheck::new(allow_unsafe_urls);
        check.required("issuer", self.issuer.as_deref());
        check.required("save_token", self.save_token.as_deref());
        check.required("recover_account", self.recover_account.as_deref());
        check.required("privacy_policy", self.privacy_policy.as_deref());
        check.url("issuer", self.issuer.as_deref());
        check.url("save_token", self.save_token.as_deref());
        check.url("recover_account", self.recover_account.as_deref());
        check.url("privacy_policy", self.privacy_policy.as_deref());
        check.url("icon_152px", self.icon_152px.as_deref());
        check.url(
            "save_token_async_api_iframe",
            self.save_token_async_api_iframe.as_deref(),
        );
        check.keys(&keys);
        if self.token_max_size.map_or(true, |size| size == 0) {
            check.problem("token_max_size must be a positive integer");
        }
        check.finish(&origin)?;

        Ok(RecoveryProvider {
            issuer: origin,
            countersign_pubkeys: keys,
            token_max_size: self.token_max_size.unwrap_or_default(),
            save_token: self.save_token.unwrap_or_default(),
            recover_account: self.recover_account.unwrap_or_default(),
            privacy_policy: self.privacy_policy.unwrap_or_default(),
            icon_152px: self.icon_152px,
            save_token_async_api_iframe: self.save_token_async_api_iframe,
            signing_private_key: self.signing_private_key,
            custom_encryptor: self.custom_encryptor,
        })
    }
}
