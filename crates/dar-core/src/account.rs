//! The account provider: issues recovery tokens, decrypts their payload
//! and validates countersigned tokens coming back from a recovery
//! provider.

use std::fmt;
use std::sync::Arc;

use base64ct::{Base64, Encoding};
use serde::Deserialize;
use serde_json::{json, Map, Value};

use dar_codec::{RecoveryToken, RECOVERY_TOKEN_TYPE};
use dar_crypto::{CryptoError, Encryptor};

use crate::error::{
    CountersignFailure, CountersignedTokenError, IssuerError, ProviderConfigError, UnsealError,
};
use crate::provider::{ConfigCheck, KeySource, Provider};
use crate::registry::Registry;
use crate::token::{build_token, check_issued_time, FreshnessError};

/// An account provider: the site whose users recover accounts.
///
/// Remote instances come from a fetched configuration document and carry
/// only public fields. The local "self" instance is built once at startup
/// via [`AccountProviderBuilder`] and additionally holds signing and
/// symmetric key material.
#[derive(Clone)]
pub struct AccountProvider {
    issuer: String,
    tokensign_pubkeys: KeySource,
    save_token_return: String,
    recover_account_return: String,
    privacy_policy: String,
    icon_152px: String,
    signing_private_key: Option<String>,
    symmetric_key: Option<Vec<u8>>,
    custom_encryptor: Option<Arc<dyn Encryptor>>,
}

/// The shape of a fetched account-provider configuration document.
#[derive(Debug, Deserialize)]
struct AccountProviderDocument {
    issuer: Option<String>,
    #[serde(rename = "tokensign-pubkeys-secp256r1")]
    tokensign_pubkeys_secp256r1: Option<Vec<String>>,
    #[serde(rename = "save-token-return")]
    save_token_return: Option<String>,
    #[serde(rename = "recover-account-return")]
    recover_account_return: Option<String>,
    #[serde(rename = "privacy-policy")]
    privacy_policy: Option<String>,
    #[serde(rename = "icon-152px")]
    icon_152px: Option<String>,
}

impl AccountProvider {
    pub fn builder() -> AccountProviderBuilder {
        AccountProviderBuilder::default()
    }

    /// Build a remote peer instance from its well-known configuration
    /// document, collecting every validation problem into one error.
    pub fn from_document(
        origin: &str,
        document: &Value,
        allow_unsafe_urls: bool,
    ) -> Result<Self, ProviderConfigError> {
        let doc: AccountProviderDocument =
            serde_json::from_value(document.clone()).map_err(|_| ProviderConfigError::Json {
                origin: origin.to_string(),
                body_excerpt: excerpt(document),
            })?;

        let keys = KeySource::from(doc.tokensign_pubkeys_secp256r1.clone().unwrap_or_default());

        let mut check = ConfigCheck::new(allow_unsafe_urls);
        check.required("issuer", doc.issuer.as_deref());
        check.required("save_token_return", doc.save_token_return.as_deref());
        check.required("recover_account_return", doc.recover_account_return.as_deref());
        check.required("privacy_policy", doc.privacy_policy.as_deref());
        check.required("icon_152px", doc.icon_152px.as_deref());
        check.url("issuer", doc.issuer.as_deref());
        check.url("save_token_return", doc.save_token_return.as_deref());
        check.url("recover_account_return", doc.recover_account_return.as_deref());
        check.url("privacy_policy", doc.privacy_policy.as_deref());
        check.url("icon_152px", doc.icon_152px.as_deref());
        check.keys(&keys);
        check.finish(origin)?;

        Ok(Self {
            issuer: doc.issuer.unwrap_or_default(),
            tokensign_pubkeys: keys,
            save_token_return: doc.save_token_return.unwrap_or_default(),
            recover_account_return: doc.recover_account_return.unwrap_or_default(),
            privacy_policy: doc.privacy_policy.unwrap_or_default(),
            icon_152px: doc.icon_152px.unwrap_or_default(),
            signing_private_key: None,
            symmetric_key: None,
            custom_encryptor: None,
        })
    }

    pub fn save_token_return(&self) -> &str {
        &self.save_token_return
    }

    pub fn recover_account_return(&self) -> &str {
        &self.recover_account_return
    }

    pub fn privacy_policy(&self) -> &str {
        &self.privacy_policy
    }

    pub fn icon_152px(&self) -> &str {
        &self.icon_152px
    }

    /// Generate a recovery token carrying an encrypted opaque payload.
    ///
    /// Returns the unsealed token (for its `token_id` and metadata) and the
    /// sealed base64 form handed to the transport layer.
    pub fn generate_recovery_token(
        &self,
        data: &[u8],
        audience: &crate::RecoveryProvider,
        context: Option<&Value>,
    ) -> Result<(RecoveryToken, String), CryptoError> {
        let mut token = build_token(self.origin(), audience.origin(), RECOVERY_TOKEN_TYPE, 0x00);
        token.data = self
            .encryptor()
            .encrypt(data, self.symmetric_key()?, context)?;
        let sealed = self.seal(&token, context)?;
        Ok((token, sealed))
    }

    /// Decrypt the opaque payload of a validated recovery token.
    ///
    /// Deliberately separate from validation: a token may validate while
    /// decryption is deferred to a point where different key material is
    /// configured.
    pub fn decode(&self, token: &RecoveryToken, context: Option<&Value>) -> Result<Vec<u8>, CryptoError> {
        self.encryptor()
            .decrypt(&token.data, self.symmetric_key()?, context)
    }

    /// Validate a countersigned token returned by a recovery provider and
    /// hand back the nested, independently verified recovery token.
    ///
    /// Every failure carries a [`CountersignFailure`] reason tag naming the
    /// step that rejected the token. Payload decryption is not attempted
    /// here; call [`AccountProvider::decode`] on the result.
    pub fn validate_countersigned_recovery_token(
        &self,
        countersigned_token: &str,
        registry: &Registry,
        context: Option<&Value>,
    ) -> Result<RecoveryToken, CountersignedTokenError> {
        let raw = Base64::decode_vec(countersigned_token).map_err(|e| {
            CountersignedTokenError::new(
                format!("countersigned token is invalid: {e}"),
                CountersignFailure::CountersignedTokenParseError,
            )
        })?;

        // Identify and resolve the recovery provider that countersigned.
        let recovery_provider = registry
            .recovery_provider_issuer(&raw, context)
            .map_err(|e| match e {
                IssuerError::Serialization(_) | IssuerError::Format(_) => {
                    CountersignedTokenError::new(
                        format!("countersigned token is invalid: {e}"),
                        CountersignFailure::CountersignedTokenParseError,
                    )
                }
                IssuerError::Resolve(_) => CountersignedTokenError::new(
                    e.to_string(),
                    CountersignFailure::RecoveryTokenInvalidIssuer,
                ),
            })?;

        // Verify the outer token under the recovery provider's keys.
        let countersigned = recovery_provider
            .unseal(&raw, context)
            .map_err(|e| match e {
                UnsealError::Format(e) => CountersignedTokenError::new(
                    e.to_string(),
                    CountersignFailure::CountersignedInvalidTokenVersion,
                ),
                UnsealError::Crypto(_) => CountersignedTokenError::new(
                    "countersigned token has an invalid signature",
                    CountersignFailure::CountersignedInvalidSignature,
                ),
                UnsealError::Serialization(_) | UnsealError::Base64(_) => {
                    CountersignedTokenError::new(
                        format!("countersigned token is invalid: {e}"),
                        CountersignFailure::CountersignedTokenParseError,
                    )
                }
            })?;

        // Verify the nested token under our own keys.
        let recovery_token = self.unseal(&countersigned.data, context).map_err(|e| match e {
            UnsealError::Serialization(_) | UnsealError::Base64(_) => CountersignedTokenError::new(
                format!("nested recovery token is invalid: {e}"),
                CountersignFailure::RecoveryTokenTokenParseError,
            ),
            UnsealError::Format(e) => CountersignedTokenError::new(
                format!("nested recovery token format error: {e}"),
                CountersignFailure::RecoveryTokenInvalidTokenType,
            ),
            UnsealError::Crypto(_) => CountersignedTokenError::new(
                "nested recovery token has an invalid signature",
                CountersignFailure::RecoveryTokenInvalidSignature,
            ),
        })?;
        if recovery_token.token_type != RECOVERY_TOKEN_TYPE {
            return Err(CountersignedTokenError::new(
                format!(
                    "nested recovery token format error: token type must be {RECOVERY_TOKEN_TYPE}"
                ),
                CountersignFailure::RecoveryTokenInvalidTokenType,
            ));
        }

        // The countersigner's identity must line up on all three sides:
        // outer issuer, nested audience, and the provider we resolved.
        let countersigned_issuer = countersigned.issuer.as_str();
        if countersigned_issuer.is_empty()
            || countersigned_issuer != recovery_token.audience
            || recovery_provider.origin() != countersigned_issuer
        {
            return Err(CountersignedTokenError::new(
                "countersigned token issuer must be present and match the nested token audience",
                CountersignFailure::RecoveryTokenInvalidIssuer,
            ));
        }

        // Freshness is enforced on the outer token; the nested token's age
        // was checked by the recovery provider when it was first saved.
        match check_issued_time(&countersigned.issued_time) {
            Ok(()) => {}
            Err(FreshnessError::Stale) => {
                return Err(CountersignedTokenError::new(
                    "countersigned recovery token issued at time is too far in the past",
                    CountersignFailure::StaleToken,
                ));
            }
            Err(FreshnessError::Unparsable) => {
                return Err(CountersignedTokenError::new(
                    "invalid countersigned token issued time",
                    CountersignFailure::InvalidIssuedTime,
                ));
            }
        }

        Ok(recovery_token)
    }

    /// This provider's slice of the well-known configuration document.
    pub fn to_document(&self) -> Map<String, Value> {
        let mut doc = Map::new();
        doc.insert("issuer".into(), json!(self.issuer));
        doc.insert(
            "tokensign-pubkeys-secp256r1".into(),
            json!(self.tokensign_pubkeys.resolve(None)),
        );
        doc.insert("save-token-return".into(), json!(self.save_token_return));
        doc.insert(
            "recover-account-return".into(),
            json!(self.recover_account_return),
        );
        doc.insert("privacy-policy".into(), json!(self.privacy_policy));
        doc.insert("icon-152px".into(), json!(self.icon_152px));
        doc
    }

    fn symmetric_key(&self) -> Result<&[u8], CryptoError> {
        self.symmetric_key
            .as_deref()
            .ok_or(CryptoError::SymmetricKeyMissing)
    }
}

impl Provider for AccountProvider {
    fn origin(&self) -> &str {
        &self.issuer
    }

    fn unseal_keys(&self, context: Option<&Value>) -> Vec<String> {
        self.tokensign_pubkeys.resolve(context)
    }

    fn signing_private_key(&self) -> Option<&str> {
        self.signing_private_key.as_deref()
    }

    fn custom_encryptor(&self) -> Option<Arc<dyn Encryptor>> {
        self.custom_encryptor.clone()
    }
}

impl fmt::Debug for AccountProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Key material stays out of logs.
        f.debug_struct("AccountProvider")
            .field("issuer", &self.issuer)
            .field("tokensign_pubkeys", &self.tokensign_pubkeys)
            .finish_non_exhaustive()
    }
}

/// Builder for the local account-provider instance.
#[derive(Default)]
pub struct AccountProviderBuilder {
    issuer: Option<String>,
    tokensign_pubkeys: Option<KeySource>,
    save_token_return: Option<String>,
    recover_account_return: Option<String>,
    privacy_policy: Option<String>,
    icon_152px: Option<String>,
    signing_private_key: Option<String>,
    symmetric_key_hex: Option<String>,
    custom_encryptor: Option<Arc<dyn Encryptor>>,
}

impl AccountProviderBuilder {
    /// Origin URL this provider is authoritative for.
    pub fn issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = Some(issuer.into());
        self
    }

    pub fn tokensign_pubkeys(mut self, keys: impl Into<KeySource>) -> Self {
        self.tokensign_pubkeys = Some(keys.into());
        self
    }

    pub fn save_token_return(mut self, url: impl Into<String>) -> Self {
        self.save_token_return = Some(url.into());
        self
    }

    pub fn recover_account_return(mut self, url: impl Into<String>) -> Self {
        self.recover_account_return = Some(url.into());
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

    /// Base64 DER P-256 private key used to seal tokens.
    pub fn signing_private_key(mut self, key: impl Into<String>) -> Self {
        self.signing_private_key = Some(key.into());
        self
    }

    /// Hex-encoded 256-bit AES key used to encrypt token payloads.
    pub fn symmetric_key(mut self, hex_key: impl Into<String>) -> Self {
        self.symmetric_key_hex = Some(hex_key.into());
        self
    }

    /// Install a substitute crypto engine for this provider.
    pub fn custom_encryptor(mut self, encryptor: Arc<dyn Encryptor>) -> Self {
        self.custom_encryptor = Some(encryptor);
        self
    }

    pub fn build(self, allow_unsafe_urls: bool) -> Result<AccountProvider, ProviderConfigError> {
        let origin = self.issuer.clone().unwrap_or_default();
        let keys = self
            .tokensign_pubkeys
            .unwrap_or_else(|| KeySource::Static(Vec::new()));

        let mut check = ConfigCheck::new(allow_unsafe_urls);
        check.required("issuer", self.issuer.as_deref());
        check.required("save_token_return", self.save_token_return.as_deref());
        check.required("recover_account_return", self.recover_account_return.as_deref());
        check.required("privacy_policy", self.privacy_policy.as_deref());
        check.required("icon_152px", self.icon_152px.as_deref());
        check.url("issuer", self.issuer.as_deref());
        check.url("save_token_return", self.save_token_return.as_deref());
        check.url("recover_account_return", self.recover_account_return.as_deref());
        check.url("privacy_policy", self.privacy_policy.as_deref());
        check.url("icon_152px", self.icon_152px.as_deref());
        check.keys(&keys);
        check.finish(&origin)?;

        let symmetric_key = self
            .symmetric_key_hex
            .map(|hex_key| decode_symmetric_key(&hex_key))
            .transpose()?;

        Ok(AccountProvider {
            issuer: origin,
            tokensign_pubkeys: keys,
            save_token_return: self.save_token_return.unwrap_or_default(),
            recover_account_return: self.recover_account_return.unwrap_or_default(),
            privacy_policy: self.privacy_policy.unwrap_or_default(),
            icon_152px: self.icon_152px.unwrap_or_default(),
            signing_private_key: self.signing_private_key,
            symmetric_key,
            custom_encryptor: self.custom_encryptor,
        })
    }
}

fn decode_symmetric_key(hex_key: &str) -> Result<Vec<u8>, ProviderConfigError> {
    let key = hex::decode(hex_key)
        .map_err(|e| ProviderConfigError::InvalidSymmetricKey(e.to_string()))?;
    if key.len() != 32 {
        return Err(ProviderConfigError::InvalidSymmetricKey(format!(
            "expected 32 bytes, got {}",
            key.len()
        )));
    }
    Ok(key)
}

pub(crate) fn excerpt(document: &Value) -> String {
    document.to_string().chars().take(100).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn valid_document() -> Value {
        json!({
            "issuer": "https://accounts.example",
            "tokensign-pubkeys-secp256r1": ["MFkw-fake-key"],
            "save-token-return": "https://accounts.example/save-token-return",
            "recover-account-return": "https://accounts.example/recover-account-return",
            "privacy-policy": "https://accounts.example/privacy",
            "icon-152px": "https://accounts.example/icon.png"
        })
    }

    #[test]
    fn parses_valid_document() {
        let provider =
            AccountProvider::from_document("https://accounts.example", &valid_document(), false)
                .unwrap();
        assert_eq!(provider.origin(), "https://accounts.example");
        assert_eq!(provider.unseal_keys(None), vec!["MFkw-fake-key"]);
        assert!(provider.signing_private_key().is_none());
    }

    #[test]
    fn collects_all_missing_fields() {
        let err = AccountProvider::from_document("https://a.example", &json!({}), false)
            .unwrap_err();
        let message = err.to_string();
        assert!(message.contains("issuer not set"));
        assert!(message.contains("save_token_return not set"));
        assert!(message.contains("recover_account_return not set"));
        assert!(message.contains("privacy_policy not set"));
        assert!(message.contains("icon_152px not set"));
        assert!(message.contains("no public key provided"));
    }

    #[test]
    fn rejects_http_urls_by_default() {
        let mut doc = valid_document();
        doc["save-token-return"] = json!("http://accounts.example/save");
        let err =
            AccountProvider::from_document("https://accounts.example", &doc, false).unwrap_err();
        assert!(err.to_string().contains("save_token_return must be an https URL"));
    }

    #[test]
    fn allows_http_urls_when_unsafe_enabled() {
        let mut doc = valid_document();
        doc["issuer"] = json!("http://localhost:9292");
        doc["save-token-return"] = json!("http://localhost:9292/save");
        doc["recover-account-return"] = json!("http://localhost:9292/recover");
        doc["privacy-policy"] = json!("http://localhost:9292/privacy");
        doc["icon-152px"] = json!("http://localhost:9292/icon.png");
        assert!(AccountProvider::from_document("http://localhost:9292", &doc, true).is_ok());
    }

    #[test]
    fn builder_requires_signing_material_only_when_used() {
        let provider = AccountProvider::builder()
            .issuer("https://accounts.example")
            .tokensign_pubkeys(vec!["key".to_string()])
            .save_token_return("https://accounts.example/save")
            .recover_account_return("https://accounts.example/recover")
            .privacy_policy("https://accounts.example/privacy")
            .icon_152px("https://accounts.example/icon.png")
            .build(false)
            .unwrap();

        // No signing key configured: sealing fails fatally.
        let token = crate::token::build_token(
            "https://accounts.example",
            "https://recovery.example",
            RECOVERY_TOKEN_TYPE,
            0,
        );
        assert!(matches!(
            provider.seal(&token, None),
            Err(CryptoError::SigningKeyMissing)
        ));
    }

    #[test]
    fn rejects_bad_symmetric_key() {
        let builder = AccountProvider::builder()
            .issuer("https://accounts.example")
            .tokensign_pubkeys(vec!["key".to_string()])
            .save_token_return("https://accounts.example/save")
            .recover_account_return("https://accounts.example/recover")
            .privacy_policy("https://accounts.example/privacy")
            .icon_152px("https://accounts.example/icon.png")
            .symmetric_key("deadbeef");
        assert!(matches!(
            builder.build(false),
            Err(ProviderConfigError::InvalidSymmetricKey(_))
        ));
    }

    #[test]
    fn document_round_trips_through_to_document() {
        let provider =
            AccountProvider::from_document("https://accounts.example", &valid_document(), false)
                .unwrap();
        let doc = Value::Object(provider.to_document());
        assert_eq!(doc, valid_document());
    }
}
