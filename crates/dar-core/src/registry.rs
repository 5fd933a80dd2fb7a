//! Provider registry: holds this process's own provider instances, the
//! allow-lists of trusted peers, and resolves origins (or token issuers)
//! to live provider objects, fetching peer configuration on demand.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde_json::{Map, Value};
use tracing::info;

use dar_codec::{RecoveryToken, COUNTERSIGNED_RECOVERY_TOKEN_TYPE, RECOVERY_TOKEN_TYPE};

use crate::account::AccountProvider;
use crate::discovery::{fetch_config, ConfigCache};
use crate::error::{
    ConfigDocumentError, IssuerError, ProviderConfigError, ResolveError, TokenFormatError,
    UnknownProviderError,
};
use crate::provider::{Provider, Role};
use crate::recovery::RecoveryProvider;

const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

pub struct Registry {
    account_provider: Option<Arc<AccountProvider>>,
    recovery_provider: Option<Arc<RecoveryProvider>>,
    allowed_account_origins: RwLock<HashSet<String>>,
    allowed_recovery_origins: RwLock<HashSet<String>>,
    allow_unsafe_urls: bool,
    http: reqwest::blocking::Client,
    cache: Option<Arc<dyn ConfigCache>>,
}

impl Registry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// The account provider this process runs as, if any.
    pub fn this_account_provider(&self) -> Option<&Arc<AccountProvider>> {
        self.account_provider.as_ref()
    }

    /// The recovery provider this process runs as, if any.
    pub fn this_recovery_provider(&self) -> Option<&Arc<RecoveryProvider>> {
        self.recovery_provider.as_ref()
    }

    /// Trust `origin` as an account provider. Idempotent.
    pub fn register_account_provider(&self, origin: impl Into<String>) {
        let origin = origin.into();
        if self.allowed_account_origins.write().insert(origin.clone()) {
            info!(origin, "registered account provider");
        }
    }

    /// Trust `origin` as a recovery provider. Idempotent.
    pub fn register_recovery_provider(&self, origin: impl Into<String>) {
        let origin = origin.into();
        if self.allowed_recovery_origins.write().insert(origin.clone()) {
            info!(origin, "registered recovery provider");
        }
    }

    /// Resolve `origin` to an account provider: ourselves if it matches, a
    /// freshly configured peer instance otherwise.
    pub fn account_provider(&self, origin: &str) -> Result<Arc<AccountProvider>, ResolveError> {
        if let Some(own) = &self.account_provider {
            if own.origin() == origin {
                return Ok(Arc::clone(own));
            }
        }
        if !self.allowed_account_origins.read().contains(origin) {
            return Err(UnknownProviderError {
                role: Role::Account,
                origin: origin.to_string(),
            }
            .into());
        }
        let config = fetch_config(&self.http, self.cache.as_deref(), origin)?;
        let provider = AccountProvider::from_document(origin, &config, self.allow_unsafe_urls)?;
        Ok(Arc::new(provider))
    }

    /// Resolve `origin` to a recovery provider.
    pub fn recovery_provider(&self, origin: &str) -> Result<Arc<RecoveryProvider>, ResolveError> {
        if let Some(own) = &self.recovery_provider {
            if own.origin() == origin {
                return Ok(Arc::clone(own));
            }
        }
        if !self.allowed_recovery_origins.read().contains(origin) {
            return Err(UnknownProviderError {
                role: Role::Recovery,
                origin: origin.to_string(),
            }
            .into());
        }
        let config = fetch_config(&self.http, self.cache.as_deref(), origin)?;
        let provider = RecoveryProvider::from_document(origin, &config, self.allow_unsafe_urls)?;
        Ok(Arc::new(provider))
    }

    /// Resolve the account provider that issued a sealed recovery token,
    /// from the token's own issuer field. No signature is verified here;
    /// the caller must unseal against the resolved provider's keys.
    pub fn account_provider_issuer(
        &self,
        raw: &[u8],
        _context: Option<&Value>,
    ) -> Result<Arc<AccountProvider>, IssuerError> {
        let token = RecoveryToken::parse(raw)?;
        if token.token_type != RECOVERY_TOKEN_TYPE {
            return Err(TokenFormatError::UnexpectedTokenType {
                expected: RECOVERY_TOKEN_TYPE,
                got: token.token_type,
            }
            .into());
        }
        Ok(self.account_provider(&token.issuer)?)
    }

    /// Resolve the recovery provider that issued a countersigned token.
    pub fn recovery_provider_issuer(
        &self,
        raw: &[u8],
        _context: Option<&Value>,
    ) -> Result<Arc<RecoveryProvider>, IssuerError> {
        let token = RecoveryToken::parse(raw)?;
        if token.token_type != COUNTERSIGNED_RECOVERY_TOKEN_TYPE {
            return Err(TokenFormatError::UnexpectedTokenType {
                expected: COUNTERSIGNED_RECOVERY_TOKEN_TYPE,
                got: token.token_type,
            }
            .into());
        }
        Ok(self.recovery_provider(&token.issuer)?)
    }

    /// The combined well-known configuration document for this process.
    ///
    /// When one process serves both roles the two documents are merged;
    /// a key published by both with different values is a deployment bug
    /// and is reported rather than silently picking one.
    pub fn account_and_recovery_provider_config(
        &self,
    ) -> Result<Map<String, Value>, ConfigDocumentError> {
        let mut merged = Map::new();
        if let Some(account) = &self.account_provider {
            merged = account.to_document();
        }
        if let Some(recovery) = &self.recovery_provider {
            for (key, value) in recovery.to_document() {
                if let Some(existing) = merged.get(&key) {
                    if *existing != value {
                        return Err(ConfigDocumentError {
                            key,
                            lhs: existing.clone(),
                            rhs: value,
                        });
                    }
                } else {
                    merged.insert(key, value);
                }
            }
        }
        Ok(merged)
    }
}

/// Builder for [`Registry`].
#[derive(Default)]
pub struct RegistryBuilder {
    account_provider: Option<AccountProvider>,
    recovery_provider: Option<RecoveryProvider>,
    allow_unsafe_urls: bool,
    http_timeout: Option<Duration>,
    cache: Option<Arc<dyn ConfigCache>>,
}

impl RegistryBuilder {
    /// Run this process as the given account provider.
    pub fn account_provider(mut self, provider: AccountProvider) -> Self {
        self.account_provider = Some(provider);
        self
    }

    /// Run this process as the given recovery provider.
    pub fn recovery_provider(mut self, provider: RecoveryProvider) -> Self {
        self.recovery_provider = Some(provider);
        self
    }

    /// Accept non-https URLs in provider configuration. Development only.
    pub fn allow_unsafe_urls(mut self, allow: bool) -> Self {
        self.allow_unsafe_urls = allow;
        self
    }

    /// Timeout for configuration fetches. Defaults to ten seconds.
    pub fn http_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout = Some(timeout);
        self
    }

    /// Cache for fetched peer configuration bodies.
    pub fn config_cache(mut self, cache: Arc<dyn ConfigCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn build(self) -> Result<Registry, ProviderConfigError> {
        let http = reqwest::blocking::Client::builder()
            .timeout(self.http_timeout.unwrap_or(DEFAULT_HTTP_TIMEOUT))
            .build()
            .map_err(|e| ProviderConfigError::Client(e.to_string()))?;

        Ok(Registry {
            account_provider: self.account_provider.map(Arc::new),
            recovery_provider: self.recovery_provider.map(Arc::new),
            allowed_account_origins: RwLock::new(HashSet::new()),
            allowed_recovery_origins: RwLock::new(HashSet::new()),
            allow_unsafe_urls: self.allow_unsafe_urls,
            http,
            cache: self.cache,
        })
    }
}
