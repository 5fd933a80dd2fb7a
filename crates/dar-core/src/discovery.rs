//! Well-known configuration discovery.
//!
//! Peer providers publish a JSON document at a fixed well-known path; we
//! fetch it over HTTPS and cache the raw body briefly so bursts of token
//! validations do not hammer the peer.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde_json::Value;
use tracing::debug;

use crate::error::ProviderConfigError;

/// Path, relative to a provider's origin, of its configuration document.
pub const WELL_KNOWN_CONFIG_PATH: &str = ".well-known/delegated-account-recovery/configuration";

/// Longest TTL we will honor from a peer's Cache-Control header.
const MAX_CACHE_TTL: Duration = Duration::from_secs(300);

/// TTL used when the peer sends no usable Cache-Control max-age.
const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(60);

/// Cache for fetched configuration bodies, keyed by origin-derived strings.
///
/// Implementations decide storage and eviction; `set` receives the TTL the
/// response allows. [`MemoryConfigCache`] is the in-process default.
pub trait ConfigCache: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str, ttl: Duration);
}

/// A simple expiring in-process cache.
#[derive(Default)]
pub struct MemoryConfigCache {
    entries: Mutex<HashMap<String, (String, Instant)>>,
}

impl MemoryConfigCache {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ConfigCache for MemoryConfigCache {
    fn get(&self, key: &str) -> Option<String> {
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some((value, expires)) if *expires > Instant::now() => Some(value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    fn set(&self, key: &str, value: &str, ttl: Duration) {
        self.entries
            .lock()
            .insert(key.to_string(), (value.to_string(), Instant::now() + ttl));
    }
}

pub(crate) fn cache_key(origin: &str) -> String {
    format!("recovery_provider_config:{origin}:configuration")
}

/// Fetch (or return cached) configuration for `origin`, as parsed JSON.
pub(crate) fn fetch_config(
    http: &reqwest::blocking::Client,
    cache: Option<&dyn ConfigCache>,
    origin: &str,
) -> Result<Value, ProviderConfigError> {
    let key = cache_key(origin);
    if let Some(body) = cache.and_then(|c| c.get(&key)) {
        debug!(origin, "provider config cache hit");
        return parse_body(origin, &body);
    }

    let url = format!("{}/{}", origin.trim_end_matches('/'), WELL_KNOWN_CONFIG_PATH);
    debug!(origin, url, "fetching provider config");
    let response = http.get(&url).send().map_err(|source| ProviderConfigError::Http {
        origin: origin.to_string(),
        source,
    })?;

    let status = response.status();
    let ttl = response_ttl(&response);
    let body = response.text().map_err(|source| ProviderConfigError::Http {
        origin: origin.to_string(),
        source,
    })?;

    if !status.is_success() {
        return Err(ProviderConfigError::Fetch {
            origin: origin.to_string(),
            status: status.as_u16(),
            body_excerpt: body.chars().take(100).collect(),
        });
    }

    let config = parse_body(origin, &body)?;
    if let Some(cache) = cache {
        debug!(origin, ttl_seconds = ttl.as_secs(), "caching provider config");
        cache.set(&key, &body, ttl);
    }
    Ok(config)
}

fn parse_body(origin: &str, body: &str) -> Result<Value, ProviderConfigError> {
    serde_json::from_str(body).map_err(|_| ProviderConfigError::Json {
        origin: origin.to_string(),
        body_excerpt: body.chars().take(100).collect(),
    })
}

/// TTL from the response's Cache-Control max-age, clamped so a peer cannot
/// pin a stale document in our cache indefinitely.
fn response_ttl(response: &reqwest::blocking::Response) -> Duration {
    response
        .headers()
        .get(reqwest::header::CACHE_CONTROL)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_max_age)
        .map(|secs| Duration::from_secs(secs).min(MAX_CACHE_TTL))
        .unwrap_or(DEFAULT_CACHE_TTL)
}

fn parse_max_age(header: &str) -> Option<u64> {
    header.split(',').find_map(|directive| {
        let directive = directive.trim();
        directive
            .strip_prefix("max-age=")
            .and_then(|v| v.parse().ok())
    })
}
