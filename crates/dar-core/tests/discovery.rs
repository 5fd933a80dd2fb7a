//! Remote provider discovery over HTTP, exercised against a local mock
//! server.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use dar_core::{
    MemoryConfigCache, Provider, ProviderConfigError, Registry, ResolveError,
    WELL_KNOWN_CONFIG_PATH,
};

fn account_document(origin: &str) -> String {
    json!({
        "issuer": origin,
        "tokensign-pubkeys-secp256r1": ["a-public-key"],
        "save-token-return": format!("{origin}/save-token-return"),
        "recover-account-return": format!("{origin}/recover-account-return"),
        "privacy-policy": format!("{origin}/privacy"),
        "icon-152px": format!("{origin}/icon.png")
    })
    .to_string()
}

fn recovery_document(origin: &str) -> String {
    json!({
        "issuer": origin,
        "countersign-pubkeys-secp256r1": ["a-public-key"],
        "token-max-size": 8192,
        "save-token": format!("{origin}/save-token"),
        "recover-account": format!("{origin}/recover-account"),
        "privacy-policy": format!("{origin}/privacy")
    })
    .to_string()
}

fn registry() -> Registry {
    Registry::builder()
        .allow_unsafe_urls(true)
        .http_timeout(Duration::from_secs(2))
        .build()
        .unwrap()
}

#[test]
fn fetches_remote_account_provider() {
    let mut server = mockito::Server::new();
    let origin = server.url();
    let mock = server
        .mock("GET", format!("/{WELL_KNOWN_CONFIG_PATH}").as_str())
        .with_status(200)
        .with_body(account_document(&origin))
        .create();

    let registry = registry();
    registry.register_account_provider(&origin);
    let provider = registry.account_provider(&origin).unwrap();
    assert_eq!(provider.origin(), origin);
    assert_eq!(provider.unseal_keys(None), vec!["a-public-key"]);
    mock.assert();
}

#[test]
fn fetches_remote_recovery_provider() {
    let mut server = mockito::Server::new();
    let origin = server.url();
    let mock = server
        .mock("GET", format!("/{WELL_KNOWN_CONFIG_PATH}").as_str())
        .with_status(200)
        .with_body(recovery_document(&origin))
        .create();

    let registry = registry();
    registry.register_recovery_provider(&origin);
    let provider = registry.recovery_provider(&origin).unwrap();
    assert_eq!(provider.token_max_size(), 8192);
    mock.assert();
}

#[test]
fn second_lookup_is_served_from_cache() {
    let mut server = mockito::Server::new();
    let origin = server.url();
    let mock = server
        .mock("GET", format!("/{WELL_KNOWN_CONFIG_PATH}").as_str())
        .with_status(200)
        .with_header("cache-control", "public, max-age=120")
        .with_body(account_document(&origin))
        .expect(1)
        .create();

    let registry = Registry::builder()
        .allow_unsafe_urls(true)
        .config_cache(Arc::new(MemoryConfigCache::new()))
        .build()
        .unwrap();
    registry.register_account_provider(&origin);

    registry.account_provider(&origin).unwrap();
    registry.account_provider(&origin).unwrap();
    mock.assert();
}

#[test]
fn without_a_cache_every_lookup_fetches() {
    let mut server = mockito::Server::new();
    let origin = server.url();
    let mock = server
        .mock("GET", format!("/{WELL_KNOWN_CONFIG_PATH}").as_str())
        .with_status(200)
        .with_body(account_document(&origin))
        .expect(2)
        .create();

    let registry = registry();
    registry.register_account_provider(&origin);
    registry.account_provider(&origin).unwrap();
    registry.account_provider(&origin).unwrap();
    mock.assert();
}

#[test]
fn http_error_status_is_reported_with_excerpt() {
    let mut server = mockito::Server::new();
    let origin = server.url();
    server
        .mock("GET", format!("/{WELL_KNOWN_CONFIG_PATH}").as_str())
        .with_status(503)
        .with_body("upstream fell over")
        .create();

    let registry = registry();
    registry.register_account_provider(&origin);
    match registry.account_provider(&origin) {
        Err(ResolveError::Config(ProviderConfigError::Fetch {
            status,
            body_excerpt,
            ..
        })) => {
            assert_eq!(status, 503);
            assert_eq!(body_excerpt, "upstream fell over");
        }
        other => panic!("expected fetch error, got {other:?}"),
    }
}

#[test]
fn non_json_body_is_a_parse_error() {
    let mut server = mockito::Server::new();
    let origin = server.url();
    server
        .mock("GET", format!("/{WELL_KNOWN_CONFIG_PATH}").as_str())
        .with_status(200)
        .with_body("<html>definitely not json</html>")
        .create();

    let registry = registry();
    registry.register_account_provider(&origin);
    assert!(matches!(
        registry.account_provider(&origin),
        Err(ResolveError::Config(ProviderConfigError::Json { .. }))
    ));
}

#[test]
fn invalid_document_reports_each_problem() {
    let mut server = mockito::Server::new();
    let origin = server.url();
    server
        .mock("GET", format!("/{WELL_KNOWN_CONFIG_PATH}").as_str())
        .with_status(200)
        .with_body(json!({ "issuer": origin }).to_string())
        .create();

    let registry = registry();
    registry.register_account_provider(&origin);
    match registry.account_provider(&origin) {
        Err(ResolveError::Config(ProviderConfigError::Invalid { problems, .. })) => {
            assert!(problems.iter().any(|p| p == "save_token_return not set"));
            assert!(problems.iter().any(|p| p == "no public key provided"));
        }
        other => panic!("expected invalid config, got {other:?}"),
    }
}

#[test]
fn unreachable_peer_is_a_transport_error() {
    // Nothing listens on port 9; connection is refused immediately.
    let origin = "http://127.0.0.1:9";
    let registry = registry();
    registry.register_account_provider(origin);
    assert!(matches!(
        registry.account_provider(origin),
        Err(ResolveError::Config(ProviderConfigError::Http { .. }))
    ));
}
