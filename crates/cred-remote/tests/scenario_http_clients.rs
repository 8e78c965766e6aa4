//! HTTP client behaviour against a local mock server.
//!
//! # Invariants under test
//! 1. Requests carry the bearer token from the injected credential provider.
//! 2. A 401 invalidates cached credentials and the request is retried once.
//! 3. 5xx answers are retried up to the policy; the final failure is `Api`.
//! 4. Listings that must be complete fail closed on a partial page.
//! 5. Verification pages follow same-origin `next` links verbatim.
//! 6. The OAuth token source posts a client_credentials grant and is cached.
//!
//! No external network: every request goes to an in-process httpmock server.

use std::sync::Arc;
use std::time::Duration;

use cred_remote::{
    CachedCredential, HttpNetworkClient, HttpVerificationClient, NetworkClient,
    OAuthClientCredentials, ProviderFields, ProviderFilter, RemoteError, RetryPolicy,
    StaticCredential, VerificationClient,
};
use httpmock::prelude::*;
use httpmock::Method::PATCH;
use serde_json::json;

fn network(server: &MockServer) -> HttpNetworkClient {
    HttpNetworkClient::new(
        server.url("/api"),
        Arc::new(StaticCredential::new("push-key")),
    )
    .with_retry(RetryPolicy {
        max_attempts: 2,
        base_delay: Duration::from_millis(1),
    })
}

// ---------------------------------------------------------------------------
// Push network
// ---------------------------------------------------------------------------

#[tokio::test]
async fn list_providers_sends_filter_and_bearer() {
    let server = MockServer::start_async().await;
    let m = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/api/providers/")
                .query_param("npi", "1000000004")
                .header("authorization", "Bearer push-key");
            then.status(200).json_body(json!({
                "count": 1,
                "next": null,
                "results": [{"id": "np-1", "npi": "1000000004", "organization_name": "Group"}]
            }));
        })
        .await;

    let page = network(&server)
        .list_providers(&ProviderFilter::by_npi("1000000004"))
        .await
        .unwrap();

    m.assert_async().await;
    assert_eq!(page.count, 1);
    assert_eq!(page.results[0].id, "np-1");
    assert!(!page.is_partial());
}

#[tokio::test]
async fn create_provider_posts_fields() {
    let server = MockServer::start_async().await;
    let m = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/api/providers/")
                .json_body(json!({
                    "npi": "1234567893",
                    "first_name": "Ada",
                    "last_name": "Lovelace",
                    "organization_name": null
                }));
            then.status(201).json_body(json!({
                "id": "np-9", "npi": "1234567893", "first_name": "Ada", "last_name": "Lovelace"
            }));
        })
        .await;

    let created = network(&server)
        .create_provider(&ProviderFields::individual(
            "1234567893",
            Some("Ada"),
            Some("Lovelace"),
        ))
        .await
        .unwrap();

    m.assert_async().await;
    assert_eq!(created.id, "np-9");
}

#[tokio::test]
async fn partial_span_listing_fails_closed() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/api/providers/np-1/credentialing-spans/");
            then.status(200).json_body(json!({
                "count": 3,
                "next": server_next(),
                "results": []
            }));
        })
        .await;

    let err = network(&server)
        .list_credentialing_spans("np-1")
        .await
        .unwrap_err();
    assert!(
        matches!(err, RemoteError::PaginationUnsupported { ref resource } if resource == "credentialing_spans"),
        "got: {err}"
    );
}

fn server_next() -> &'static str {
    "http://127.0.0.1:1/api/providers/np-1/credentialing-spans/?page=2"
}

#[tokio::test]
async fn delete_span_accepts_no_content() {
    let server = MockServer::start_async().await;
    let m = server
        .mock_async(|when, then| {
            when.method(DELETE).path("/api/credentialing-spans/sp-1/");
            then.status(204);
        })
        .await;

    network(&server)
        .delete_credentialing_span("sp-1")
        .await
        .unwrap();
    m.assert_async().await;
}

#[tokio::test]
async fn server_errors_are_retried_then_surface_as_api() {
    let server = MockServer::start_async().await;
    let m = server
        .mock_async(|when, then| {
            when.method(GET).path("/api/payers/");
            then.status(503).body("maintenance");
        })
        .await;

    let err = network(&server).search_payers("Acme").await.unwrap_err();
    assert_eq!(m.hits_async().await, 2);
    assert_eq!(
        err,
        RemoteError::Api {
            status: 503,
            message: "maintenance".to_string()
        }
    );
}

#[tokio::test]
async fn client_errors_are_not_retried() {
    let server = MockServer::start_async().await;
    let m = server
        .mock_async(|when, then| {
            when.method(PATCH).path("/api/providers/np-1/");
            then.status(422).body("npi invalid");
        })
        .await;

    let err = network(&server)
        .update_provider("np-1", &ProviderFields::individual("1", None, None))
        .await
        .unwrap_err();
    assert_eq!(m.hits_async().await, 1);
    assert_eq!(err.status(), Some(422));
}

// ---------------------------------------------------------------------------
// Pull verification system
// ---------------------------------------------------------------------------

#[tokio::test]
async fn verification_follows_same_origin_next() {
    let server = MockServer::start_async().await;
    let next = server.url("/v1/licenses/?cursor=abc");

    let first = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/v1/licenses/")
                .query_param("page_size", "500");
            then.status(200).json_body(json!({
                "count": 2,
                "next": next,
                "results": [{"id": "L1", "state": "FL"}]
            }));
        })
        .await;
    let second = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/v1/licenses/")
                .query_param("cursor", "abc");
            then.status(200).json_body(json!({
                "count": 2,
                "next": null,
                "results": [{"id": "L2", "state": "GA"}]
            }));
        })
        .await;

    let client = HttpVerificationClient::new(
        server.url("/v1"),
        Arc::new(StaticCredential::new("pull-token")),
    )
    .unwrap();

    let p1 = client.licenses_page(None).await.unwrap();
    let p2 = client.licenses_page(p1.next.clone()).await.unwrap();

    first.assert_async().await;
    second.assert_async().await;
    assert_eq!(p1.results[0].id, "L1");
    assert_eq!(p2.results[0].id, "L2");
    assert_eq!(p2.next, None);
}

#[tokio::test]
async fn oauth_token_is_fetched_once_and_reused() {
    let server = MockServer::start_async().await;
    let token = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/oauth/token")
                .body_contains("grant_type=client_credentials");
            then.status(200)
                .json_body(json!({"access_token": "oauth-abc", "expires_in": 3600}));
        })
        .await;
    let providers = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/v1/providers/")
                .header("authorization", "Bearer oauth-abc");
            then.status(200)
                .json_body(json!({"count": 0, "next": null, "results": []}));
        })
        .await;

    let cred = CachedCredential::new(OAuthClientCredentials::new(
        server.url("/oauth/token"),
        "id".to_string(),
        "secret".to_string(),
    ));
    let client = HttpVerificationClient::new(server.url("/v1"), Arc::new(cred)).unwrap();

    client.providers_page(None).await.unwrap();
    client.providers_page(None).await.unwrap();

    assert_eq!(token.hits_async().await, 1);
    assert_eq!(providers.hits_async().await, 2);
}

#[tokio::test]
async fn rejected_oauth_credentials_are_auth_errors() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/oauth/token");
            then.status(401);
        })
        .await;

    let cred = CachedCredential::new(OAuthClientCredentials::new(
        server.url("/oauth/token"),
        "id".to_string(),
        "wrong".to_string(),
    ));
    let client = HttpVerificationClient::new(server.url("/v1"), Arc::new(cred)).unwrap();

    let err = client.board_certificates_page(None).await.unwrap_err();
    assert!(matches!(err, RemoteError::Auth(_)), "got: {err}");
}

#[tokio::test]
async fn unauthorized_answer_refreshes_token_and_retries_once() {
    let server = MockServer::start_async().await;
    let token = server
        .mock_async(|when, then| {
            when.method(POST).path("/oauth/token");
            then.status(200)
                .json_body(json!({"access_token": "stale-or-not", "expires_in": 3600}));
        })
        .await;
    let licenses = server
        .mock_async(|when, then| {
            when.method(GET).path("/v1/licenses/");
            then.status(401).body("token revoked");
        })
        .await;

    let cred = CachedCredential::new(OAuthClientCredentials::new(
        server.url("/oauth/token"),
        "id".to_string(),
        "secret".to_string(),
    ));
    let client = HttpVerificationClient::new(server.url("/v1"), Arc::new(cred))
        .unwrap()
        .with_retry(RetryPolicy::none());

    let err = client.licenses_page(None).await.unwrap_err();
    assert!(matches!(err, RemoteError::Auth(_)), "got: {err}");
    assert_eq!(token.hits_async().await, 2);
    assert_eq!(licenses.hits_async().await, 2);
}
