//! End-to-end client tests over a real HTTP server.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use sisync_client::{MemoryTokenStore, ReqwestTransport, SisClient, SisConfig, SisError};

fn client_for(server: &MockServer) -> SisClient {
    let config = SisConfig::new(server.uri(), "the-client-id", "the-secret", "svc-user", "svc-pw");
    let transport = ReqwestTransport::new(Duration::from_secs(5)).unwrap();
    SisClient::new(config, Arc::new(transport), Arc::new(MemoryTokenStore::new()))
}

#[tokio::test]
async fn password_grant_over_http() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/oauth/1.0/access_token"))
        .and(query_param("grant_type", "password"))
        .and(query_param("client_id", "the-client-id"))
        .and(query_param("username", "svc-user"))
        .and(header("client_id", "the-client-id"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "issued-token",
            "refresh_token": "issued-refresh",
            "expires_in": 3600,
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    assert!(client.log_in("svc-user", "svc-pw").await.unwrap());
    assert_eq!(
        client.stored_token().unwrap().unwrap().token,
        "issued-token"
    );
    assert_eq!(
        client.stored_refresh_token().unwrap().as_deref(),
        Some("issued-refresh")
    );
}

#[tokio::test]
async fn rejected_grant_is_an_auth_error() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/oauth/1.0/access_token"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": "invalid_client",
        })))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let err = client.log_in("svc-user", "bad-pw").await.unwrap_err();
    assert!(matches!(err, SisError::Auth(_)));
}

#[tokio::test]
async fn paginated_listing_carries_bearer_token() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/oauth/1.0/access_token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "issued-token",
            "expires_in": 3600,
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/general/sis/1.0/terms"))
        .and(query_param("offset", "0"))
        .and(header("Authorization", "Bearer issued-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [
                {"id": "T9", "name": "Fall", "fileDateForEnrollment": "2026-08-01"},
            ],
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/general/sis/1.0/terms"))
        .and(query_param("offset", "100"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "error": "Offset [100] is larger than list size: 1",
        })))
        .mount(&server)
        .await;

    let client = client_for(&server);
    assert!(client.is_logged_in().await);

    let terms = client.get_active_terms().await.unwrap();
    assert_eq!(terms.len(), 1);
    assert_eq!(terms[0].id, "T9");
    assert_eq!(terms[0].name, "Fall");
}
