//! Integration tests for the config and role CRUD surfaces.

use reqwest::StatusCode;
use serde_json::json;
use signet_service::storage::Storage;
use signet_test_utils::TestServer;

/// Write a valid mount configuration with the given extra fields merged in.
async fn write_config(
    server: &TestServer,
    extra: serde_json::Value,
) -> Result<reqwest::Response, anyhow::Error> {
    let mut body = json!({
        "url": "http://registry.local:6333",
        "sign_key": "test-api-key",
    });
    if let (Some(base), Some(extra)) = (body.as_object_mut(), extra.as_object()) {
        for (key, value) in extra {
            base.insert(key.clone(), value.clone());
        }
    }

    let client = reqwest::Client::new();
    Ok(client
        .post(format!("{}/config", server.url()))
        .json(&body)
        .send()
        .await?)
}

#[tokio::test]
async fn config_write_then_read_round_trips() -> Result<(), anyhow::Error> {
    let server = TestServer::spawn().await?;
    let client = reqwest::Client::new();

    let response = write_config(&server, json!({"key_ttl": "4h", "jwt_ttl": "30s"})).await?;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = client
        .get(format!("{}/config", server.url()))
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::OK);

    let body: serde_json::Value = response.json().await?;
    assert_eq!(body["url"], "http://registry.local:6333");
    assert_eq!(body["sig_alg"], "ES256");
    assert_eq!(body["rsa_key_bits"], 2048);
    assert_eq!(body["key_ttl"], "4h");
    assert_eq!(body["jwt_ttl"], "30s");

    // The sign key is a live credential and must never be echoed back.
    assert!(body.get("sign_key").is_none());

    Ok(())
}

#[tokio::test]
async fn config_read_before_any_write_returns_not_found() -> Result<(), anyhow::Error> {
    let server = TestServer::spawn().await?;
    let client = reqwest::Client::new();

    let response = client
        .get(format!("{}/config", server.url()))
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let body: serde_json::Value = response.json().await?;
    assert_eq!(body["error"]["code"], "not_found");

    Ok(())
}

/// Scenario B: a jwt_ttl beyond the mount's maximum lease TTL is rejected
/// and the stored configuration is left unchanged.
#[tokio::test]
async fn config_rejects_jwt_ttl_beyond_max_lease() -> Result<(), anyhow::Error> {
    let server = TestServer::spawn().await?;
    let client = reqwest::Client::new();

    // Nothing stored yet: the rejected write must not initialize anything.
    let response = write_config(&server, json!({"jwt_ttl": "800h"})).await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body: serde_json::Value = response.json().await?;
    assert_eq!(body["error"]["code"], "invalid_parameters");

    let response = client
        .get(format!("{}/config", server.url()))
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    // Now store a valid config and verify a rejected update leaves it alone.
    let response = write_config(&server, json!({"jwt_ttl": "30s"})).await?;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = write_config(&server, json!({"jwt_ttl": "800h"})).await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body: serde_json::Value = client
        .get(format!("{}/config", server.url()))
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(body["jwt_ttl"], "30s", "stored config must be unchanged");

    Ok(())
}

#[tokio::test]
async fn config_rejects_unsupported_algorithm_and_key_size() -> Result<(), anyhow::Error> {
    let server = TestServer::spawn().await?;

    let response = write_config(&server, json!({"sig_alg": "ES512"})).await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response =
        write_config(&server, json!({"sig_alg": "RS256", "rsa_key_bits": 1024})).await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    Ok(())
}

#[tokio::test]
async fn config_rejects_missing_required_fields() -> Result<(), anyhow::Error> {
    let server = TestServer::spawn().await?;
    let client = reqwest::Client::new();

    // Empty url fails validation.
    let response = client
        .post(format!("{}/config", server.url()))
        .json(&json!({"url": "", "sign_key": "k"}))
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    Ok(())
}

/// Scenario C: creating a role on a mount with no configuration fails with
/// "config not found" and writes nothing.
#[tokio::test]
async fn role_create_without_config_fails_with_not_found() -> Result<(), anyhow::Error> {
    let server = TestServer::spawn().await?;
    let client = reqwest::Client::new();

    let response = client
        .put(format!("{}/roles/writer", server.url()))
        .json(&json!({"claims": {"access": "w"}}))
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let body: serde_json::Value = response.json().await?;
    assert_eq!(body["error"]["code"], "not_found");

    // No storage write occurred, and the registry was never called.
    assert!(server.storage().get("role/writer").await?.is_none());
    assert!(server.registry().upserted_roles().is_empty());

    Ok(())
}

#[tokio::test]
async fn role_crud_and_list() -> Result<(), anyhow::Error> {
    let server = TestServer::spawn().await?;
    let client = reqwest::Client::new();

    write_config(&server, json!({})).await?;

    for name in ["alpha", "beta"] {
        let response = client
            .put(format!("{}/roles/{name}", server.url()))
            .json(&json!({"claims": {"access": "r"}, "jwt_ttl": "30s"}))
            .send()
            .await?;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }

    let body: serde_json::Value = client
        .get(format!("{}/roles/alpha", server.url()))
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(body["name"], "alpha");
    assert_eq!(body["claims"]["access"], "r");
    assert_eq!(body["jwt_ttl"], "30s");

    let body: serde_json::Value = client
        .get(format!("{}/roles", server.url()))
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(body["roles"], json!(["alpha", "beta"]));

    let response = client
        .delete(format!("{}/roles/alpha", server.url()))
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = client
        .get(format!("{}/roles/alpha", server.url()))
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    assert_eq!(server.registry().removed_roles(), vec!["alpha".to_string()]);

    Ok(())
}

#[tokio::test]
async fn role_rejects_ttl_beyond_max_lease() -> Result<(), anyhow::Error> {
    let server = TestServer::spawn().await?;
    let client = reqwest::Client::new();

    write_config(&server, json!({})).await?;

    let response = client
        .put(format!("{}/roles/greedy", server.url()))
        .json(&json!({"claims": {}, "jwt_ttl": "800h"}))
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    assert!(server.storage().get("role/greedy").await?.is_none());

    Ok(())
}

/// The role write is two-phase: if the registry mirror fails, the local
/// write must not happen, so the two stores cannot silently diverge.
#[tokio::test]
async fn role_write_is_aborted_when_registry_fails() -> Result<(), anyhow::Error> {
    let server = TestServer::spawn().await?;
    let client = reqwest::Client::new();

    write_config(&server, json!({})).await?;

    server.registry().set_fail(true);
    let response = client
        .put(format!("{}/roles/mirrored", server.url()))
        .json(&json!({"claims": {"access": "w"}}))
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert!(server.storage().get("role/mirrored").await?.is_none());

    // The registry recovers; the retried write commits both sides.
    server.registry().set_fail(false);
    let response = client
        .put(format!("{}/roles/mirrored", server.url()))
        .json(&json!({"claims": {"access": "w"}}))
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert!(server.storage().get("role/mirrored").await?.is_some());
    assert_eq!(
        server.registry().upserted_roles(),
        vec!["mirrored".to_string()]
    );

    Ok(())
}

#[tokio::test]
async fn config_delete_cascades_to_roles() -> Result<(), anyhow::Error> {
    let server = TestServer::spawn().await?;
    let client = reqwest::Client::new();

    write_config(&server, json!({})).await?;

    for name in ["one", "two"] {
        client
            .put(format!("{}/roles/{name}", server.url()))
            .json(&json!({"claims": {}}))
            .send()
            .await?;
    }

    let response = client
        .delete(format!("{}/config", server.url()))
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = client
        .get(format!("{}/config", server.url()))
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let body: serde_json::Value = client
        .get(format!("{}/roles", server.url()))
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(body["roles"], json!([]));

    let mut removed = server.registry().removed_roles();
    removed.sort();
    assert_eq!(removed, vec!["one".to_string(), "two".to_string()]);

    Ok(())
}

#[tokio::test]
async fn health_endpoint_responds() -> Result<(), anyhow::Error> {
    let server = TestServer::spawn().await?;

    let response = reqwest::get(format!("{}/health", server.url())).await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.text().await?, "OK");

    Ok(())
}
