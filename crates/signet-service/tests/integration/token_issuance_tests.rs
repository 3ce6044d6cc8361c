//! Integration tests for token issuance (`creds/<role>` and `sign/<role>`).

use reqwest::StatusCode;
use serde_json::json;
use signet_service::backend::MAIN_POLICY_NAME;
use signet_test_utils::{
    decode_claims_unverified, decode_kid, stored_latest_version, verify_against_version,
    TestServer,
};

async fn setup_role(
    server: &TestServer,
    role_body: serde_json::Value,
    config_extra: serde_json::Value,
) -> Result<(), anyhow::Error> {
    let client = reqwest::Client::new();

    let mut config = json!({
        "url": "http://registry.local:6333",
        "sign_key": "test-api-key",
    });
    if let (Some(base), Some(extra)) = (config.as_object_mut(), config_extra.as_object()) {
        for (key, value) in extra {
            base.insert(key.clone(), value.clone());
        }
    }

    let response = client
        .post(format!("{}/config", server.url()))
        .json(&config)
        .send()
        .await?;
    anyhow::ensure!(response.status() == StatusCode::NO_CONTENT);

    let response = client
        .put(format!("{}/roles/write", server.url()))
        .json(&role_body)
        .send()
        .await?;
    anyhow::ensure!(response.status() == StatusCode::NO_CONTENT);

    Ok(())
}

/// Scenario A: a role with claim `{access: "w"}` under a config with
/// `jwt_ttl = 3s` yields a token whose decoded `exp` is `issue time + 3s`
/// and whose claims carry the role's claim set.
#[tokio::test]
async fn creds_issues_token_with_role_claims_and_exp() -> Result<(), anyhow::Error> {
    let server = TestServer::spawn().await?;
    let client = reqwest::Client::new();

    setup_role(
        &server,
        json!({"claims": {"access": "w"}}),
        json!({"jwt_ttl": "3s"}),
    )
    .await?;

    let before = chrono::Utc::now().timestamp();
    let response = client
        .get(format!("{}/creds/write", server.url()))
        .send()
        .await?;
    let after = chrono::Utc::now().timestamp();

    assert_eq!(response.status(), StatusCode::OK);
    let body: serde_json::Value = response.json().await?;
    assert_eq!(body["ttl"], 3);

    let token = body["token"].as_str().expect("token in response");
    let claims = decode_claims_unverified(token)?;

    assert_eq!(claims["access"], "w");
    assert_eq!(claims["iss"], "write");

    let exp = claims["exp"].as_i64().expect("numeric exp claim");
    assert!(
        exp >= before + 3 && exp <= after + 3,
        "exp must be issue time + 3s (got {exp}, issued between {before} and {after})"
    );

    // The token verifies against the key version that signed it.
    let verified = verify_against_version(
        server.storage(),
        &server.master_key(),
        MAIN_POLICY_NAME,
        1,
        token,
    )
    .await?;
    assert_eq!(verified["access"], "w");

    Ok(())
}

#[tokio::test]
async fn creds_for_unknown_role_returns_not_found() -> Result<(), anyhow::Error> {
    let server = TestServer::spawn().await?;

    let response = reqwest::get(format!("{}/creds/ghost", server.url())).await?;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let body: serde_json::Value = response.json().await?;
    assert_eq!(body["error"]["code"], "not_found");

    Ok(())
}

/// Role-level TTL takes precedence over the mount-wide default.
#[tokio::test]
async fn role_ttl_overrides_mount_ttl() -> Result<(), anyhow::Error> {
    let server = TestServer::spawn().await?;
    let client = reqwest::Client::new();

    setup_role(
        &server,
        json!({"claims": {"access": "w"}, "jwt_ttl": "7s"}),
        json!({"jwt_ttl": "3s"}),
    )
    .await?;

    let before = chrono::Utc::now().timestamp();
    let body: serde_json::Value = client
        .get(format!("{}/creds/write", server.url()))
        .send()
        .await?
        .json()
        .await?;
    let after = chrono::Utc::now().timestamp();

    assert_eq!(body["ttl"], 7);

    let claims = decode_claims_unverified(body["token"].as_str().expect("token"))?;
    let exp = claims["exp"].as_i64().expect("numeric exp claim");
    assert!(exp >= before + 7 && exp <= after + 7);

    Ok(())
}

/// The sign surface merges caller-supplied claims beneath the role's
/// configured claims: freeform claims survive, role claims win on conflict.
#[tokio::test]
async fn sign_merges_freeform_claims_under_role_claims() -> Result<(), anyhow::Error> {
    let server = TestServer::spawn().await?;
    let client = reqwest::Client::new();

    setup_role(&server, json!({"claims": {"access": "w"}}), json!({})).await?;

    let response = client
        .post(format!("{}/sign/write", server.url()))
        .json(&json!({"claims": {"sub": "alice", "access": "forged"}}))
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::OK);

    let body: serde_json::Value = response.json().await?;
    let claims = decode_claims_unverified(body["token"].as_str().expect("token"))?;

    assert_eq!(claims["sub"], "alice", "freeform claim preserved");
    assert_eq!(claims["access"], "w", "role claim wins on conflict");
    assert_eq!(claims["iss"], "write");

    Ok(())
}

/// Tokens carry a `kid` header identifying the signing key version.
#[tokio::test]
async fn issued_tokens_carry_a_kid_header() -> Result<(), anyhow::Error> {
    let server = TestServer::spawn().await?;
    let client = reqwest::Client::new();

    setup_role(&server, json!({"claims": {}}), json!({})).await?;

    let body: serde_json::Value = client
        .get(format!("{}/creds/write", server.url()))
        .send()
        .await?
        .json()
        .await?;

    let kid = decode_kid(body["token"].as_str().expect("token"))?;
    assert!(!kid.is_empty());

    Ok(())
}

/// N concurrent first requests race on creating the signing policy; exactly
/// one version-1 key must be persisted.
#[tokio::test]
async fn concurrent_first_issuance_creates_one_key() -> Result<(), anyhow::Error> {
    let server = TestServer::spawn().await?;

    setup_role(&server, json!({"claims": {"access": "w"}}), json!({})).await?;

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let url = format!("{}/creds/write", server.url());
        tasks.push(tokio::spawn(async move {
            let response = reqwest::get(url).await?;
            anyhow::ensure!(response.status() == StatusCode::OK);
            Ok::<_, anyhow::Error>(())
        }));
    }

    for task in tasks {
        task.await??;
    }

    assert_eq!(
        stored_latest_version(server.storage(), MAIN_POLICY_NAME).await?,
        1
    );

    Ok(())
}

/// Reconfiguring the signing algorithm force-rotates the key; subsequently
/// issued tokens are signed by the new version under the new algorithm.
#[tokio::test]
async fn algorithm_change_rotates_and_signs_with_new_key_type() -> Result<(), anyhow::Error> {
    let server = TestServer::spawn().await?;
    let client = reqwest::Client::new();

    setup_role(&server, json!({"claims": {"access": "w"}}), json!({})).await?;

    // Materialize the policy under ES256.
    let body: serde_json::Value = client
        .get(format!("{}/creds/write", server.url()))
        .send()
        .await?
        .json()
        .await?;
    let old_kid = decode_kid(body["token"].as_str().expect("token"))?;

    // Reconfigure to RS256: persist config, then rotate (in that order).
    let response = client
        .post(format!("{}/config", server.url()))
        .json(&json!({
            "url": "http://registry.local:6333",
            "sign_key": "test-api-key",
            "sig_alg": "RS256",
        }))
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    assert_eq!(
        stored_latest_version(server.storage(), MAIN_POLICY_NAME).await?,
        2
    );

    let body: serde_json::Value = client
        .get(format!("{}/creds/write", server.url()))
        .send()
        .await?
        .json()
        .await?;
    let token = body["token"].as_str().expect("token");

    let new_kid = decode_kid(token)?;
    assert_ne!(old_kid, new_kid);

    let verified = verify_against_version(
        server.storage(),
        &server.master_key(),
        MAIN_POLICY_NAME,
        2,
        token,
    )
    .await?;
    assert_eq!(verified["access"], "w");

    Ok(())
}
