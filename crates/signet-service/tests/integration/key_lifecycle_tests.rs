//! Integration tests for the key lifecycle: scheduled rotation, pruning,
//! and the verifiability window of previously issued tokens.
//!
//! Time is simulated by backdating the stored key creation timestamps and
//! invalidating the policy cache, then invoking the periodic driver the way
//! the host scheduler would.

use reqwest::StatusCode;
use serde_json::json;
use signet_service::backend::MAIN_POLICY_NAME;
use signet_service::services::rotation_service;
use signet_test_utils::{
    decode_kid, rotation_time, stored_latest_version, stored_version_exists,
    verify_against_version, TestServer,
};
use std::time::Duration;

const ROTATION_PERIOD: Duration = Duration::from_secs(3600);

async fn setup(server: &TestServer) -> Result<(), anyhow::Error> {
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{}/config", server.url()))
        .json(&json!({
            "url": "http://registry.local:6333",
            "sign_key": "test-api-key",
            "key_ttl": "1h",
            "jwt_ttl": "60s",
        }))
        .send()
        .await?;
    anyhow::ensure!(response.status() == StatusCode::NO_CONTENT);

    let response = client
        .put(format!("{}/roles/write", server.url()))
        .json(&json!({"claims": {"access": "w"}}))
        .send()
        .await?;
    anyhow::ensure!(response.status() == StatusCode::NO_CONTENT);

    Ok(())
}

async fn issue_token(server: &TestServer) -> Result<String, anyhow::Error> {
    let body: serde_json::Value = reqwest::get(format!("{}/creds/write", server.url()))
        .await?
        .json()
        .await?;
    body["token"]
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| anyhow::anyhow!("no token in response"))
}

/// Scenario D, first half: once the rotation period has passed, the
/// periodic driver increments `latest_version` by exactly one, and a token
/// signed before the tick still verifies against its original (now
/// non-latest) version.
#[tokio::test]
async fn scheduled_rotation_preserves_old_version_for_verification(
) -> Result<(), anyhow::Error> {
    let server = TestServer::spawn().await?;
    setup(&server).await?;

    let token_before = issue_token(&server).await?;
    assert_eq!(
        stored_latest_version(server.storage(), MAIN_POLICY_NAME).await?,
        1
    );

    // Age the key past the rotation period, but short of the prune window
    // (rotation_period + token_ttl).
    rotation_time::backdate_all(
        server.storage(),
        MAIN_POLICY_NAME,
        ROTATION_PERIOD + Duration::from_secs(30),
    )
    .await?;
    server.backend().invalidate("policy/main").await;

    rotation_service::run_once(server.backend()).await?;

    assert_eq!(
        stored_latest_version(server.storage(), MAIN_POLICY_NAME).await?,
        2
    );
    assert!(
        stored_version_exists(server.storage(), MAIN_POLICY_NAME, 1).await?,
        "rotation keeps prior versions reachable"
    );

    // Idempotence: an immediate second tick must not double-rotate.
    rotation_service::run_once(server.backend()).await?;
    assert_eq!(
        stored_latest_version(server.storage(), MAIN_POLICY_NAME).await?,
        2,
        "latest_version increases by exactly 1, not 2"
    );

    // The pre-rotation token verifies against version 1, and a fresh token
    // is signed by version 2 under a different kid.
    let verified = verify_against_version(
        server.storage(),
        &server.master_key(),
        MAIN_POLICY_NAME,
        1,
        &token_before,
    )
    .await?;
    assert_eq!(verified["access"], "w");

    let token_after = issue_token(&server).await?;
    assert_ne!(decode_kid(&token_before)?, decode_kid(&token_after)?);

    verify_against_version(
        server.storage(),
        &server.master_key(),
        MAIN_POLICY_NAME,
        2,
        &token_after,
    )
    .await?;

    Ok(())
}

/// Scenario D, second half: once `rotation_period + token_ttl` has elapsed
/// for a non-latest version, pruning removes it and the old token can no
/// longer be verified.
#[tokio::test]
async fn pruning_removes_versions_past_the_verification_window() -> Result<(), anyhow::Error> {
    let server = TestServer::spawn().await?;
    setup(&server).await?;

    let token_before = issue_token(&server).await?;

    // First pass: rotate, keep version 1 (still inside its window).
    rotation_time::backdate_all(
        server.storage(),
        MAIN_POLICY_NAME,
        ROTATION_PERIOD + Duration::from_secs(30),
    )
    .await?;
    server.backend().invalidate("policy/main").await;
    rotation_service::run_once(server.backend()).await?;

    assert!(stored_version_exists(server.storage(), MAIN_POLICY_NAME, 1).await?);

    // Second pass: age everything another token_ttl; version 1 is now past
    // creation + rotation_period + token_ttl and must be pruned. Version 2
    // is nowhere near its rotation age.
    rotation_time::backdate_all(
        server.storage(),
        MAIN_POLICY_NAME,
        Duration::from_secs(60),
    )
    .await?;
    server.backend().invalidate("policy/main").await;
    rotation_service::run_once(server.backend()).await?;

    assert_eq!(
        stored_latest_version(server.storage(), MAIN_POLICY_NAME).await?,
        2
    );
    assert!(
        !stored_version_exists(server.storage(), MAIN_POLICY_NAME, 1).await?,
        "version 1 must be pruned after its verification window"
    );

    // The pruned version can no longer verify the old token.
    let result = verify_against_version(
        server.storage(),
        &server.master_key(),
        MAIN_POLICY_NAME,
        1,
        &token_before,
    )
    .await;
    assert!(result.is_err());

    // Issuance continues against the surviving version.
    let token = issue_token(&server).await?;
    verify_against_version(
        server.storage(),
        &server.master_key(),
        MAIN_POLICY_NAME,
        2,
        &token,
    )
    .await?;

    Ok(())
}

/// The periodic driver must be safe to run concurrently with request
/// traffic: ticks and issuance interleave without error and without
/// over-rotating.
#[tokio::test]
async fn maintenance_runs_concurrently_with_issuance() -> Result<(), anyhow::Error> {
    let server = TestServer::spawn().await?;
    setup(&server).await?;

    issue_token(&server).await?;

    let mut tasks = Vec::new();
    for _ in 0..4 {
        let url = format!("{}/creds/write", server.url());
        tasks.push(tokio::spawn(async move {
            for _ in 0..5 {
                let response = reqwest::get(&url).await?;
                anyhow::ensure!(response.status() == StatusCode::OK);
            }
            Ok::<_, anyhow::Error>(())
        }));
    }

    for _ in 0..5 {
        rotation_service::run_once(server.backend()).await?;
    }

    for task in tasks {
        task.await??;
    }

    // Nothing aged past the rotation period, so no rotation happened.
    assert_eq!(
        stored_latest_version(server.storage(), MAIN_POLICY_NAME).await?,
        1
    );

    Ok(())
}

#[tokio::test]
async fn metrics_endpoint_responds() -> Result<(), anyhow::Error> {
    let server = TestServer::spawn().await?;

    let response = reqwest::get(format!("{}/metrics", server.url())).await?;
    assert_eq!(response.status(), StatusCode::OK);

    Ok(())
}
