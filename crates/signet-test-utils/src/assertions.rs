//! JWT decoding and verification helpers for tests.

use anyhow::Context;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use jsonwebtoken::{decode, decode_header, DecodingKey, Validation};
use signet_service::crypto::{self, KeyType};
use signet_service::keyring::KeyPolicy;
use signet_service::storage::Storage;

/// Decode the claims of a token WITHOUT verifying the signature. Use for
/// asserting on claim contents (including of deliberately expired tokens).
pub fn decode_claims_unverified(token: &str) -> anyhow::Result<serde_json::Value> {
    let mut parts = token.split('.');
    let _header = parts.next().context("missing header segment")?;
    let payload = parts.next().context("missing payload segment")?;

    let bytes = URL_SAFE_NO_PAD.decode(payload)?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Extract the `kid` header of a token.
pub fn decode_kid(token: &str) -> anyhow::Result<String> {
    let header = decode_header(token)?;
    header.kid.context("token has no kid header")
}

/// Verify `token` against a specific stored key version of `policy_name`,
/// returning the verified claims.
///
/// Fails if the version has been pruned, if the signature does not match
/// that version's key, or if the token has expired (zero leeway).
pub async fn verify_against_version(
    storage: &dyn Storage,
    master_key: &[u8],
    policy_name: &str,
    version: u32,
    token: &str,
) -> anyhow::Result<serde_json::Value> {
    let policy = KeyPolicy::load(storage, policy_name)
        .await?
        .context("no policy stored")?;

    let key_version = policy
        .keys
        .get(&version)
        .with_context(|| format!("key version {version} not present (pruned?)"))?;

    let material = crypto::open_key_material(&key_version.key_material, master_key)?;
    let public = crypto::public_key_der(policy.key_type, &material)?;

    let decoding_key = match policy.key_type {
        KeyType::EcdsaP256 | KeyType::EcdsaP384 => DecodingKey::from_ec_der(&public),
        KeyType::Rsa2048 | KeyType::Rsa3072 | KeyType::Rsa4096 => {
            DecodingKey::from_rsa_der(&public)
        }
    };

    let header = decode_header(token)?;
    let mut validation = Validation::new(header.alg);
    validation.leeway = 0;

    let data = decode::<serde_json::Value>(token, &decoding_key, &validation)?;
    Ok(data.claims)
}

/// The stored policy's latest version.
pub async fn stored_latest_version(
    storage: &dyn Storage,
    policy_name: &str,
) -> anyhow::Result<u32> {
    let policy = KeyPolicy::load(storage, policy_name)
        .await?
        .context("no policy stored")?;
    Ok(policy.latest_version)
}

/// Whether the stored policy still holds key material for `version`.
pub async fn stored_version_exists(
    storage: &dyn Storage,
    policy_name: &str,
    version: u32,
) -> anyhow::Result<bool> {
    let policy = KeyPolicy::load(storage, policy_name)
        .await?
        .context("no policy stored")?;
    Ok(policy.keys.contains_key(&version))
}
