use crate::crypto::SignatureAlgorithm;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// Default values for the mount configuration.
pub const DEFAULT_RSA_KEY_BITS: u32 = 2048;
pub const DEFAULT_KEY_ROTATION_PERIOD: Duration = Duration::from_secs(2 * 60 * 60);
pub const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(3 * 60);

/// A single claim value.
///
/// Claims arrive from the request layer as loosely-typed JSON; modelling them
/// as an explicit variant (rather than an open `any`) keeps serialization and
/// validation exhaustive at the core boundary. Integer must precede float so
/// `3` deserializes as an integer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ClaimValue {
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
    Array(Vec<ClaimValue>),
    Map(BTreeMap<String, ClaimValue>),
}

impl From<&str> for ClaimValue {
    fn from(value: &str) -> Self {
        ClaimValue::String(value.to_string())
    }
}

impl From<i64> for ClaimValue {
    fn from(value: i64) -> Self {
        ClaimValue::Integer(value)
    }
}

impl From<bool> for ClaimValue {
    fn from(value: bool) -> Self {
        ClaimValue::Bool(value)
    }
}

/// A named set of claims, ordered for deterministic serialization.
pub type ClaimSet = BTreeMap<String, ClaimValue>;

/// Mount-wide signing configuration (singleton per backend mount).
///
/// Persisted at the `config` storage path and cached in memory behind a
/// reader/writer lock (see `services::config_service`).
#[derive(Clone, Serialize, Deserialize)]
pub struct MountConfig {
    /// Connection string to the external role registry.
    pub url: String,

    /// API key used to authenticate against the role registry.
    pub sign_key: String,

    /// Signing algorithm for newly created key versions.
    pub signature_algorithm: SignatureAlgorithm,

    /// Size of generated RSA keys (only used by RSA algorithms).
    pub rsa_key_bits: u32,

    /// How frequently a new key version is created.
    #[serde(with = "humantime_serde")]
    pub key_rotation_period: Duration,

    /// How long an issued token is valid for (the `exp` claim).
    #[serde(with = "humantime_serde")]
    pub token_ttl: Duration,
}

impl MountConfig {
    /// Default configuration, with the token TTL clamped to the system's
    /// maximum lease TTL.
    pub fn default_for(max_lease_ttl: Duration) -> Self {
        MountConfig {
            url: String::new(),
            sign_key: String::new(),
            signature_algorithm: SignatureAlgorithm::default(),
            rsa_key_bits: DEFAULT_RSA_KEY_BITS,
            key_rotation_period: DEFAULT_KEY_ROTATION_PERIOD,
            token_ttl: DEFAULT_TOKEN_TTL.min(max_lease_ttl),
        }
    }
}

// The sign_key is a live registry credential; keep it out of logs.
impl fmt::Debug for MountConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MountConfig")
            .field("url", &self.url)
            .field("sign_key", &"[REDACTED]")
            .field("signature_algorithm", &self.signature_algorithm)
            .field("rsa_key_bits", &self.rsa_key_bits)
            .field("key_rotation_period", &self.key_rotation_period)
            .field("token_ttl", &self.token_ttl)
            .finish()
    }
}

/// A named role: the claims baked into tokens issued for it, plus an
/// optional per-role TTL that takes precedence over the mount-wide default.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Role {
    pub name: String,
    pub claims: ClaimSet,
    #[serde(default, with = "humantime_serde", skip_serializing_if = "Option::is_none")]
    pub token_ttl: Option<Duration>,
}

/// Response for `creds/<role>` and `sign/<role>`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub token: String,
    /// Token lifetime in seconds.
    pub ttl: u64,
}
