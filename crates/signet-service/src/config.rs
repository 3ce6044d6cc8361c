use base64::{engine::general_purpose, Engine as _};
use std::collections::HashMap;
use std::env;
use std::time::Duration;
use thiserror::Error;

/// Maximum lease TTL: the hard upper bound on any token TTL. 32 days,
/// matching the conventional secrets-engine default.
pub const DEFAULT_MAX_LEASE_TTL: Duration = Duration::from_secs(32 * 24 * 3600);

/// How often the periodic key-maintenance driver runs.
pub const DEFAULT_ROTATION_CHECK_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Clone)]
pub struct Config {
    pub bind_address: String,
    /// 32-byte key that seals signing key material at rest.
    pub master_key: Vec<u8>,
    /// Identifier mixed into key ids, so two mounts sharing a verifier
    /// namespace produce distinct `kid` values.
    pub backend_id: String,
    pub max_lease_ttl: Duration,
    pub rotation_check_interval: Duration,
}

// The master key must never reach logs.
impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("bind_address", &self.bind_address)
            .field("master_key", &"[REDACTED]")
            .field("backend_id", &self.backend_id)
            .field("max_lease_ttl", &self.max_lease_ttl)
            .field("rotation_check_interval", &self.rotation_check_interval)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid master key format: {0}")]
    InvalidMasterKey(String),

    #[error("Base64 decode error: {0}")]
    Base64Error(#[from] base64::DecodeError),

    #[error("Invalid duration in {0}: {1}")]
    InvalidDuration(String, String),
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a HashMap (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let bind_address = vars
            .get("BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| "0.0.0.0:8200".to_string());

        let master_key_base64 = vars
            .get("SIGNET_MASTER_KEY")
            .ok_or_else(|| ConfigError::MissingEnvVar("SIGNET_MASTER_KEY".to_string()))?;

        let master_key = general_purpose::STANDARD
            .decode(master_key_base64)
            .map_err(ConfigError::Base64Error)?;

        if master_key.len() != 32 {
            return Err(ConfigError::InvalidMasterKey(format!(
                "Expected 32 bytes, got {}",
                master_key.len()
            )));
        }

        let backend_id = vars
            .get("BACKEND_ID")
            .cloned()
            .unwrap_or_else(|| "signet".to_string());

        let max_lease_ttl = parse_duration_var(vars, "MAX_LEASE_TTL", DEFAULT_MAX_LEASE_TTL)?;
        let rotation_check_interval = parse_duration_var(
            vars,
            "ROTATION_CHECK_INTERVAL",
            DEFAULT_ROTATION_CHECK_INTERVAL,
        )?;

        Ok(Config {
            bind_address,
            master_key,
            backend_id,
            max_lease_ttl,
            rotation_check_interval,
        })
    }
}

fn parse_duration_var(
    vars: &HashMap<String, String>,
    name: &str,
    default: Duration,
) -> Result<Duration, ConfigError> {
    match vars.get(name) {
        None => Ok(default),
        Some(raw) => humantime::parse_duration(raw)
            .map_err(|e| ConfigError::InvalidDuration(name.to_string(), e.to_string())),
    }
}
