//! Durable key-value storage abstraction.
//!
//! The backend treats storage as the single source of truth; every in-memory
//! cache layered on top must be correct to drop and reload at any time.
//! Implementations are expected to be per-key atomic — there are no multi-key
//! transactions, which is why multi-field state (the key policy) is encoded
//! as a single serialized blob at one path.
//!
//! Absence and failure are distinct outcomes: `get` returns `Ok(None)` for a
//! missing key and `Err(...)` only for a real I/O failure. Callers must never
//! interpret an error as "absent".

mod memory;

pub use memory::MemoryStorage;

use crate::errors::BackendError;
use async_trait::async_trait;
use bytes::Bytes;
use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;

/// Error from the storage layer. Retry policy, if any, belongs to the
/// implementation behind this trait, not to the core.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Abstract durable key-value store, keyed by slash-separated paths.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Retrieve the value at `path`, or `None` if nothing is stored there.
    async fn get(&self, path: &str) -> Result<Option<Bytes>, StorageError>;

    /// Store `value` at `path`, overwriting any existing value.
    async fn put(&self, path: &str, value: Vec<u8>) -> Result<(), StorageError>;

    /// Delete the value at `path`. Deleting an absent path is not an error.
    async fn delete(&self, path: &str) -> Result<(), StorageError>;

    /// List the names stored directly under `prefix`, with the prefix
    /// stripped from each returned name.
    async fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError>;
}

/// Fetch and deserialize a JSON blob, preserving the absence/failure split.
pub async fn get_json<T: DeserializeOwned>(
    storage: &dyn Storage,
    path: &str,
) -> Result<Option<T>, BackendError> {
    let Some(raw) = storage.get(path).await? else {
        return Ok(None);
    };

    let value = serde_json::from_slice(&raw).map_err(|e| {
        BackendError::Internal(format!("corrupt entry at {path}: {e}"))
    })?;

    Ok(Some(value))
}

/// Serialize and store a value as a single JSON blob at `path`.
pub async fn put_json<T: Serialize>(
    storage: &dyn Storage,
    path: &str,
    value: &T,
) -> Result<(), BackendError> {
    let raw = serde_json::to_vec(value)
        .map_err(|e| BackendError::Internal(format!("serialize for {path}: {e}")))?;

    storage.put(path, raw).await?;

    Ok(())
}
