//! Signet — a JWT-issuing secrets backend with managed key lifecycle.
//!
//! Callers who hold a named role request short-lived signed tokens; the
//! service owns the signing key's lifecycle: versioned storage, automatic
//! rotation, and pruning of versions that can no longer verify any
//! still-valid token. Every node sharing the same durable storage observes
//! a consistent view of the current key through storage-change
//! invalidations.
//!
//! # Modules
//!
//! - `backend` - The backend instance tying storage, caches and locks together
//! - `config` - Process configuration
//! - `crypto` - Cryptographic operations (key generation, sealing, JWT signing)
//! - `errors` - Error types
//! - `handlers` - HTTP request handlers
//! - `keyring` - Versioned key policies and their locking discipline
//! - `models` - Data models
//! - `observability` - Metrics
//! - `registry` - External role-registry mirror
//! - `routes` - Router assembly
//! - `secret` - Secret wrappers that redact on Debug
//! - `services` - Business logic layer
//! - `storage` - Durable key-value storage abstraction

pub mod backend;
pub mod config;
pub mod crypto;
pub mod errors;
pub mod handlers;
pub mod keyring;
pub mod models;
pub mod observability;
pub mod registry;
pub mod routes;
pub mod secret;
pub mod services;
pub mod storage;
