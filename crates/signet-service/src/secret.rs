//! Secret types for protecting sensitive values from accidental logging.
//!
//! This module re-exports types from the [`secrecy`] crate. Use them for all
//! sensitive values: the master key, decrypted signing key material, and
//! registry API keys held in memory.
//!
//! `SecretBox<T>` and `SecretString` implement `Debug` with redaction, so any
//! struct that derives `Debug` while holding a secret gets safe logging
//! behavior for free, and the wrapped value is zeroized on drop.
//!
//! To read the wrapped value, call `.expose_secret()` explicitly at the point
//! of use — grep-ability of that method name is the audit trail.

pub use secrecy::{ExposeSecret, SecretBox, SecretString};
