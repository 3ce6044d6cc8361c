//! Deterministic crypto fixtures.

/// Fixed 32-byte master key for reproducible tests.
///
/// Never use outside tests: the whole point of the master key is that it is
/// not knowable.
pub fn test_master_key() -> Vec<u8> {
    (0u8..32).collect()
}
