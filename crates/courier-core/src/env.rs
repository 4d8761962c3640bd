//! Environment abstraction for deterministic testing.
//!
//! The `Environment` trait decouples descriptor generation and message
//! numbering from the system entropy source. Production code uses a
//! `getrandom`-backed implementation; tests use a seeded or counting one so
//! every freshly computed descriptor set is predictable.
//!
//! # Invariants
//!
//! - Freshness: two calls to `random_bytes()` in production never return the
//!   same material
//! - Isolation: implementations must not share global state

/// Source of randomness for key-request material and message ids.
pub trait Environment: Clone + Send + Sync + 'static {
    /// Fills the provided buffer with random bytes.
    ///
    /// # Security
    ///
    /// Production implementations MUST use OS entropy (`getrandom`), never a
    /// non-cryptographic generator.
    fn random_bytes(&self, buffer: &mut [u8]);

    /// Generates a random `u64`.
    ///
    /// Used to seed message ids for a fresh token store.
    fn random_u64(&self) -> u64 {
        let mut bytes = [0u8; 8];
        self.random_bytes(&mut bytes);
        u64::from_be_bytes(bytes)
    }
}
