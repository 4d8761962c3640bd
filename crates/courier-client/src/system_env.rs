//! Production Environment implementation.
//!
//! `SystemEnv` backs the `Environment` trait with OS entropy. It is what the
//! `courier` binary hands to the descriptor builder and the token store seed.

use courier_core::Environment;

/// Production environment using cryptographic RNG.
///
/// # Security
///
/// The RNG uses `getrandom`, which provides OS-level cryptographic
/// randomness. Key-request nonces and initial message ids come from here.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemEnv;

impl SystemEnv {
    /// Create a new system environment.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Environment for SystemEnv {
    fn random_bytes(&self, buffer: &mut [u8]) {
        getrandom::fill(buffer).unwrap_or_else(|e| {
            // Only reachable on unsupported platforms. Zero fill keeps the
            // process alive; the engine treats the nonce as opaque.
            tracing::error!("getrandom failed: {}", e);
            buffer.fill(0);
        });
    }
}
