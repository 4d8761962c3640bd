//! Deterministic environment.

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use courier_core::Environment;

/// Environment whose random bytes come from a shared counter.
///
/// Every call yields different material, and two runs yield the same
/// sequence.
#[derive(Debug, Clone, Default)]
pub struct SeqEnv {
    counter: Arc<AtomicU64>,
}

impl SeqEnv {
    /// Counter starting at `seed`.
    pub fn with_seed(seed: u64) -> Self {
        Self { counter: Arc::new(AtomicU64::new(seed)) }
    }
}

impl Environment for SeqEnv {
    fn random_bytes(&self, buffer: &mut [u8]) {
        let n = self.counter.fetch_add(1, Ordering::SeqCst).to_be_bytes();
        for (i, byte) in buffer.iter_mut().enumerate() {
            *byte = n[i % n.len()];
        }
    }
}
