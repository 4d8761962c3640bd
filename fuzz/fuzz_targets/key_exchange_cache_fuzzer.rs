//! Fuzz target for the key-exchange cache
//!
//! Drives reconfigure/fetch sequences against a shadow slot.
//!
//! # Invariants
//!
//! - Recompute iff the pair changed or the current set was fetched
//! - A rejected pair leaves the slot untouched
//! - Fetch never returns an empty set once a reconfigure succeeded
//! - Repeated fetches without a recompute return the identical set

#![no_main]

use std::sync::Arc;

use arbitrary::Arbitrary;
use courier_core::{
    AllowListBuilder, EntityIdentity, Environment, KeyExchangeAllowList, KeyExchangeCache,
    KeyExchangeConfig,
};
use libfuzzer_sys::fuzz_target;

/// Deterministic entropy so crashes reproduce.
#[derive(Debug, Clone)]
struct FuzzEnv;

impl Environment for FuzzEnv {
    fn random_bytes(&self, buffer: &mut [u8]) {
        buffer.fill(0x5a);
    }
}

const SCHEMES: [&str; 4] = ["DIFFIE_HELLMAN", "JWE_LADDER", "SYMMETRIC_WRAPPED", "UNKNOWN"];
const MECHANISMS: [Option<&str>; 4] = [None, Some("PSK"), Some("WRAP"), Some("MGK")];

#[derive(Debug, Arbitrary)]
enum Op {
    Reconfigure { scheme: u8, mechanism: u8 },
    Fetch,
}

fuzz_target!(|ops: Vec<Op>| {
    let allow = KeyExchangeAllowList::default();
    let builder =
        AllowListBuilder::new(allow.clone(), EntityIdentity::new("client-1"), FuzzEnv);
    let cache = KeyExchangeCache::new(Box::new(builder));

    let mut shadow: Option<KeyExchangeConfig> = None;
    let mut consumed = false;
    let mut last_fetch = None;

    for op in ops {
        match op {
            Op::Fetch => {
                let set = cache.fetch();
                assert_eq!(set.is_empty(), shadow.is_none());
                if let Some(previous) = &last_fetch {
                    assert!(Arc::ptr_eq(previous, &set), "unchanged slot handed out a new set");
                }
                consumed = true;
                last_fetch = Some(set);
            },
            Op::Reconfigure { scheme, mechanism } => {
                let scheme = SCHEMES[usize::from(scheme) % SCHEMES.len()];
                let mechanism = MECHANISMS[usize::from(mechanism) % MECHANISMS.len()];
                let candidate = KeyExchangeConfig::new(scheme, mechanism);
                let fresh = shadow.as_ref() == Some(&candidate) && !consumed;

                match cache.reconfigure(scheme, mechanism) {
                    Ok(recomputed) => {
                        assert_eq!(recomputed, !fresh);
                        if recomputed {
                            shadow = Some(candidate);
                            consumed = false;
                            last_fetch = None;
                        }
                    },
                    Err(_) => {
                        assert!(!fresh, "fresh pair must short-circuit before validation");
                        assert!(allow.validate(&candidate).is_err());
                        assert_eq!(cache.config(), shadow);
                        assert_eq!(cache.is_consumed(), consumed);
                    },
                }
            },
        }
    }
});
