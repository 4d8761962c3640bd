//! Key-exchange request cache.
//!
//! The protocol engine pulls key-exchange request descriptors from the
//! session's [`KeyExchangeCache`] while it processes a message, possibly
//! several times per round (retries) and possibly from a worker task. The
//! operator reconfigures the cache between rounds.
//!
//! ## Consume Tracking
//!
//! ```text
//!            reconfigure(same pair)          reconfigure(same pair)
//!   Fresh ──────────────────────────▶ Fresh  ──────────────┐
//!     │  ▲                                                  │ (no-op)
//!     │  └──────── reconfigure(any pair): recompute ───┐    │
//!  fetch()                                             │    ▼
//!     ▼                                                │
//!   Consumed ──────────────────────────────────────────┘
//! ```
//!
//! - `reconfigure` recomputes when the (scheme, mechanism) pair changed or
//!   the current set has been fetched at least once
//! - `fetch` always returns the current set and marks it consumed
//! - Decide-then-mutate runs under one lock, so no `fetch` can observe a set
//!   that a concurrent `reconfigure` has already decided to replace

use std::{collections::BTreeMap, fmt, sync::Arc};

use parking_lot::Mutex;

use crate::{EntityIdentity, Environment, KeyExchangeError};

/// Size of the fresh request material in each descriptor.
pub const NONCE_SIZE: usize = 16;

/// Key-exchange scheme and optional mechanism.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KeyExchangeConfig {
    /// Scheme name.
    pub scheme: String,
    /// Mechanism name, when the scheme has variants.
    pub mechanism: Option<String>,
}

impl KeyExchangeConfig {
    /// Build a config from borrowed names.
    pub fn new(scheme: &str, mechanism: Option<&str>) -> Self {
        Self { scheme: scheme.to_string(), mechanism: mechanism.map(str::to_string) }
    }

    fn matches(&self, scheme: &str, mechanism: Option<&str>) -> bool {
        self.scheme == scheme && self.mechanism.as_deref() == mechanism
    }
}

impl fmt::Display for KeyExchangeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.mechanism {
            Some(mechanism) => write!(f, "{}/{}", self.scheme, mechanism),
            None => f.write_str(&self.scheme),
        }
    }
}

/// Data the engine needs for one key-exchange attempt.
#[derive(Clone, PartialEq, Eq)]
pub struct KeyRequestDescriptor {
    /// Scheme and mechanism this descriptor was computed for.
    pub config: KeyExchangeConfig,
    /// Requesting entity.
    pub entity: EntityIdentity,
    /// Fresh request material.
    pub nonce: [u8; NONCE_SIZE],
}

impl fmt::Debug for KeyRequestDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyRequestDescriptor")
            .field("config", &self.config)
            .field("entity", &self.entity)
            .field("nonce", &"<redacted>")
            .finish()
    }
}

/// Read-only view of the cached descriptors, in order of preference.
pub type DescriptorSet = Arc<[KeyRequestDescriptor]>;

/// Computes descriptor sets for a key-exchange configuration.
pub trait DescriptorBuilder: Send + Sync {
    /// Compute a fresh descriptor set. Never returns an empty set on success.
    fn build(&self, config: &KeyExchangeConfig)
    -> Result<Vec<KeyRequestDescriptor>, KeyExchangeError>;
}

/// Allowed key-exchange schemes and, per scheme, allowed mechanisms.
///
/// A scheme with an empty mechanism list takes no mechanism.
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
#[serde(transparent)]
pub struct KeyExchangeAllowList {
    schemes: BTreeMap<String, Vec<String>>,
}

impl KeyExchangeAllowList {
    /// Build an allow-list from (scheme, mechanisms) pairs.
    pub fn new<I, S, M>(schemes: I) -> Self
    where
        I: IntoIterator<Item = (S, M)>,
        S: Into<String>,
        M: IntoIterator,
        M::Item: Into<String>,
    {
        Self {
            schemes: schemes
                .into_iter()
                .map(|(s, m)| (s.into(), m.into_iter().map(Into::into).collect()))
                .collect(),
        }
    }

    /// Check a scheme/mechanism pair.
    pub fn validate(&self, config: &KeyExchangeConfig) -> Result<(), KeyExchangeError> {
        let mechanisms = self
            .schemes
            .get(&config.scheme)
            .ok_or_else(|| KeyExchangeError::UnknownScheme(config.scheme.clone()))?;

        match (&config.mechanism, mechanisms.is_empty()) {
            (None, true) => Ok(()),
            (None, false) => {
                Err(KeyExchangeError::MechanismRequired { scheme: config.scheme.clone() })
            },
            (Some(mechanism), _) if mechanisms.contains(mechanism) => Ok(()),
            (Some(mechanism), _) => Err(KeyExchangeError::UnsupportedMechanism {
                scheme: config.scheme.clone(),
                mechanism: mechanism.clone(),
            }),
        }
    }

    /// Scheme names, sorted.
    pub fn schemes(&self) -> impl Iterator<Item = &str> {
        self.schemes.keys().map(String::as_str)
    }
}

impl Default for KeyExchangeAllowList {
    fn default() -> Self {
        Self::new([
            ("ASYMMETRIC_WRAPPED", vec!["JWE_RSA", "JWEJS_RSA", "JWK_RSA", "JWK_RSAES"]),
            ("DIFFIE_HELLMAN", vec![]),
            ("JWE_LADDER", vec!["PSK", "WRAP"]),
            ("JWK_LADDER", vec!["PSK", "WRAP"]),
            ("SYMMETRIC_WRAPPED", vec!["PSK", "MGK"]),
        ])
    }
}

/// Descriptor builder that validates against an allow-list and draws fresh
/// request material from the environment.
pub struct AllowListBuilder<E: Environment> {
    allow: KeyExchangeAllowList,
    entity: EntityIdentity,
    env: E,
}

impl<E: Environment> AllowListBuilder<E> {
    /// Builder for one entity's sessions.
    pub fn new(allow: KeyExchangeAllowList, entity: EntityIdentity, env: E) -> Self {
        Self { allow, entity, env }
    }
}

impl<E: Environment> DescriptorBuilder for AllowListBuilder<E> {
    fn build(
        &self,
        config: &KeyExchangeConfig,
    ) -> Result<Vec<KeyRequestDescriptor>, KeyExchangeError> {
        self.allow.validate(config)?;

        let mut nonce = [0u8; NONCE_SIZE];
        self.env.random_bytes(&mut nonce);

        Ok(vec![KeyRequestDescriptor { config: config.clone(), entity: self.entity.clone(), nonce }])
    }
}

struct Slot {
    config: Option<KeyExchangeConfig>,
    descriptors: DescriptorSet,
    consumed: bool,
}

/// Single-slot, coalescing cache of key-exchange request descriptors.
pub struct KeyExchangeCache {
    builder: Box<dyn DescriptorBuilder>,
    slot: Mutex<Slot>,
}

impl KeyExchangeCache {
    /// Empty cache; `fetch` returns an empty set until the first successful
    /// `reconfigure`.
    pub fn new(builder: Box<dyn DescriptorBuilder>) -> Self {
        Self {
            builder,
            slot: Mutex::new(Slot { config: None, descriptors: Arc::from([]), consumed: false }),
        }
    }

    /// Point the cache at `(scheme, mechanism)`.
    ///
    /// Recomputes iff the pair differs from the last configured pair or the
    /// current set has been fetched. Returns whether a recompute happened. On
    /// failure the slot is left untouched.
    pub fn reconfigure(
        &self,
        scheme: &str,
        mechanism: Option<&str>,
    ) -> Result<bool, KeyExchangeError> {
        let mut slot = self.slot.lock();

        let unchanged = slot.config.as_ref().is_some_and(|c| c.matches(scheme, mechanism));
        if unchanged && !slot.consumed {
            tracing::debug!(scheme, ?mechanism, "key request data still fresh");
            return Ok(false);
        }

        let config = KeyExchangeConfig::new(scheme, mechanism);
        let descriptors = self.builder.build(&config)?;
        tracing::debug!(%config, count = descriptors.len(), "key request data recomputed");

        slot.descriptors = Arc::from(descriptors);
        slot.config = Some(config);
        slot.consumed = false;
        Ok(true)
    }

    /// Current descriptor set; marks it consumed.
    pub fn fetch(&self) -> DescriptorSet {
        let mut slot = self.slot.lock();
        slot.consumed = true;
        Arc::clone(&slot.descriptors)
    }

    /// Last successfully configured pair.
    pub fn config(&self) -> Option<KeyExchangeConfig> {
        self.slot.lock().config.clone()
    }

    /// Whether the current set has been fetched since it was computed.
    pub fn is_consumed(&self) -> bool {
        self.slot.lock().consumed
    }
}

impl fmt::Debug for KeyExchangeCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let slot = self.slot.lock();
        f.debug_struct("KeyExchangeCache")
            .field("config", &slot.config)
            .field("descriptors", &slot.descriptors.len())
            .field("consumed", &slot.consumed)
            .finish_non_exhaustive()
    }
}
