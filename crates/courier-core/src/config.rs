//! Configuration file and key files.
//!
//! The configuration file (`-cfg`) is TOML. Every table is optional; a
//! missing table falls back to its defaults, and running without `-cfg` uses
//! the defaults throughout.
//!
//! ```toml
//! [auth]
//! entity_schemes = ["NONE", "PSK", "MGK"]
//! user_schemes = ["EMAIL_PASSWORD"]
//!
//! # Replaces the built-in key-exchange allow-list entirely.
//! [key_exchange]
//! DIFFIE_HELLMAN = []
//! JWE_LADDER = ["PSK", "WRAP"]
//!
//! [store]
//! dir = ".courier/store"
//!
//! [network]
//! connect_timeout_ms = 5000
//! ```

use std::{
    collections::BTreeMap,
    fmt, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};

use crate::{ConfigError, EntityIdentity, KeyExchangeAllowList};

/// Authentication scheme allow-lists.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct AuthConfig {
    /// Allowed entity authentication schemes.
    pub entity_schemes: Vec<String>,
    /// Allowed user authentication schemes.
    pub user_schemes: Vec<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            entity_schemes: ["NONE", "PSK", "MGK", "RSA", "ECC", "X509"]
                .into_iter()
                .map(String::from)
                .collect(),
            user_schemes: ["EMAIL_PASSWORD", "USER_ID_TOKEN"].into_iter().map(String::from).collect(),
        }
    }
}

/// Token store location.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreConfig {
    /// Directory holding one store file per entity.
    pub dir: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self { dir: PathBuf::from(".courier/store") }
    }
}

/// Reference engine network settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct NetworkConfig {
    /// TCP connect timeout in milliseconds.
    pub connect_timeout_ms: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self { connect_timeout_ms: 5000 }
    }
}

/// Contents of a pre-shared or model-group key file.
///
/// Three non-empty lines: entity id, encryption key, HMAC key. The key
/// material is opaque to this crate.
#[derive(Clone, PartialEq, Eq)]
pub struct KeyFileEntry {
    /// Entity the keys belong to.
    pub entity_id: String,
    /// Encryption key material.
    pub encryption_key: String,
    /// HMAC key material.
    pub hmac_key: String,
}

impl KeyFileEntry {
    /// Read and validate a key file.
    pub fn read(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)
            .map_err(|source| ConfigError::Io { path: path.to_path_buf(), source })?;
        Self::parse(&contents, path)
    }

    fn parse(contents: &str, path: &Path) -> Result<Self, ConfigError> {
        let lines: Vec<&str> = contents.lines().map(str::trim).filter(|l| !l.is_empty()).collect();
        match lines.as_slice() {
            [entity_id, encryption_key, hmac_key] => Ok(Self {
                entity_id: (*entity_id).to_string(),
                encryption_key: (*encryption_key).to_string(),
                hmac_key: (*hmac_key).to_string(),
            }),
            other => Err(ConfigError::KeyFile {
                path: path.to_path_buf(),
                reason: format!("expected 3 lines (entity id, encryption key, hmac key), found {}", other.len()),
            }),
        }
    }
}

impl fmt::Debug for KeyFileEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyFileEntry")
            .field("entity_id", &self.entity_id)
            .field("encryption_key", &"<redacted>")
            .field("hmac_key", &"<redacted>")
            .finish()
    }
}

/// Orchestrator configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Authentication allow-lists.
    pub auth: AuthConfig,
    /// Key-exchange allow-list.
    pub key_exchange: KeyExchangeAllowList,
    /// Token store settings.
    pub store: StoreConfig,
    /// Network settings.
    pub network: NetworkConfig,
    /// Pre-shared keys loaded from `-psk` files, by entity.
    #[serde(skip)]
    preshared_keys: BTreeMap<String, KeyFileEntry>,
    /// Model-group keys loaded from `-mgk` files, by entity.
    #[serde(skip)]
    model_group_keys: BTreeMap<String, KeyFileEntry>,
}

impl Config {
    /// Load the configuration file, or the defaults when `path` is `None`.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };

        let contents = fs::read_to_string(path)
            .map_err(|source| ConfigError::Io { path: path.to_path_buf(), source })?;
        let config = Self::parse(&contents, path)?;
        tracing::info!(path = %path.display(), "configuration loaded");
        Ok(config)
    }

    /// Parse TOML configuration text; `path` is used for error reporting.
    pub fn parse(contents: &str, path: &Path) -> Result<Self, ConfigError> {
        toml::from_str(contents)
            .map_err(|source| ConfigError::Parse { path: path.to_path_buf(), source })
    }

    /// Reference engine connect timeout.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.network.connect_timeout_ms)
    }

    /// Register a pre-shared key file entry.
    pub fn add_preshared_key(&mut self, entry: KeyFileEntry) {
        self.preshared_keys.insert(entry.entity_id.clone(), entry);
    }

    /// Register a model-group key file entry.
    pub fn add_model_group_key(&mut self, entry: KeyFileEntry) {
        self.model_group_keys.insert(entry.entity_id.clone(), entry);
    }

    /// Check an entity authentication scheme against the allow-list and
    /// return the key entry it needs, if any.
    ///
    /// `PSK` and `MGK` require a key file registered for `entity`.
    pub fn entity_auth_key(
        &self,
        scheme: &str,
        entity: &EntityIdentity,
    ) -> Result<Option<&KeyFileEntry>, ConfigError> {
        if !self.auth.entity_schemes.iter().any(|s| s == scheme) {
            return Err(ConfigError::UnsupportedScheme { kind: "entity", name: scheme.to_string() });
        }

        let keys = match scheme {
            "PSK" => &self.preshared_keys,
            "MGK" => &self.model_group_keys,
            _ => return Ok(None),
        };
        keys.get(entity.as_str()).map(Some).ok_or_else(|| ConfigError::MissingKey {
            scheme: scheme.to_string(),
            entity: entity.to_string(),
        })
    }

    /// Check a user authentication scheme against the allow-list.
    pub fn check_user_auth(&self, scheme: &str) -> Result<(), ConfigError> {
        if self.auth.user_schemes.iter().any(|s| s == scheme) {
            Ok(())
        } else {
            Err(ConfigError::UnsupportedScheme { kind: "user", name: scheme.to_string() })
        }
    }
}
