//! Persistent per-entity session state.
//!
//! The engine records what it learns from each exchange (master token,
//! message numbering) in the session's [`TokenStore`]. The session manager
//! flushes it when a session is replaced, on `save`, and at shutdown.

use std::{
    fmt::{self, Write as _},
    fs,
    path::{Path, PathBuf},
    sync::atomic::{AtomicUsize, Ordering},
};

use bytes::Bytes;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::{EntityIdentity, StoreError};

/// Session state accumulated across message rounds.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenState {
    /// Master token issued by the remote party.
    pub master_token: Option<Bytes>,
    /// Id for the next outbound message.
    pub next_message_id: u64,
}

impl fmt::Debug for TokenState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenState")
            .field(
                "master_token",
                &self.master_token.as_ref().map(|t| format!("<redacted {} bytes>", t.len())),
            )
            .field("next_message_id", &self.next_message_id)
            .finish()
    }
}

/// Entity-scoped token storage.
pub trait TokenStore: Send + Sync {
    /// Snapshot of the current state.
    fn state(&self) -> TokenState;

    /// Replace the in-memory state.
    fn replace(&self, state: TokenState);

    /// Persist the in-memory state.
    fn flush(&self) -> Result<(), StoreError>;
}

/// In-memory store; `flush` only counts.
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    state: Mutex<TokenState>,
    flushes: AtomicUsize,
}

impl MemoryTokenStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful flushes.
    pub fn flush_count(&self) -> usize {
        self.flushes.load(Ordering::SeqCst)
    }
}

impl TokenStore for MemoryTokenStore {
    fn state(&self) -> TokenState {
        self.state.lock().clone()
    }

    fn replace(&self, state: TokenState) {
        *self.state.lock() = state;
    }

    fn flush(&self) -> Result<(), StoreError> {
        self.flushes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// CBOR file store, one file per entity.
#[derive(Debug)]
pub struct FileTokenStore {
    path: PathBuf,
    state: Mutex<TokenState>,
}

impl FileTokenStore {
    /// Open the store for `entity` under `dir`, loading any saved state.
    ///
    /// A missing file starts from `initial`.
    pub fn open(dir: &Path, entity: &EntityIdentity, initial: TokenState) -> Result<Self, StoreError> {
        let path = dir.join(format!("{}.cbor", file_stem(entity)));

        let state = match fs::read(&path) {
            Ok(bytes) => {
                let state: TokenState = ciborium::from_reader(bytes.as_slice())
                    .map_err(|e| StoreError::Decode(e.to_string()))?;
                tracing::debug!(path = %path.display(), "token store loaded");
                state
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => initial,
            Err(source) => return Err(StoreError::Io { path, source }),
        };

        Ok(Self { path, state: Mutex::new(state) })
    }

    /// Backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TokenStore for FileTokenStore {
    fn state(&self) -> TokenState {
        self.state.lock().clone()
    }

    fn replace(&self, state: TokenState) {
        *self.state.lock() = state;
    }

    fn flush(&self) -> Result<(), StoreError> {
        let mut bytes = Vec::new();
        ciborium::into_writer(&self.state(), &mut bytes)
            .map_err(|e| StoreError::Encode(e.to_string()))?;

        let io_err = |source: std::io::Error| StoreError::Io { path: self.path.clone(), source };
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }

        // Write-then-rename so a crash never leaves a truncated store
        let tmp = self.path.with_extension("cbor.tmp");
        fs::write(&tmp, &bytes).map_err(io_err)?;
        fs::rename(&tmp, &self.path).map_err(io_err)?;

        tracing::debug!(path = %self.path.display(), "token store flushed");
        Ok(())
    }
}

/// File name stem for `entity`, injective over identities.
///
/// ASCII alphanumerics and `-` are kept; every other byte, `_` included,
/// becomes `_xx` (lowercase hex), so no two identities share a file.
fn file_stem(entity: &EntityIdentity) -> String {
    let mut stem = String::with_capacity(entity.as_str().len());
    for byte in entity.as_str().bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' {
            stem.push(char::from(byte));
        } else {
            let _ = write!(stem, "_{byte:02x}");
        }
    }
    stem
}
