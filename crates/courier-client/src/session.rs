//! Session Manager
//!
//! Binds one entity identity to one live protocol session.
//!
//! ## Responsibilities
//!
//! - Session Lifecycle: build on first use, rebuild when the identity changes
//! - Persistence: flush the token store on rebind, on `save`, at shutdown
//!
//! # Invariants
//!
//! - At most one session is live at a time
//! - The live session's identity equals the last identity passed to
//!   `ensure_session` that built successfully
//! - Flush failures never abort a rebind or shutdown; they are logged

use std::{fmt, sync::Arc};

use courier_core::{
    Config, CourierError, EntityIdentity, KeyExchangeCache, ProtocolEngine, StoreError,
    TokenStore,
};

/// Everything besides the identity that a new session is built from.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Entity authentication scheme, bound for the session's lifetime.
    pub entity_auth: String,
    /// Loaded configuration and key files.
    pub config: Arc<Config>,
}

/// One live protocol session bound to an entity.
pub struct Session {
    identity: EntityIdentity,
    engine: Box<dyn ProtocolEngine>,
    store: Arc<dyn TokenStore>,
    key_exchange: Arc<KeyExchangeCache>,
}

impl Session {
    /// Assemble a session from its parts.
    ///
    /// The engine is expected to hold clones of `store` and `key_exchange`.
    pub fn new(
        identity: EntityIdentity,
        engine: Box<dyn ProtocolEngine>,
        store: Arc<dyn TokenStore>,
        key_exchange: Arc<KeyExchangeCache>,
    ) -> Self {
        Self { identity, engine, store, key_exchange }
    }

    /// Bound entity.
    pub fn identity(&self) -> &EntityIdentity {
        &self.identity
    }

    /// Protocol engine handle.
    pub fn engine_mut(&mut self) -> &mut dyn ProtocolEngine {
        self.engine.as_mut()
    }

    /// Key-exchange cache shared with the engine.
    pub fn key_exchange(&self) -> &KeyExchangeCache {
        &self.key_exchange
    }

    /// Token store shared with the engine.
    pub fn store(&self) -> &dyn TokenStore {
        self.store.as_ref()
    }

    /// Persist the token store.
    pub fn flush(&self) -> Result<(), StoreError> {
        self.store.flush()
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("identity", &self.identity)
            .field("key_exchange", &self.key_exchange)
            .finish_non_exhaustive()
    }
}

/// Builds sessions for the manager.
pub trait SessionFactory: Send + Sync {
    /// Build a fresh session for `identity`.
    fn build(
        &self,
        identity: &EntityIdentity,
        config: &SessionConfig,
    ) -> Result<Session, CourierError>;
}

/// Owns the live session and rebinds it on identity changes.
pub struct SessionManager<F: SessionFactory> {
    factory: F,
    current: Option<Session>,
}

impl<F: SessionFactory> SessionManager<F> {
    /// Manager with no live session.
    pub fn new(factory: F) -> Self {
        Self { factory, current: None }
    }

    /// Session bound to `identity`, building it if needed.
    ///
    /// An existing session for a different identity is flushed and closed
    /// first. If the build fails no session is live afterwards.
    pub fn ensure_session(
        &mut self,
        identity: &EntityIdentity,
        config: &SessionConfig,
    ) -> Result<&mut Session, CourierError> {
        match self.current.take() {
            Some(session) if session.identity() == identity => Ok(self.current.insert(session)),
            previous => {
                if let Some(old) = previous {
                    tracing::info!(from = %old.identity(), to = %identity, "rebinding session");
                    close(&old);
                }
                let session = self.factory.build(identity, config)?;
                tracing::info!(entity = %identity, "session started");
                Ok(self.current.insert(session))
            },
        }
    }

    /// Flush the live session without closing it. No-op without one.
    pub fn save(&self) -> Result<(), StoreError> {
        match &self.current {
            Some(session) => {
                session.flush()?;
                tracing::info!(entity = %session.identity(), "session state saved");
                Ok(())
            },
            None => Ok(()),
        }
    }

    /// Flush and close the live session, if any.
    pub fn shutdown(&mut self) {
        if let Some(session) = self.current.take() {
            close(&session);
            tracing::info!(entity = %session.identity(), "session closed");
        }
    }

    /// Live session, if any.
    pub fn current(&self) -> Option<&Session> {
        self.current.as_ref()
    }

    /// The session factory.
    pub fn factory(&self) -> &F {
        &self.factory
    }
}

fn close(session: &Session) {
    if let Err(e) = session.flush() {
        tracing::warn!(entity = %session.identity(), error = %e, "session flush failed");
    }
}
