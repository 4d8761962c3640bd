//! Counting session factory.
//!
//! Builds sessions around [`ScriptedEngine`] and [`CountingStore`], and
//! keeps a handle to every part it built so tests can inspect builds,
//! flushes, fetches and sends after handing the factory to the orchestrator.

use std::{
    collections::VecDeque,
    io,
    path::PathBuf,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
};

use courier_client::{Session, SessionConfig, SessionFactory};
use courier_core::{
    AllowListBuilder, CourierError, EntityIdentity, KeyExchangeCache, MemoryTokenStore,
    StoreError, TokenState, TokenStore,
};
use parking_lot::Mutex;

use crate::{EngineLog, Reply, ScriptedEngine, SeqEnv};

/// Token store that counts flush attempts and can be told to fail them.
#[derive(Debug, Default)]
pub struct CountingStore {
    inner: MemoryTokenStore,
    attempts: AtomicUsize,
    fail: AtomicBool,
}

impl CountingStore {
    /// Number of flush attempts, failed ones included.
    pub fn flush_count(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Make every later flush fail.
    pub fn fail_flushes(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }
}

impl TokenStore for CountingStore {
    fn state(&self) -> TokenState {
        self.inner.state()
    }

    fn replace(&self, state: TokenState) {
        self.inner.replace(state);
    }

    fn flush(&self) -> Result<(), StoreError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(StoreError::Io {
                path: PathBuf::from("<memory>"),
                source: io::Error::other("injected flush failure"),
            });
        }
        self.inner.flush()
    }
}

/// Parts of one built session.
#[derive(Debug, Clone)]
pub struct BuiltSession {
    /// Bound entity.
    pub identity: EntityIdentity,
    /// Entity authentication scheme it was built with.
    pub entity_auth: String,
    /// Its token store.
    pub store: Arc<CountingStore>,
    /// Its key-exchange cache.
    pub key_exchange: Arc<KeyExchangeCache>,
    /// What its engine observed.
    pub log: Arc<Mutex<EngineLog>>,
}

#[derive(Debug, Default)]
struct FactoryState {
    builds: Mutex<Vec<BuiltSession>>,
    replies: Arc<Mutex<VecDeque<Reply>>>,
    fail_flushes: AtomicBool,
    fetches_per_send: AtomicUsize,
}

/// Session factory for tests; clones share state.
#[derive(Debug, Clone, Default)]
pub struct CountingFactory {
    state: Arc<FactoryState>,
    env: SeqEnv,
}

impl CountingFactory {
    /// Factory whose engines echo until replies are queued.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a reply for the next send of any session built here.
    pub fn push_reply(&self, reply: Reply) {
        self.state.replies.lock().push_back(reply);
    }

    /// Sessions built from now on fail every flush.
    pub fn fail_flushes(&self) {
        self.state.fail_flushes.store(true, Ordering::SeqCst);
    }

    /// Engines built from now on fetch descriptors `n` times per send.
    pub fn fetches_per_send(&self, n: usize) {
        self.state.fetches_per_send.store(n, Ordering::SeqCst);
    }

    /// Every session built so far, oldest first.
    pub fn builds(&self) -> Vec<BuiltSession> {
        self.state.builds.lock().clone()
    }

    /// Number of sessions built so far.
    pub fn build_count(&self) -> usize {
        self.state.builds.lock().len()
    }

    /// Total sends across every session built so far.
    pub fn send_count(&self) -> usize {
        self.state.builds.lock().iter().map(|b| b.log.lock().sends.len()).sum()
    }
}

impl SessionFactory for CountingFactory {
    fn build(
        &self,
        identity: &EntityIdentity,
        session: &SessionConfig,
    ) -> Result<Session, CourierError> {
        session.config.entity_auth_key(&session.entity_auth, identity)?;

        let store = Arc::new(CountingStore::default());
        if self.state.fail_flushes.load(Ordering::SeqCst) {
            store.fail_flushes();
        }

        let key_exchange = Arc::new(KeyExchangeCache::new(Box::new(AllowListBuilder::new(
            session.config.key_exchange.clone(),
            identity.clone(),
            self.env.clone(),
        ))));
        let log = Arc::new(Mutex::new(EngineLog::default()));

        let engine = ScriptedEngine::new(
            Arc::clone(&key_exchange),
            Arc::clone(&self.state.replies),
            Arc::clone(&log),
        )
        .with_fetches_per_send(self.state.fetches_per_send.load(Ordering::SeqCst).max(1));

        self.state.builds.lock().push(BuiltSession {
            identity: identity.clone(),
            entity_auth: session.entity_auth.clone(),
            store: Arc::clone(&store),
            key_exchange: Arc::clone(&key_exchange),
            log,
        });

        Ok(Session::new(identity.clone(), Box::new(engine), store, key_exchange))
    }
}
