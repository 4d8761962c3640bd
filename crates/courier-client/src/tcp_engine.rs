//! Reference protocol engine over TCP.
//!
//! Sends one [`RequestEnvelope`] per message as a length-prefixed CBOR frame
//! and reads one [`ResponseEnvelope`] back on the same connection. Each
//! exchange runs on its own worker task; failures raised there come back
//! wrapped in [`CourierError::Execution`].
//!
//! No cryptography happens here. Key-request descriptors and the master
//! token travel as opaque bytes.

use std::{io, sync::Arc, time::Duration};

use async_trait::async_trait;
use courier_core::{
    AllowListBuilder, CourierError, EngineError, EngineResponse, EntityIdentity, Environment,
    ErrorReply, FileTokenStore, KeyExchangeCache, MessageConfig, OutboundMessage,
    ProtocolEngine, TokenState, TokenStore,
};
use courier_proto::{
    FRAME_HEADER_SIZE, KeyRequest, MessageFlags, PROTOCOL_VERSION, ProtocolError,
    RequestEnvelope, ResponseEnvelope, decode_body, encode_frame, frame_length,
};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
};

use crate::session::{Session, SessionConfig, SessionFactory};

/// Engine that talks to a message server over plain TCP.
pub struct TcpEngine {
    entity_auth: String,
    connect_timeout: Duration,
    store: Arc<dyn TokenStore>,
    key_exchange: Arc<KeyExchangeCache>,
    verbose: bool,
}

impl TcpEngine {
    /// Engine bound to one session's store and key-exchange cache.
    pub fn new(
        entity_auth: String,
        connect_timeout: Duration,
        store: Arc<dyn TokenStore>,
        key_exchange: Arc<KeyExchangeCache>,
    ) -> Self {
        Self { entity_auth, connect_timeout, store, key_exchange, verbose: false }
    }
}

#[async_trait]
impl ProtocolEngine for TcpEngine {
    async fn send(&mut self, message: OutboundMessage) -> Result<EngineResponse, CourierError> {
        let exchange = Exchange {
            entity_auth: self.entity_auth.clone(),
            connect_timeout: self.connect_timeout,
            store: Arc::clone(&self.store),
            key_exchange: Arc::clone(&self.key_exchange),
            verbose: self.verbose,
        };

        match tokio::spawn(exchange.run(message)).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(e)) => Err(CourierError::execution(e)),
            Err(e) => Err(CourierError::Internal(format!("engine worker failed: {e}"))),
        }
    }

    fn set_verbose(&mut self, verbose: bool) {
        self.verbose = verbose;
    }
}

/// State moved onto the worker task for one message round.
struct Exchange {
    entity_auth: String,
    connect_timeout: Duration,
    store: Arc<dyn TokenStore>,
    key_exchange: Arc<KeyExchangeCache>,
    verbose: bool,
}

impl Exchange {
    async fn run(self, message: OutboundMessage) -> Result<EngineResponse, CourierError> {
        let state = self.store.state();
        let request = self.envelope(&state, message.entity, message.config, message.payload);
        let frame = encode_frame(&request).map_err(protocol_failure)?;

        if self.verbose {
            tracing::info!(?request, "sending request");
        }

        let endpoint = message.endpoint.to_string();
        let comm = |source: io::Error| CourierError::Communication {
            endpoint: endpoint.clone(),
            source,
        };

        let connect = TcpStream::connect((message.endpoint.host.as_str(), message.endpoint.port));
        let mut stream = tokio::time::timeout(self.connect_timeout, connect)
            .await
            .map_err(|_| comm(io::Error::from(io::ErrorKind::TimedOut)))?
            .map_err(comm)?;

        stream.write_all(&frame).await.map_err(comm)?;

        let mut header = [0u8; FRAME_HEADER_SIZE];
        stream.read_exact(&mut header).await.map_err(comm)?;
        let len = frame_length(header).map_err(protocol_failure)?;
        let mut body = vec![0u8; len];
        stream.read_exact(&mut body).await.map_err(comm)?;

        let response: ResponseEnvelope = decode_body(&body).map_err(protocol_failure)?;
        if self.verbose {
            tracing::info!(?response, "received response");
        }

        if response.version != PROTOCOL_VERSION {
            return Err(protocol_failure(ProtocolError::UnsupportedVersion(response.version)));
        }
        if response.message_id != request.message_id {
            return Err(EngineError::Protocol(format!(
                "response message id {} does not match request {}",
                response.message_id, request.message_id
            ))
            .into());
        }

        self.store.replace(TokenState {
            master_token: response.master_token.or(state.master_token),
            next_message_id: request.message_id.wrapping_add(1),
        });

        Ok(EngineResponse {
            payload: response.payload,
            error: response.error.map(|e| ErrorReply { code: e.code, message: e.message }),
        })
    }

    fn envelope(
        &self,
        state: &TokenState,
        entity: EntityIdentity,
        config: MessageConfig,
        payload: bytes::Bytes,
    ) -> RequestEnvelope {
        let key_requests = self
            .key_exchange
            .fetch()
            .iter()
            .map(|d| KeyRequest {
                scheme: d.config.scheme.clone(),
                mechanism: d.config.mechanism.clone(),
                nonce: bytes::Bytes::copy_from_slice(&d.nonce),
            })
            .collect();

        let mut flags = MessageFlags::empty();
        flags.set(MessageFlags::ENCRYPTED, config.encrypted);
        flags.set(MessageFlags::INTEGRITY_PROTECTED, config.integrity_protected);
        flags.set(MessageFlags::NON_REPLAYABLE, config.non_replayable);

        RequestEnvelope {
            version: PROTOCOL_VERSION,
            message_id: state.next_message_id,
            entity_id: entity.as_str().to_string(),
            entity_auth: self.entity_auth.clone(),
            user_id: config.user_id,
            user_auth: config.user_auth,
            flags,
            key_requests,
            master_token: state.master_token.clone(),
            payload,
        }
    }
}

fn protocol_failure(err: ProtocolError) -> CourierError {
    EngineError::Protocol(err.to_string()).into()
}

/// Builds sessions backed by [`TcpEngine`] and [`FileTokenStore`].
#[derive(Debug, Clone)]
pub struct TcpSessionFactory<E: Environment> {
    env: E,
}

impl<E: Environment> TcpSessionFactory<E> {
    /// Factory drawing key-request material and message ids from `env`.
    pub fn new(env: E) -> Self {
        Self { env }
    }
}

impl<E: Environment> SessionFactory for TcpSessionFactory<E> {
    fn build(
        &self,
        identity: &EntityIdentity,
        session: &SessionConfig,
    ) -> Result<Session, CourierError> {
        let config = &session.config;
        config.entity_auth_key(&session.entity_auth, identity)?;

        let initial = TokenState { master_token: None, next_message_id: self.env.random_u64() };
        let store: Arc<dyn TokenStore> =
            Arc::new(FileTokenStore::open(&config.store.dir, identity, initial)?);

        let key_exchange = Arc::new(KeyExchangeCache::new(Box::new(AllowListBuilder::new(
            config.key_exchange.clone(),
            identity.clone(),
            self.env.clone(),
        ))));

        let engine = TcpEngine::new(
            session.entity_auth.clone(),
            config.connect_timeout(),
            Arc::clone(&store),
            Arc::clone(&key_exchange),
        );

        Ok(Session::new(identity.clone(), Box::new(engine), store, key_exchange))
    }
}
