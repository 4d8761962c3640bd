//! Scripted protocol engine.
//!
//! Replays queued [`Reply`] values in order and records what the
//! orchestrator handed it. Like the real engine it fetches key-exchange
//! descriptors from the session cache inside `send`, a configurable number
//! of times to model engine-side retries.

use std::{collections::VecDeque, io, sync::Arc};

use async_trait::async_trait;
use bytes::Bytes;
use courier_core::{
    CourierError, DescriptorSet, EngineError, EngineResponse, ErrorReply, KeyExchangeCache,
    OutboundMessage, ProtocolEngine,
};
use parking_lot::Mutex;

/// One scripted engine outcome.
#[derive(Debug, Clone)]
pub enum Reply {
    /// Remote accepted and replied with this payload.
    Payload(Bytes),
    /// Remote rejected with a structured error.
    Error(ErrorReply),
    /// Raw engine response, e.g. neither payload nor error.
    Raw(EngineResponse),
    /// Engine raised directly.
    EngineFailure(EngineError),
    /// Engine raised on a worker task.
    WrappedEngineFailure(EngineError),
    /// Remote unreachable, raised on a worker task.
    Unreachable,
}

impl Reply {
    /// Payload reply from a static string.
    pub fn payload(text: &'static str) -> Self {
        Self::Payload(Bytes::from_static(text.as_bytes()))
    }

    /// Structured error reply.
    pub fn error(code: i32, message: Option<&str>) -> Self {
        Self::Error(ErrorReply { code, message: message.map(str::to_string) })
    }

    fn into_result(self, endpoint: String) -> Result<EngineResponse, CourierError> {
        match self {
            Self::Payload(payload) => Ok(EngineResponse { payload: Some(payload), error: None }),
            Self::Error(error) => Ok(EngineResponse { payload: None, error: Some(error) }),
            Self::Raw(response) => Ok(response),
            Self::EngineFailure(e) => Err(e.into()),
            Self::WrappedEngineFailure(e) => Err(CourierError::execution(e.into())),
            Self::Unreachable => Err(CourierError::execution(CourierError::Communication {
                endpoint,
                source: io::Error::from(io::ErrorKind::ConnectionRefused),
            })),
        }
    }
}

/// Everything a scripted engine observed.
#[derive(Debug, Default)]
pub struct EngineLog {
    /// Messages handed to `send`, in order.
    pub sends: Vec<OutboundMessage>,
    /// Descriptor sets fetched during sends, in order.
    pub fetched: Vec<DescriptorSet>,
    /// Verbose flag at each send.
    pub verbose: Vec<bool>,
}

/// Engine that replays a shared reply queue.
pub struct ScriptedEngine {
    key_exchange: Arc<KeyExchangeCache>,
    replies: Arc<Mutex<VecDeque<Reply>>>,
    log: Arc<Mutex<EngineLog>>,
    fetches_per_send: usize,
    verbose: bool,
}

impl ScriptedEngine {
    /// Engine reading `replies` and recording into `log`.
    ///
    /// With an empty queue it echoes the request payload.
    pub fn new(
        key_exchange: Arc<KeyExchangeCache>,
        replies: Arc<Mutex<VecDeque<Reply>>>,
        log: Arc<Mutex<EngineLog>>,
    ) -> Self {
        Self { key_exchange, replies, log, fetches_per_send: 1, verbose: false }
    }

    /// Fetch descriptors `n` times per send.
    #[must_use]
    pub fn with_fetches_per_send(mut self, n: usize) -> Self {
        self.fetches_per_send = n;
        self
    }
}

#[async_trait]
impl ProtocolEngine for ScriptedEngine {
    async fn send(&mut self, message: OutboundMessage) -> Result<EngineResponse, CourierError> {
        let fetched: Vec<DescriptorSet> =
            (0..self.fetches_per_send).map(|_| self.key_exchange.fetch()).collect();

        let endpoint = message.endpoint.to_string();
        let echo = message.payload.clone();
        {
            let mut log = self.log.lock();
            log.fetched.extend(fetched);
            log.verbose.push(self.verbose);
            log.sends.push(message);
        }

        let reply = self.replies.lock().pop_front().unwrap_or(Reply::Payload(echo));
        tracing::debug!(?reply, "scripted reply");
        reply.into_result(endpoint)
    }

    fn set_verbose(&mut self, verbose: bool) {
        self.verbose = verbose;
    }
}
