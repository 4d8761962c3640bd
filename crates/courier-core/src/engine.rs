//! Boundary to the external protocol engine.
//!
//! The engine owns framing, encryption, authentication and the actual key
//! exchange. This side only hands it one message per round and interprets
//! what comes back.

use std::{fmt, str::FromStr};

use async_trait::async_trait;
use bytes::Bytes;

use crate::{ArgumentError, CourierError};

/// Identity of the authenticating party.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityIdentity(String);

impl EntityIdentity {
    /// Wrap an entity id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The raw id.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Remote endpoint, `[tcp://]host:port`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// Host name or address.
    pub host: String,
    /// TCP port.
    pub port: u16,
}

impl FromStr for Endpoint {
    type Err = ArgumentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ArgumentError::InvalidUrl(s.to_string());

        let rest = s.strip_prefix("tcp://").unwrap_or(s);
        if rest.contains("://") {
            return Err(invalid());
        }
        let rest = rest.trim_end_matches('/');

        let (host, port) = rest.rsplit_once(':').ok_or_else(invalid)?;
        let host = host.trim_start_matches('[').trim_end_matches(']');
        if host.is_empty() {
            return Err(invalid());
        }
        let port = port.parse().map_err(|_| invalid())?;

        Ok(Self { host: host.to_string(), port })
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// Per-message security and addressing options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageConfig {
    /// User on whose behalf the message is sent.
    pub user_id: Option<String>,
    /// User authentication scheme, when a user is set.
    pub user_auth: Option<String>,
    /// Payload must be encrypted.
    pub encrypted: bool,
    /// Payload must be integrity protected.
    pub integrity_protected: bool,
    /// Remote must reject duplicate delivery.
    pub non_replayable: bool,
}

impl Default for MessageConfig {
    fn default() -> Self {
        Self {
            user_id: None,
            user_auth: None,
            encrypted: true,
            integrity_protected: true,
            non_replayable: false,
        }
    }
}

/// One message handed to the engine.
#[derive(Debug, Clone)]
pub struct OutboundMessage {
    /// Where to send it.
    pub endpoint: Endpoint,
    /// Sending entity.
    pub entity: EntityIdentity,
    /// Message options.
    pub config: MessageConfig,
    /// Application payload.
    pub payload: Bytes,
}

/// Structured rejection from the remote party.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorReply {
    /// Remote error code.
    pub code: i32,
    /// Optional detail.
    pub message: Option<String>,
}

impl fmt::Display for ErrorReply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.message {
            Some(message) => write!(f, "error_code {}, error_msg \"{}\"", self.code, message),
            None => write!(f, "error_code {}", self.code),
        }
    }
}

/// What the engine hands back for one message.
///
/// Deliberately loose: the engine may return anything, and
/// [`DispatchOutcome::try_from`] decides whether it is well formed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineResponse {
    /// Reply payload.
    pub payload: Option<Bytes>,
    /// Remote rejection.
    pub error: Option<ErrorReply>,
}

/// Well-formed result of a completed message round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Remote accepted the message and replied.
    Payload(Bytes),
    /// Remote rejected the message.
    Rejected(ErrorReply),
}

impl TryFrom<EngineResponse> for DispatchOutcome {
    type Error = CourierError;

    fn try_from(response: EngineResponse) -> Result<Self, Self::Error> {
        match response {
            EngineResponse { payload: Some(payload), .. } => Ok(Self::Payload(payload)),
            EngineResponse { payload: None, error: Some(error) } => Ok(Self::Rejected(error)),
            EngineResponse { payload: None, error: None } => Err(CourierError::MalformedResponse),
        }
    }
}

/// The external protocol engine bound to one entity.
///
/// Implementations pull key-exchange descriptors from the session's
/// [`crate::KeyExchangeCache`] while processing `send`, possibly from a
/// worker task.
#[async_trait]
pub trait ProtocolEngine: Send + Sync {
    /// Send one message and wait for the reply.
    async fn send(&mut self, message: OutboundMessage) -> Result<EngineResponse, CourierError>;

    /// Toggle message-level tracing.
    fn set_verbose(&mut self, verbose: bool);
}
