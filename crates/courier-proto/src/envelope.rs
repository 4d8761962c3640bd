//! Request and response envelopes.

use bitflags::bitflags;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Envelope version spoken by this crate.
pub const PROTOCOL_VERSION: u8 = 1;

bitflags! {
    /// Per-message security requirements requested by the sender.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct MessageFlags: u8 {
        /// Payload must be encrypted.
        const ENCRYPTED = 0b0000_0001;
        /// Payload must be integrity protected.
        const INTEGRITY_PROTECTED = 0b0000_0010;
        /// Remote must reject duplicate delivery.
        const NON_REPLAYABLE = 0b0000_0100;
    }
}

impl Default for MessageFlags {
    fn default() -> Self {
        Self::ENCRYPTED | Self::INTEGRITY_PROTECTED
    }
}

/// One key-exchange request descriptor as carried on the wire.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyRequest {
    /// Key-exchange scheme name.
    pub scheme: String,
    /// Mechanism within the scheme, if the scheme has one.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub mechanism: Option<String>,
    /// Fresh request material.
    pub nonce: Bytes,
}

impl std::fmt::Debug for KeyRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyRequest")
            .field("scheme", &self.scheme)
            .field("mechanism", &self.mechanism)
            .field("nonce", &format!("<redacted {} bytes>", self.nonce.len()))
            .finish()
    }
}

/// A single outbound message.
///
/// # Security
///
/// - **Debug Redaction**: The `Debug` impl redacts `master_token` and
///   `payload` so verbose tracing never dumps credentials or message bodies.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestEnvelope {
    /// Envelope version.
    pub version: u8,
    /// Sender-assigned message id, monotonic per entity.
    pub message_id: u64,
    /// Authenticating entity.
    pub entity_id: String,
    /// Entity authentication scheme.
    pub entity_auth: String,
    /// User on whose behalf the message is sent.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub user_id: Option<String>,
    /// User authentication scheme.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub user_auth: Option<String>,
    /// Requested message security.
    pub flags: MessageFlags,
    /// Key-exchange descriptors offered with this message.
    #[serde(default)]
    pub key_requests: Vec<KeyRequest>,
    /// Master token from a previous exchange.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub master_token: Option<Bytes>,
    /// Application payload.
    pub payload: Bytes,
}

impl std::fmt::Debug for RequestEnvelope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestEnvelope")
            .field("version", &self.version)
            .field("message_id", &self.message_id)
            .field("entity_id", &self.entity_id)
            .field("entity_auth", &self.entity_auth)
            .field("user_id", &self.user_id)
            .field("user_auth", &self.user_auth)
            .field("flags", &self.flags)
            .field("key_requests", &self.key_requests)
            .field(
                "master_token",
                &self.master_token.as_ref().map(|t| format!("<redacted {} bytes>", t.len())),
            )
            .field("payload", &format!("<{} bytes>", self.payload.len()))
            .finish()
    }
}

/// Structured rejection from the remote party.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorHeader {
    /// Remote error code.
    pub code: i32,
    /// Human readable detail.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub message: Option<String>,
}

/// A single inbound reply.
///
/// A well-formed reply carries a payload or an error header. The envelope
/// itself does not enforce that; the dispatcher does.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    /// Envelope version.
    pub version: u8,
    /// Echo of the request's message id.
    pub message_id: u64,
    /// Reply payload.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub payload: Option<Bytes>,
    /// Remote rejection.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error: Option<ErrorHeader>,
    /// Replacement master token issued by the remote.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub master_token: Option<Bytes>,
}

impl ResponseEnvelope {
    /// Reply carrying a payload.
    pub fn with_payload(message_id: u64, payload: impl Into<Bytes>) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            message_id,
            payload: Some(payload.into()),
            error: None,
            master_token: None,
        }
    }

    /// Reply carrying a structured error.
    pub fn with_error(message_id: u64, code: i32, message: Option<String>) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            message_id,
            payload: None,
            error: Some(ErrorHeader { code, message }),
            master_token: None,
        }
    }
}

impl std::fmt::Debug for ResponseEnvelope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseEnvelope")
            .field("version", &self.version)
            .field("message_id", &self.message_id)
            .field("payload", &self.payload.as_ref().map(|p| format!("<{} bytes>", p.len())))
            .field("error", &self.error)
            .field(
                "master_token",
                &self.master_token.as_ref().map(|t| format!("<redacted {} bytes>", t.len())),
            )
            .finish()
    }
}
