//! Courier wire envelopes.
//!
//! Envelope types exchanged between the reference TCP engine and a remote
//! message server, and the length-prefixed CBOR framing that carries them.
//!
//! # Frame Layout
//!
//! ```text
//! ┌──────────────────────┬──────────────────────────────┐
//! │ length (u32, BE)     │ CBOR-encoded envelope        │
//! └──────────────────────┴──────────────────────────────┘
//! ```
//!
//! The envelopes carry opaque key-exchange and token material. Nothing in
//! this crate performs cryptography.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod codec;
mod envelope;
mod error;

pub use codec::{FRAME_HEADER_SIZE, MAX_FRAME_SIZE, decode_body, encode_frame, frame_length};
pub use envelope::{
    ErrorHeader, KeyRequest, MessageFlags, PROTOCOL_VERSION, RequestEnvelope, ResponseEnvelope,
};
pub use error::ProtocolError;
