//! Courier Core
//!
//! Session and key-exchange coordination for the Courier messaging client.
//! Everything here is independent of the transport: the protocol engine and
//! the token store are reached only through the traits in [`engine`] and
//! [`store`].
//!
//! # Components
//!
//! - [`ArgumentOverlay`]: current option values, merged round by round
//! - [`KeyExchangeCache`]: single-slot key request cache with consume tracking
//! - [`Status`]: exit-status taxonomy and the failure classifier
//! - [`Config`]: configuration file and key files
//! - [`ProtocolEngine`]: boundary to the external protocol engine
//! - [`TokenStore`]: boundary to persistent per-entity session state

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod args;
pub mod config;
pub mod engine;
pub mod env;
pub mod error;
pub mod keyx;
pub mod status;
pub mod store;

pub use args::{ArgumentOverlay, DELETION_SENTINEL, OptionKey, OptionSet, tokenize};
pub use config::{AuthConfig, Config, KeyFileEntry, NetworkConfig, StoreConfig};
pub use engine::{
    DispatchOutcome, Endpoint, EngineResponse, EntityIdentity, ErrorReply, MessageConfig,
    OutboundMessage, ProtocolEngine,
};
pub use env::Environment;
pub use error::{ArgumentError, ConfigError, CourierError, EngineError, KeyExchangeError, StoreError};
pub use keyx::{
    AllowListBuilder, DescriptorBuilder, DescriptorSet, KeyExchangeAllowList, KeyExchangeCache,
    KeyExchangeConfig, KeyRequestDescriptor,
};
pub use status::Status;
pub use store::{FileTokenStore, MemoryTokenStore, TokenState, TokenStore};
