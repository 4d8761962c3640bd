//! Test harness for the Courier client.
//!
//! Deterministic stand-ins for everything the orchestrator talks to, so the
//! session, dispatch and classification paths can be driven without a real
//! server:
//!
//! - [`ScriptedEngine`]: replays a queue of replies and records every send
//! - [`CountingFactory`]: builds scripted sessions and counts builds/flushes
//! - [`ReplyServer`]: in-process TCP server speaking `courier-proto`
//! - [`SharedBuffer`]: captures console output

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod console;
pub mod factory;
pub mod reply_server;
pub mod scripted_engine;
pub mod seq_env;

pub use console::{SharedBuffer, capture_console};
pub use factory::{BuiltSession, CountingFactory, CountingStore};
pub use reply_server::{ReplyServer, SERVER_MASTER_TOKEN, ServerBehavior, unreachable_endpoint};
pub use scripted_engine::{EngineLog, Reply, ScriptedEngine};
pub use seq_env::SeqEnv;
