//! Courier Client
//!
//! The `courier` command-line client: binds the coordination layer from
//! `courier-core` to an operator console and a reference TCP engine.
//!
//! # Components
//!
//! - [`ClientApp`]: orchestrator owning the overlay, config and live session
//! - [`SessionManager`]: one live session, rebuilt on identity change
//! - [`dispatch()`]: one message round through the protocol engine
//! - [`repl`]: the interactive loop
//! - [`TcpEngine`]: reference engine speaking `courier-proto` over TCP

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod app;
pub mod dispatch;
pub mod repl;
pub mod session;
pub mod system_env;
pub mod tcp_engine;

pub use app::{ClientApp, Console, MANUAL, load_config, run};
pub use dispatch::{PayloadSource, dispatch};
pub use repl::{Command, HINT, PROMPT};
pub use session::{Session, SessionConfig, SessionFactory, SessionManager};
pub use system_env::SystemEnv;
pub use tcp_engine::{TcpEngine, TcpSessionFactory};
