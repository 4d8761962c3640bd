//! Error taxonomy.
//!
//! Every layer has its own error enum; they all fold into [`CourierError`],
//! which is what a dispatch attempt returns and what [`crate::Status`]
//! classifies.

use std::path::PathBuf;

use thiserror::Error;

use crate::engine::ErrorReply;

/// Malformed or inconsistent command-line / interactive input.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ArgumentError {
    /// Option name outside the recognized set.
    #[error("unrecognized option: {0}")]
    UnknownOption(String),

    /// Bare value where an option name was expected.
    #[error("expected an option name starting with '-', got {0:?}")]
    UnexpectedToken(String),

    /// Option given without a value.
    #[error("option {0} requires a value")]
    MissingValue(&'static str),

    /// Value begins with '-' but is not the deletion sentinel.
    #[error("invalid value {value:?} for {option}: values must not begin with '-'")]
    HyphenValue {
        /// Option name.
        option: &'static str,
        /// Offending value.
        value: String,
    },

    /// Boolean option with a value other than true/false.
    #[error("invalid value {value:?} for {option}: expected true or false")]
    InvalidBoolean {
        /// Option name.
        option: &'static str,
        /// Offending value.
        value: String,
    },

    /// Deletion sentinel used outside interactive mode.
    #[error("cannot remove {0}: the deletion sentinel is only allowed in interactive mode")]
    SentinelNotAllowed(&'static str),

    /// Interactive mode toggled after startup.
    #[error("interactive mode cannot be changed at runtime")]
    InteractiveFixed,

    /// Required option absent at dispatch time.
    #[error("missing required option {0}")]
    Missing(&'static str),

    /// Two mutually exclusive options both set.
    #[error("{first} and {second} cannot be both specified")]
    Conflict {
        /// First option.
        first: &'static str,
        /// Second option.
        second: &'static str,
    },

    /// Quoted token never closed.
    #[error("unterminated quote in input")]
    UnterminatedQuote,

    /// Operator input line that is not valid UTF-8.
    #[error("input line is not valid UTF-8")]
    InvalidEncoding,

    /// Endpoint that cannot be parsed.
    #[error("invalid url {0:?}: expected [tcp://]host:port")]
    InvalidUrl(String),
}

/// Configuration file, key file, or allow-list failure.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// File could not be read.
    #[error("cannot read {path}: {source}")]
    Io {
        /// File path.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Configuration file is not valid TOML for [`crate::Config`].
    #[error("invalid configuration file {path}: {source}")]
    Parse {
        /// File path.
        path: PathBuf,
        /// Parser error.
        source: toml::de::Error,
    },

    /// Key file does not have the expected three lines.
    #[error("invalid key file {path}: {reason}")]
    KeyFile {
        /// File path.
        path: PathBuf,
        /// What is wrong with it.
        reason: String,
    },

    /// Authentication scheme not on the allow-list.
    #[error("unsupported {kind} authentication scheme {name:?}")]
    UnsupportedScheme {
        /// "entity" or "user".
        kind: &'static str,
        /// Requested scheme.
        name: String,
    },

    /// Scheme needs key material that was never registered.
    #[error("{scheme} authentication for {entity} requires a key file")]
    MissingKey {
        /// Entity authentication scheme.
        scheme: String,
        /// Entity identity.
        entity: String,
    },
}

/// Key-exchange descriptor computation failure.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum KeyExchangeError {
    /// Scheme not on the allow-list.
    #[error("unsupported key exchange scheme {0:?}")]
    UnknownScheme(String),

    /// Scheme needs a mechanism and none was given.
    #[error("key exchange scheme {scheme} requires a mechanism")]
    MechanismRequired {
        /// Scheme name.
        scheme: String,
    },

    /// Mechanism not supported by the scheme.
    #[error("key exchange mechanism {mechanism:?} is not supported by {scheme}")]
    UnsupportedMechanism {
        /// Scheme name.
        scheme: String,
        /// Mechanism name.
        mechanism: String,
    },
}

/// Failure raised by the protocol engine while processing a message.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// Message could not be built, framed, or parsed.
    #[error("protocol failure: {0}")]
    Protocol(String),

    /// Engine-side key exchange failed.
    #[error("key exchange failure: {0}")]
    KeyExchange(String),

    /// Engine-side authentication failed.
    #[error("authentication failure: {0}")]
    Authentication(String),
}

/// Token store persistence failure.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Store file could not be read or written.
    #[error("token store {path}: {source}")]
    Io {
        /// Store file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Stored state could not be serialized.
    #[error("token store encode error: {0}")]
    Encode(String),

    /// Stored state is corrupt.
    #[error("token store decode error: {0}")]
    Decode(String),
}

/// Every failure a dispatch attempt can produce.
#[derive(Debug, Error)]
pub enum CourierError {
    /// Invalid input.
    #[error(transparent)]
    Argument(#[from] ArgumentError),

    /// Invalid configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Key-exchange parameters rejected.
    #[error(transparent)]
    KeyExchange(#[from] KeyExchangeError),

    /// Protocol engine raised during processing.
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// Remote party rejected the message with a structured error.
    #[error("remote error {0}")]
    Rejected(ErrorReply),

    /// Engine returned neither payload nor error.
    #[error("response with no payload or error header")]
    MalformedResponse,

    /// Remote endpoint unreachable or connection lost.
    #[error("communication with {endpoint} failed: {source}")]
    Communication {
        /// Endpoint being contacted.
        endpoint: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Token store failure.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Local file I/O failure.
    #[error("{context}: {source}")]
    Io {
        /// What was being attempted.
        context: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Failure raised on a worker task, surfaced through its join.
    #[error("execution failed: {0}")]
    Execution(#[source] Box<CourierError>),

    /// Unexpected failure.
    #[error("internal error: {0}")]
    Internal(String),
}

impl CourierError {
    /// The failure beneath one level of worker-task wrapping.
    pub fn cause(&self) -> &Self {
        match self {
            Self::Execution(inner) => inner,
            other => other,
        }
    }

    /// Wrap a failure raised on a worker task.
    pub fn execution(inner: Self) -> Self {
        Self::Execution(Box::new(inner))
    }

    /// Wrap a local I/O failure with context.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io { context: context.into(), source }
    }
}
