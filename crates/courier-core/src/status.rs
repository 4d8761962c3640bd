//! Exit-status taxonomy and failure classification.
//!
//! Every dispatch attempt ends in exactly one [`Status`]. Failures are
//! classified by a single priority table: after unwrapping one level of
//! worker-task wrapping, the first matching row wins.
//!
//! | precedence | matches | status |
//! |---|---|---|
//! | 1 | malformed or inconsistent input | `ArgError` |
//! | 2 | configuration, key file, or allow-list failure | `CfgError` |
//! | 3 | protocol engine raised during processing | `ProtocolExc` |
//! | 4 | structured remote error, ill-formed engine outcome | `ProtocolError` |
//! | 5 | connection failure | `CommError` |
//! | - | anything else | `InternalError` |
//!
//! Engine failures rank above remote errors: an engine failure aborts
//! processing before any reply is parsed.

use std::fmt;

use crate::{CourierError, DispatchOutcome};

/// Caller-visible outcome of one top-level operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Status {
    /// Success.
    Ok = 0,
    /// Invalid arguments.
    ArgError = 1,
    /// Configuration error.
    CfgError = 2,
    /// Exception from the protocol engine.
    ProtocolExc = 3,
    /// Protocol error reply from the remote party.
    ProtocolError = 4,
    /// Problem connecting or talking to the remote party.
    CommError = 5,
    /// Internal execution error.
    InternalError = 6,
}

type Matcher = fn(&CourierError) -> bool;

const PRECEDENCE: [(Matcher, Status); 5] = [
    (is_argument, Status::ArgError),
    (is_configuration, Status::CfgError),
    (is_engine_failure, Status::ProtocolExc),
    (is_remote_error, Status::ProtocolError),
    (is_communication, Status::CommError),
];

fn is_argument(err: &CourierError) -> bool {
    matches!(err, CourierError::Argument(_))
}

fn is_configuration(err: &CourierError) -> bool {
    matches!(err, CourierError::Config(_) | CourierError::KeyExchange(_))
}

fn is_engine_failure(err: &CourierError) -> bool {
    matches!(err, CourierError::Engine(_))
}

fn is_remote_error(err: &CourierError) -> bool {
    matches!(err, CourierError::Rejected(_) | CourierError::MalformedResponse)
}

fn is_communication(err: &CourierError) -> bool {
    matches!(err, CourierError::Communication { .. })
}

impl Status {
    /// Process exit code.
    pub const fn code(self) -> u8 {
        self as u8
    }

    /// Short explanation.
    pub const fn info(self) -> &'static str {
        match self {
            Self::Ok => "Success",
            Self::ArgError => "Invalid Arguments",
            Self::CfgError => "Configuration File Error",
            Self::ProtocolExc => "Protocol Engine Exception",
            Self::ProtocolError => "Server Protocol Error Reply",
            Self::CommError => "Server Communication Error",
            Self::InternalError => "Internal Execution Error",
        }
    }

    /// Classify a failure.
    pub fn classify(err: &CourierError) -> Self {
        let cause = err.cause();
        PRECEDENCE
            .iter()
            .find(|(matches, _)| matches(cause))
            .map_or(Self::InternalError, |(_, status)| *status)
    }

    /// Status of a completed dispatch, successful or not.
    pub fn of(result: &Result<DispatchOutcome, CourierError>) -> Self {
        match result {
            Ok(DispatchOutcome::Payload(_)) => Self::Ok,
            Ok(DispatchOutcome::Rejected(_)) => Self::ProtocolError,
            Err(err) => Self::classify(err),
        }
    }

    /// Whether this is [`Status::Ok`].
    pub const fn is_ok(self) -> bool {
        matches!(self, Self::Ok)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code(), self.info())
    }
}
