//! Request Dispatcher
//!
//! Turns the current overlay into one engine call and interprets the result.
//!
//! # Invariants
//!
//! - An inline payload together with an input file is rejected before the
//!   payload is read or the engine is touched
//! - The key-exchange cache is reconfigured before `send`, never during it
//! - A response with neither payload nor error is a failure, never a success

use std::path::PathBuf;

use bytes::Bytes;
use courier_core::{
    ArgumentError, ArgumentOverlay, Config, CourierError, DispatchOutcome, OptionKey,
    OutboundMessage,
};

use crate::session::Session;

/// Where the request payload comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayloadSource {
    /// `-msg` text.
    Inline(String),
    /// `-if` file contents.
    File(PathBuf),
    /// Neither given; an empty payload is sent.
    Empty,
}

impl PayloadSource {
    /// Pick the payload source, rejecting `-if` together with `-msg`.
    pub fn from_overlay(overlay: &ArgumentOverlay) -> Result<Self, ArgumentError> {
        match (overlay.get(OptionKey::InputFile), overlay.get(OptionKey::Message)) {
            (Some(_), Some(_)) => Err(ArgumentError::Conflict {
                first: OptionKey::InputFile.name(),
                second: OptionKey::Message.name(),
            }),
            (Some(path), None) => Ok(Self::File(PathBuf::from(path))),
            (None, Some(text)) => Ok(Self::Inline(text.to_string())),
            (None, None) => Ok(Self::Empty),
        }
    }

    async fn load(self) -> Result<Bytes, CourierError> {
        match self {
            Self::Inline(text) => Ok(Bytes::from(text)),
            Self::File(path) => tokio::fs::read(&path)
                .await
                .map(Bytes::from)
                .map_err(|e| CourierError::io(format!("cannot read {}", path.display()), e)),
            Self::Empty => Ok(Bytes::new()),
        }
    }
}

/// Send one message built from `overlay` through `session`'s engine.
pub async fn dispatch(
    session: &mut Session,
    overlay: &ArgumentOverlay,
    config: &Config,
) -> Result<DispatchOutcome, CourierError> {
    let source = PayloadSource::from_overlay(overlay)?;
    let endpoint = overlay.endpoint()?;

    let message_config = overlay.message_config();
    if let Some(scheme) = &message_config.user_auth {
        config.check_user_auth(scheme)?;
    }

    if let Some((scheme, mechanism)) = overlay.key_exchange() {
        session.key_exchange().reconfigure(scheme, mechanism)?;
    }

    let payload = source.load().await?;
    let message = OutboundMessage {
        endpoint,
        entity: session.identity().clone(),
        config: message_config,
        payload,
    };

    tracing::debug!(entity = %message.entity, endpoint = %message.endpoint, "dispatching");

    let engine = session.engine_mut();
    engine.set_verbose(overlay.is_verbose());
    let response = engine.send(message).await?;

    DispatchOutcome::try_from(response)
}
