//! Client orchestrator.
//!
//! [`ClientApp`] owns the argument overlay, the loaded configuration and the
//! session manager, and turns one overlay state into one printed result.
//! [`run`] is the process entry point shared by the binary and the
//! end-to-end tests.
//!
//! # Output
//!
//! ```text
//! Options: -eid client-1 -msg hello -url localhost:4500
//! Response: hello back
//! Exit Status 0: Success
//! ```
//!
//! Remote rejections go to the error stream as
//! `RESPONSE ERROR: error_code 7, error_msg "denied"`, other failures as
//! `Error: <cause>`.

use std::{
    fmt,
    io::{self, Write},
    path::Path,
    sync::Arc,
};

use bytes::Bytes;
use courier_core::{
    ArgumentError, ArgumentOverlay, Config, CourierError, DispatchOutcome, KeyFileEntry,
    OptionKey, OptionSet, Status,
};
use tokio::io::AsyncBufRead;

use crate::{
    dispatch::{PayloadSource, dispatch},
    repl::{self, HELP_COMMAND},
    session::{SessionConfig, SessionFactory, SessionManager},
};

/// Operator manual, printed by `help`.
pub const MANUAL: &str = include_str!("manual.txt");

/// Output and error streams for operator-facing text.
pub struct Console {
    out: Box<dyn Write + Send>,
    err: Box<dyn Write + Send>,
}

impl Console {
    /// Console over arbitrary writers.
    pub fn new(out: impl Write + Send + 'static, err: impl Write + Send + 'static) -> Self {
        Self { out: Box::new(out), err: Box::new(err) }
    }

    /// Console over the process's stdout and stderr.
    pub fn stdio() -> Self {
        Self::new(io::stdout(), io::stderr())
    }

    /// Write one line to the output stream.
    pub fn out(&mut self, line: impl fmt::Display) {
        if let Err(e) = writeln!(self.out, "{line}") {
            tracing::warn!(error = %e, "console write failed");
        }
    }

    /// Write one line to the error stream.
    pub fn err(&mut self, line: impl fmt::Display) {
        if let Err(e) = writeln!(self.err, "{line}") {
            tracing::warn!(error = %e, "console write failed");
        }
    }

    /// Write a prompt without a newline and flush.
    pub fn prompt(&mut self, prompt: &str) {
        if let Err(e) = write!(self.out, "{prompt}").and_then(|()| self.out.flush()) {
            tracing::warn!(error = %e, "console write failed");
        }
    }
}

impl fmt::Debug for Console {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Console").finish_non_exhaustive()
    }
}

/// Load the configuration file and key files named in `overlay`.
///
/// Each key file's entity id is merged into the overlay as `-eid`, the
/// model-group key file last.
pub fn load_config(overlay: &mut ArgumentOverlay) -> Result<Config, CourierError> {
    let mut config = Config::load(overlay.get(OptionKey::Config).map(Path::new))?;

    for key in [OptionKey::PskFile, OptionKey::MgkFile] {
        let Some(path) = overlay.get(key) else {
            continue;
        };
        let entry = KeyFileEntry::read(Path::new(path))?;
        tracing::info!(option = %key, entity = %entry.entity_id, "key file loaded");

        let entity = OptionSet::default().with(OptionKey::EntityId, entry.entity_id.clone());
        if key == OptionKey::PskFile {
            config.add_preshared_key(entry);
        } else {
            config.add_model_group_key(entry);
        }
        overlay.merge(entity)?;
    }

    Ok(config)
}

/// One client process: overlay, configuration, live session, console.
pub struct ClientApp<F: SessionFactory> {
    overlay: ArgumentOverlay,
    config: Arc<Config>,
    sessions: SessionManager<F>,
    console: Console,
}

impl<F: SessionFactory> ClientApp<F> {
    /// Orchestrator with no live session yet.
    pub fn new(overlay: ArgumentOverlay, config: Config, factory: F, console: Console) -> Self {
        Self { overlay, config: Arc::new(config), sessions: SessionManager::new(factory), console }
    }

    /// Current option values.
    pub fn overlay(&self) -> &ArgumentOverlay {
        &self.overlay
    }

    /// Merge operator input over the current option values.
    pub fn merge(&mut self, partial: OptionSet) -> Result<(), ArgumentError> {
        self.overlay.merge(partial)
    }

    /// The session manager.
    pub fn sessions(&self) -> &SessionManager<F> {
        &self.sessions
    }

    /// Operator console.
    pub fn console(&mut self) -> &mut Console {
        &mut self.console
    }

    /// Give the console back, e.g. for the final exit line.
    pub fn into_console(self) -> Console {
        self.console
    }

    /// Send one message built from the current options and report the
    /// outcome.
    pub async fn send_single_request(&mut self) -> Status {
        self.console.out(format_args!("Options: {}", self.overlay));

        let result = self.round().await;
        let status = Status::of(&result);
        match &result {
            Ok(DispatchOutcome::Payload(_)) => {},
            Ok(DispatchOutcome::Rejected(reply)) => {
                self.console.err(format_args!("RESPONSE ERROR: {reply}"));
            },
            Err(err) => {
                tracing::debug!(%status, error = %err, "request failed");
                self.console.err(format_args!("Error: {err}"));
            },
        }
        status
    }

    async fn round(&mut self) -> Result<DispatchOutcome, CourierError> {
        // No session is built for a request that can never be sent
        PayloadSource::from_overlay(&self.overlay)?;

        let identity = self.overlay.entity_id()?;
        let session_config = SessionConfig {
            entity_auth: self.overlay.entity_auth().to_string(),
            config: Arc::clone(&self.config),
        };
        let session = self.sessions.ensure_session(&identity, &session_config)?;

        let outcome = dispatch(session, &self.overlay, &self.config).await?;
        if let DispatchOutcome::Payload(payload) = &outcome {
            self.deliver(payload).await?;
        }
        Ok(outcome)
    }

    async fn deliver(&mut self, payload: &Bytes) -> Result<(), CourierError> {
        match self.overlay.get(OptionKey::OutputFile) {
            Some(path) => tokio::fs::write(path, payload)
                .await
                .map_err(|e| CourierError::io(format!("cannot write {path}"), e)),
            None => {
                self.console.out(format_args!("Response: {}", String::from_utf8_lossy(payload)));
                Ok(())
            },
        }
    }

    /// Persist the live session's state without closing it.
    pub fn save(&mut self) {
        if let Err(e) = self.sessions.save() {
            tracing::debug!(error = %e, "save failed");
            self.console.err(format_args!("Error: {e}"));
        }
    }

    /// Flush and close the live session.
    pub fn shutdown(&mut self) {
        self.sessions.shutdown();
    }
}

/// Run the client for one process invocation.
///
/// `args` are the raw `-name value` tokens. Interactive mode reads operator
/// input from `input` and always ends with [`Status::Ok`] unless reading the
/// input fails. The final `Exit Status` line is written to `console`.
pub async fn run<F, R>(args: Vec<String>, factory: F, mut console: Console, input: R) -> Status
where
    F: SessionFactory,
    R: AsyncBufRead + Unpin,
{
    let status = match args.first() {
        None => {
            console.err(format_args!("Use {HELP_COMMAND} for help"));
            Status::ArgError
        },
        Some(first) if first.eq_ignore_ascii_case(HELP_COMMAND) => {
            console.out(MANUAL);
            Status::Ok
        },
        Some(_) => match startup(&args) {
            Ok((overlay, config)) => {
                let mut app = ClientApp::new(overlay, config, factory, console);
                let status = if app.overlay().is_interactive() {
                    match repl::run(&mut app, input).await {
                        Ok(()) => Status::Ok,
                        Err(e) => {
                            let err = CourierError::io("cannot read operator input", e);
                            app.console().err(format_args!("Error: {err}"));
                            Status::classify(&err)
                        },
                    }
                } else {
                    app.send_single_request().await
                };
                app.shutdown();
                console = app.into_console();
                status
            },
            Err(err) => {
                let status = Status::classify(&err);
                tracing::debug!(%status, error = %err, "startup failed");
                console.err(format_args!("Error: {err}"));
                status
            },
        },
    };

    console.out(format_args!("Exit Status {status}"));
    status
}

fn startup(args: &[String]) -> Result<(ArgumentOverlay, Config), CourierError> {
    let mut overlay = ArgumentOverlay::from_args(args)?;
    let config = load_config(&mut overlay)?;
    Ok((overlay, config))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::{
        io::Write as _,
        sync::{Arc, Mutex},
    };

    use super::*;
    use crate::{SystemEnv, TcpSessionFactory};

    /// Shared in-memory writer for console and log capture.
    #[derive(Clone, Default)]
    struct Capture(Arc<Mutex<Vec<u8>>>);

    impl Capture {
        fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    impl io::Write for Capture {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    async fn run_with_default_logging(args: &[&str]) -> (Status, String, String) {
        let logs = Capture::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::WARN)
            .with_writer(move || writer.clone())
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let err = Capture::default();
        let console = Console::new(io::sink(), err.clone());
        let args = args.iter().map(|s| (*s).to_string()).collect();
        let status =
            run(args, TcpSessionFactory::new(SystemEnv::new()), console, &b""[..]).await;
        (status, err.contents(), logs.contents())
    }

    #[test]
    fn key_file_entity_overrides_eid() {
        let mut psk = tempfile::NamedTempFile::new().unwrap();
        writeln!(psk, "from-psk\nkenc\nkhmac").unwrap();
        let path = psk.path().to_str().unwrap();

        let mut overlay = ArgumentOverlay::from_args(["-eid", "typed", "-psk", path]).unwrap();
        load_config(&mut overlay).unwrap();

        assert_eq!(overlay.get(OptionKey::EntityId), Some("from-psk"));
    }

    #[test]
    fn mgk_file_wins_over_psk_file() {
        let mut psk = tempfile::NamedTempFile::new().unwrap();
        writeln!(psk, "psk-entity\nkenc\nkhmac").unwrap();
        let mut mgk = tempfile::NamedTempFile::new().unwrap();
        writeln!(mgk, "mgk-entity\nkenc\nkhmac").unwrap();

        let mut overlay = ArgumentOverlay::from_args([
            "-psk",
            psk.path().to_str().unwrap(),
            "-mgk",
            mgk.path().to_str().unwrap(),
        ])
        .unwrap();
        load_config(&mut overlay).unwrap();

        assert_eq!(overlay.get(OptionKey::EntityId), Some("mgk-entity"));
    }

    #[test]
    fn unreadable_key_file_is_config_error() {
        let mut overlay = ArgumentOverlay::from_args(["-psk", "/nonexistent/psk.txt"]).unwrap();
        let err = load_config(&mut overlay).unwrap_err();
        assert_eq!(Status::classify(&err), Status::CfgError);
    }

    #[test]
    fn manual_mentions_every_option() {
        for key in OptionKey::ALL {
            assert!(MANUAL.contains(key.name()), "manual is missing {key}");
        }
    }

    #[tokio::test]
    async fn startup_failure_is_reported_once() {
        let (status, err, logs) = run_with_default_logging(&["-bogus", "x"]).await;

        assert_eq!(status, Status::ArgError);
        assert_eq!(err.matches("unrecognized option: -bogus").count(), 1);
        assert!(logs.is_empty(), "unexpected log output: {logs}");
    }

    #[tokio::test]
    async fn request_failure_is_reported_once() {
        let (status, err, logs) =
            run_with_default_logging(&["-url", "localhost:4500", "-msg", "hi"]).await;

        assert_eq!(status, Status::ArgError);
        assert_eq!(err.matches("missing required option -eid").count(), 1);
        assert!(logs.is_empty(), "unexpected log output: {logs}");
    }
}
