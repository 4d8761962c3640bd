//! Interactive loop.
//!
//! One state, awaiting input. Each line is either a reserved command or a
//! partial option set that is merged over the overlay before one dispatch.
//! An empty line resends with the current options. Failures are reported and
//! the loop continues; only `quit` or end of input ends it.

use std::io;

use courier_core::{ArgumentError, OptionSet};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use crate::{
    app::{ClientApp, MANUAL},
    session::SessionFactory,
};

/// Prompt shown before each line of input.
pub const PROMPT: &str = "args: ";

/// Reserved word that prints the manual, also accepted as the first
/// command-line argument.
pub const HELP_COMMAND: &str = "help";

/// Interactive command summary, printed by `?`.
pub const HINT: &str = r#"Choices:
a) Modify options, if any need to be modified, and press Enter to send a message.
   Use exactly the same syntax as on the command line.
b) Type "list" to list the current options.
c) Type "help" for detailed instructions on using this tool.
d) Type "save" to save the session store to disk. It is also saved on exit.
e) Type "quit" to quit this tool."#;

/// Reserved interactive commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Leave the loop.
    Quit,
    /// Print the manual.
    Help,
    /// Print the current options.
    List,
    /// Flush the live session's token store.
    Save,
    /// Print the command summary.
    Hint,
}

impl Command {
    const WORDS: [(&'static str, Self); 5] = [
        ("quit", Self::Quit),
        (HELP_COMMAND, Self::Help),
        ("list", Self::List),
        ("save", Self::Save),
        ("?", Self::Hint),
    ];

    /// Match trimmed input as a case-insensitive prefix of exactly one
    /// reserved word. Empty and ambiguous input is not a command.
    pub fn parse(input: &str) -> Option<Self> {
        let input = input.trim().to_ascii_lowercase();
        if input.is_empty() {
            return None;
        }

        let mut matches = Self::WORDS.iter().filter(|(word, _)| word.starts_with(&input));
        match (matches.next(), matches.next()) {
            (Some((_, command)), None) => Some(*command),
            _ => None,
        }
    }
}

/// Drive `app` from `input` until `quit` or end of input.
///
/// Only an I/O failure of `input` itself is returned; lines that are not
/// valid UTF-8 are reported and skipped.
pub async fn run<F, R>(app: &mut ClientApp<F>, mut input: R) -> io::Result<()>
where
    F: SessionFactory,
    R: AsyncBufRead + Unpin,
{
    let mut buf = Vec::new();

    loop {
        app.console().prompt(PROMPT);

        buf.clear();
        if input.read_until(b'\n', &mut buf).await? == 0 {
            tracing::info!("end of operator input");
            return Ok(());
        }

        // Non-UTF-8 line: report and keep reading
        let Ok(line) = std::str::from_utf8(&buf) else {
            app.console().err(format_args!("Error: {}", ArgumentError::InvalidEncoding));
            continue;
        };

        match Command::parse(line) {
            Some(Command::Quit) => return Ok(()),
            Some(Command::Help) => app.console().out(MANUAL),
            Some(Command::List) => {
                let listing = app.overlay().to_string();
                app.console().out(listing);
            },
            Some(Command::Save) => app.save(),
            Some(Command::Hint) => app.console().out(HINT),
            None => round(app, line.trim()).await,
        }
    }
}

async fn round<F: SessionFactory>(app: &mut ClientApp<F>, line: &str) {
    if !line.is_empty() {
        if let Err(e) = OptionSet::from_line(line).and_then(|partial| app.merge(partial)) {
            app.console().err(format_args!("Error: {e}"));
            return;
        }
    }

    let status = app.send_single_request().await;
    if !status.is_ok() {
        app.console().out(format_args!("Status: {status}"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefixes_select_commands() {
        assert_eq!(Command::parse("q"), Some(Command::Quit));
        assert_eq!(Command::parse("  QUIT "), Some(Command::Quit));
        assert_eq!(Command::parse("h"), Some(Command::Help));
        assert_eq!(Command::parse("l"), Some(Command::List));
        assert_eq!(Command::parse("sa"), Some(Command::Save));
        assert_eq!(Command::parse("?"), Some(Command::Hint));
    }

    #[test]
    fn non_commands_fall_through() {
        assert_eq!(Command::parse(""), None);
        assert_eq!(Command::parse("   "), None);
        assert_eq!(Command::parse("quitter"), None);
        assert_eq!(Command::parse("-eid A"), None);
    }

    #[test]
    fn hint_text() {
        insta::assert_snapshot!(HINT, @r#"
        Choices:
        a) Modify options, if any need to be modified, and press Enter to send a message.
           Use exactly the same syntax as on the command line.
        b) Type "list" to list the current options.
        c) Type "help" for detailed instructions on using this tool.
        d) Type "save" to save the session store to disk. It is also saved on exit.
        e) Type "quit" to quit this tool.
        "#);
    }
}
