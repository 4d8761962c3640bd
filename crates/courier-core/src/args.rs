//! Argument overlay store.
//!
//! Command-line arguments and interactive input share one grammar: a flat
//! list of `-name value` pairs. The initial arguments build the
//! [`ArgumentOverlay`]; every interactive round parses a partial
//! [`OptionSet`] and merges it over the current values.
//!
//! # Invariants
//!
//! - Only names in [`OptionKey::ALL`] are ever stored
//! - A merge never removes keys absent from the partial set
//! - The deletion sentinel removes a key only in interactive mode
//! - A merge is all-or-nothing: a rejected partial set changes nothing

use std::{collections::BTreeMap, fmt};

use crate::{ArgumentError, Endpoint, EntityIdentity, MessageConfig};

/// Value that removes an option from the overlay (interactive mode only).
pub const DELETION_SENTINEL: &str = "-";

/// Default user authentication scheme when `-uid` is given without `-uas`.
pub const DEFAULT_USER_AUTH: &str = "EMAIL_PASSWORD";

/// Default entity authentication scheme when `-eas` is absent.
pub const DEFAULT_ENTITY_AUTH: &str = "NONE";

/// Recognized option names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum OptionKey {
    /// `-cfg`: configuration file.
    Config,
    /// `-int`: interactive mode.
    Interactive,
    /// `-v`: verbose engine tracing.
    Verbose,
    /// `-url`: remote endpoint.
    Url,
    /// `-eid`: entity identity.
    EntityId,
    /// `-uid`: user id.
    UserId,
    /// `-eas`: entity authentication scheme.
    EntityAuth,
    /// `-uas`: user authentication scheme.
    UserAuth,
    /// `-kx`: key-exchange scheme.
    KeyExchange,
    /// `-kxm`: key-exchange mechanism.
    KeyExchangeMechanism,
    /// `-enc`: encrypt the request.
    Encrypted,
    /// `-sig`: integrity-protect the request.
    IntegrityProtected,
    /// `-nrep`: non-replayable request.
    NonReplayable,
    /// `-if`: payload input file.
    InputFile,
    /// `-of`: payload output file.
    OutputFile,
    /// `-msg`: inline payload.
    Message,
    /// `-psk`: pre-shared key file.
    PskFile,
    /// `-mgk`: model-group key file.
    MgkFile,
}

impl OptionKey {
    /// Every recognized option, in display order.
    pub const ALL: [Self; 18] = [
        Self::Config,
        Self::Interactive,
        Self::Verbose,
        Self::Url,
        Self::EntityId,
        Self::UserId,
        Self::EntityAuth,
        Self::UserAuth,
        Self::KeyExchange,
        Self::KeyExchangeMechanism,
        Self::Encrypted,
        Self::IntegrityProtected,
        Self::NonReplayable,
        Self::InputFile,
        Self::OutputFile,
        Self::Message,
        Self::PskFile,
        Self::MgkFile,
    ];

    /// Option name as typed, including the leading dash.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Config => "-cfg",
            Self::Interactive => "-int",
            Self::Verbose => "-v",
            Self::Url => "-url",
            Self::EntityId => "-eid",
            Self::UserId => "-uid",
            Self::EntityAuth => "-eas",
            Self::UserAuth => "-uas",
            Self::KeyExchange => "-kx",
            Self::KeyExchangeMechanism => "-kxm",
            Self::Encrypted => "-enc",
            Self::IntegrityProtected => "-sig",
            Self::NonReplayable => "-nrep",
            Self::InputFile => "-if",
            Self::OutputFile => "-of",
            Self::Message => "-msg",
            Self::PskFile => "-psk",
            Self::MgkFile => "-mgk",
        }
    }

    /// Look up an option by its typed name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|key| key.name() == name)
    }

    /// Whether the option takes `true`/`false`.
    pub const fn is_boolean(self) -> bool {
        matches!(
            self,
            Self::Interactive
                | Self::Verbose
                | Self::Encrypted
                | Self::IntegrityProtected
                | Self::NonReplayable
        )
    }

    const fn default_flag(self) -> bool {
        matches!(self, Self::Encrypted | Self::IntegrityProtected)
    }
}

impl fmt::Display for OptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Split a line into tokens on whitespace, honoring single and double quotes.
pub fn tokenize(line: &str) -> Result<Vec<String>, ArgumentError> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_token = false;
    let mut quote: Option<char> = None;

    for c in line.chars() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => current.push(c),
            None if c == '"' || c == '\'' => {
                quote = Some(c);
                in_token = true;
            },
            None if c.is_whitespace() => {
                if in_token {
                    tokens.push(std::mem::take(&mut current));
                    in_token = false;
                }
            },
            None => {
                current.push(c);
                in_token = true;
            },
        }
    }

    if quote.is_some() {
        return Err(ArgumentError::UnterminatedQuote);
    }
    if in_token {
        tokens.push(current);
    }
    Ok(tokens)
}

fn parse_bool(key: OptionKey, value: &str) -> Result<bool, ArgumentError> {
    if value.eq_ignore_ascii_case("true") {
        Ok(true)
    } else if value.eq_ignore_ascii_case("false") {
        Ok(false)
    } else {
        Err(ArgumentError::InvalidBoolean { option: key.name(), value: value.to_string() })
    }
}

/// A parsed set of `-name value` pairs, possibly containing deletion
/// sentinels.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OptionSet {
    values: BTreeMap<OptionKey, String>,
}

impl OptionSet {
    /// Parse a token list. A repeated option keeps its last value.
    pub fn parse<I, S>(tokens: I) -> Result<Self, ArgumentError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut values = BTreeMap::new();
        let mut tokens = tokens.into_iter();

        while let Some(token) = tokens.next() {
            let name = token.as_ref();
            if !name.starts_with('-') || name == DELETION_SENTINEL {
                return Err(ArgumentError::UnexpectedToken(name.to_string()));
            }
            let key = OptionKey::from_name(name)
                .ok_or_else(|| ArgumentError::UnknownOption(name.to_string()))?;

            let value = tokens.next().ok_or(ArgumentError::MissingValue(key.name()))?;
            let value = value.as_ref();

            if value != DELETION_SENTINEL {
                if value.starts_with('-') {
                    return Err(ArgumentError::HyphenValue {
                        option: key.name(),
                        value: value.to_string(),
                    });
                }
                if key.is_boolean() {
                    parse_bool(key, value)?;
                }
            }

            values.insert(key, value.to_string());
        }

        Ok(Self { values })
    }

    /// Tokenize and parse one line of interactive input.
    pub fn from_line(line: &str) -> Result<Self, ArgumentError> {
        Self::parse(tokenize(line)?)
    }

    /// Set one option, replacing any previous value.
    #[must_use]
    pub fn with(mut self, key: OptionKey, value: impl Into<String>) -> Self {
        self.values.insert(key, value.into());
        self
    }

    /// Value for `key`, if present.
    pub fn get(&self, key: OptionKey) -> Option<&str> {
        self.values.get(&key).map(String::as_str)
    }

    /// Whether no options were given.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Iterate over options in display order.
    pub fn iter(&self) -> impl Iterator<Item = (OptionKey, &str)> {
        self.values.iter().map(|(k, v)| (*k, v.as_str()))
    }
}

/// Current option values for the session orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArgumentOverlay {
    values: BTreeMap<OptionKey, String>,
    interactive: bool,
}

impl ArgumentOverlay {
    /// Build the overlay from the initial command-line arguments.
    ///
    /// Interactive mode is decided here, from `-int`, and is fixed from then
    /// on.
    pub fn from_args<I, S>(args: I) -> Result<Self, ArgumentError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let initial = OptionSet::parse(args)?;
        let interactive = match initial.get(OptionKey::Interactive) {
            Some(value) if value != DELETION_SENTINEL => {
                parse_bool(OptionKey::Interactive, value)?
            },
            _ => false,
        };

        let mut overlay = Self { values: BTreeMap::new(), interactive };
        overlay.apply(initial)?;
        Ok(overlay)
    }

    /// Merge a partial option set over the current values.
    ///
    /// Last writer wins per key. The deletion sentinel removes the key in
    /// interactive mode and is an error otherwise.
    pub fn merge(&mut self, partial: OptionSet) -> Result<(), ArgumentError> {
        if let Some(value) = partial.get(OptionKey::Interactive) {
            if value == DELETION_SENTINEL
                || parse_bool(OptionKey::Interactive, value)? != self.interactive
            {
                return Err(ArgumentError::InteractiveFixed);
            }
        }
        self.apply(partial)
    }

    fn apply(&mut self, partial: OptionSet) -> Result<(), ArgumentError> {
        if !self.interactive {
            if let Some((key, _)) = partial.iter().find(|(_, v)| *v == DELETION_SENTINEL) {
                return Err(ArgumentError::SentinelNotAllowed(key.name()));
            }
        }

        for (key, value) in partial.values {
            if value == DELETION_SENTINEL {
                self.values.remove(&key);
            } else {
                self.values.insert(key, value);
            }
        }
        Ok(())
    }

    /// Value for `key`, if set.
    pub fn get(&self, key: OptionKey) -> Option<&str> {
        self.values.get(&key).map(String::as_str)
    }

    /// Boolean option value, falling back to the option's default.
    pub fn flag(&self, key: OptionKey) -> bool {
        self.get(key).map_or(key.default_flag(), |v| v.eq_ignore_ascii_case("true"))
    }

    /// Whether the orchestrator runs the interactive loop.
    pub fn is_interactive(&self) -> bool {
        self.interactive
    }

    /// Whether engine message tracing is on.
    pub fn is_verbose(&self) -> bool {
        self.flag(OptionKey::Verbose)
    }

    /// Number of options currently set.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether no options are set.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// The entity identity; required for every dispatch.
    pub fn entity_id(&self) -> Result<EntityIdentity, ArgumentError> {
        self.get(OptionKey::EntityId)
            .map(EntityIdentity::new)
            .ok_or(ArgumentError::Missing(OptionKey::EntityId.name()))
    }

    /// The remote endpoint; required for every dispatch.
    pub fn endpoint(&self) -> Result<Endpoint, ArgumentError> {
        self.get(OptionKey::Url).ok_or(ArgumentError::Missing(OptionKey::Url.name()))?.parse()
    }

    /// Entity authentication scheme.
    pub fn entity_auth(&self) -> &str {
        self.get(OptionKey::EntityAuth).unwrap_or(DEFAULT_ENTITY_AUTH)
    }

    /// Key-exchange scheme and mechanism, when a scheme is set.
    pub fn key_exchange(&self) -> Option<(&str, Option<&str>)> {
        self.get(OptionKey::KeyExchange)
            .map(|scheme| (scheme, self.get(OptionKey::KeyExchangeMechanism)))
    }

    /// Message options for the next dispatch.
    pub fn message_config(&self) -> MessageConfig {
        let user_id = self.get(OptionKey::UserId).map(str::to_string);
        let user_auth = user_id
            .as_ref()
            .map(|_| self.get(OptionKey::UserAuth).unwrap_or(DEFAULT_USER_AUTH).to_string());

        MessageConfig {
            user_id,
            user_auth,
            encrypted: self.flag(OptionKey::Encrypted),
            integrity_protected: self.flag(OptionKey::IntegrityProtected),
            non_replayable: self.flag(OptionKey::NonReplayable),
        }
    }
}

impl fmt::Display for ArgumentOverlay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (key, value) in &self.values {
            if !first {
                f.write_str(" ")?;
            }
            first = false;
            if value.is_empty() || value.contains(char::is_whitespace) {
                write!(f, "{key} \"{value}\"")?;
            } else {
                write!(f, "{key} {value}")?;
            }
        }
        Ok(())
    }
}
