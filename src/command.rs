//! Chat command recognition.
//!
//! The rest command is matched against an explicit list of accepted
//! spellings. New typos are added to [`REST_SPELLINGS`] on purpose; there is
//! no edit-distance fallback. Every other command is a known first token
//! followed by positional arguments.

/// Accepted spellings of the rest command, compared against the whole
/// trimmed, lower-cased message.
pub const REST_SPELLINGS: &[&str] = &[
    "sleep", "slep", "sllep", "slepp", "slp", "sleap", "sleeep", "sleeeep",
];

pub const HELP_TEXT: &str = "Commands: sleep | collect <count> <item> | help";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    Rest,
    Collect,
    Help,
}

impl CommandKind {
    pub fn name(self) -> &'static str {
        match self {
            CommandKind::Rest => "sleep",
            CommandKind::Collect => "collect",
            CommandKind::Help => "help",
        }
    }

    fn from_token(token: &str) -> Option<Self> {
        match token {
            "collect" | "get" | "gather" => Some(CommandKind::Collect),
            "help" => Some(CommandKind::Help),
            _ => None,
        }
    }
}

impl std::fmt::Display for CommandKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCommand {
    pub command: CommandKind,
    pub args: Vec<String>,
}

impl ParsedCommand {
    pub fn new(command: CommandKind, args: &[&str]) -> Self {
        Self {
            command,
            args: args.iter().map(|a| a.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recognition {
    NoMatch,
    Match(ParsedCommand),
}

pub fn is_rest_command(text: &str) -> bool {
    let normalized = text.trim().to_lowercase();
    REST_SPELLINGS.contains(&normalized.as_str())
}

/// Recognize a chat line.
pub fn recognize(text: &str) -> Recognition {
    if is_rest_command(text) {
        return Recognition::Match(ParsedCommand::new(CommandKind::Rest, &[]));
    }

    let mut tokens = text.split_whitespace();
    let Some(first) = tokens.next() else {
        return Recognition::NoMatch;
    };

    match CommandKind::from_token(&first.to_lowercase()) {
        Some(command) => Recognition::Match(ParsedCommand {
            command,
            args: tokens.map(str::to_string).collect(),
        }),
        None => Recognition::NoMatch,
    }
}
