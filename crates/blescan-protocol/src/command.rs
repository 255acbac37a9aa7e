//! Command table and request parsing.
//!
//! Command names map to [`CommandKind`] through an explicit table, and
//! [`Command::parse`] turns a request line into a typed command with its
//! arguments converted and defaulted.

use blescan_core::radio::{DEFAULT_SCAN_DURATION_MS, DEFAULT_WINDOW_FRACTION};
use thiserror::Error;

/// Default scan duration, in seconds, when `scan` has no argument.
pub const DEFAULT_SCAN_SECONDS: u32 = DEFAULT_SCAN_DURATION_MS / 1000;

/// Errors produced while parsing a request line.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CommandError {
    /// The first token names no known command.
    #[error("Command not found: \"{0}\"")]
    NotFound(String),

    #[error("{command}: missing argument <{argument}>")]
    MissingArgument {
        command: &'static str,
        argument: &'static str,
    },

    #[error("{command}: too many arguments (at most {max})")]
    TooManyArguments { command: &'static str, max: usize },

    #[error("{command}: invalid {argument} {value:?}")]
    InvalidArgument {
        command: &'static str,
        argument: &'static str,
        value: String,
    },

    /// Two table entries share a name.
    #[error("Duplicate command name: {0}")]
    DuplicateName(&'static str),
}

/// Every command the controller understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    Scan,
    Simulate,
    Stop,
    Status,
    Store,
}

impl CommandKind {
    pub const ALL: [CommandKind; 5] = [
        CommandKind::Scan,
        CommandKind::Simulate,
        CommandKind::Stop,
        CommandKind::Status,
        CommandKind::Store,
    ];

    /// Name used on the wire.
    pub fn name(&self) -> &'static str {
        match self {
            CommandKind::Scan => "scan",
            CommandKind::Simulate => "simulate",
            CommandKind::Stop => "stop",
            CommandKind::Status => "status",
            CommandKind::Store => "store",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }

    /// Positional arguments accepted.
    pub fn max_args(&self) -> usize {
        match self {
            CommandKind::Scan => 2,
            CommandKind::Simulate | CommandKind::Store => 1,
            CommandKind::Stop | CommandKind::Status => 0,
        }
    }
}

/// Check the command table: names are non-empty, contain no spaces and
/// are unique.
pub fn validate_command_table() -> Result<(), CommandError> {
    for (i, kind) in CommandKind::ALL.iter().enumerate() {
        let name = kind.name();
        if name.is_empty() || name.contains(' ') {
            return Err(CommandError::InvalidArgument {
                command: name,
                argument: "name",
                value: name.to_string(),
            });
        }
        if CommandKind::ALL[..i].iter().any(|other| other.name() == name) {
            return Err(CommandError::DuplicateName(name));
        }
    }
    Ok(())
}

/// A parsed request.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Scan for `duration_s` seconds (zero scans until stopped).
    Scan { duration_s: u32, window_fraction: f32 },
    /// Advertise a hex encoded payload.
    Simulate { payload: String },
    Stop,
    Status,
    /// Read the stored-device list (`None`) or replace it with a
    /// base64(JSON) blob.
    Store { blob: Option<String> },
}

impl Command {
    pub fn kind(&self) -> CommandKind {
        match self {
            Command::Scan { .. } => CommandKind::Scan,
            Command::Simulate { .. } => CommandKind::Simulate,
            Command::Stop => CommandKind::Stop,
            Command::Status => CommandKind::Status,
            Command::Store { .. } => CommandKind::Store,
        }
    }

    /// Parse one request line (without its terminator).
    pub fn parse(line: &str) -> Result<Self, CommandError> {
        let mut tokens = line.split(' ').filter(|token| !token.is_empty());
        let name = tokens.next().unwrap_or("");
        let kind =
            CommandKind::from_name(name).ok_or_else(|| CommandError::NotFound(name.to_string()))?;
        let args: Vec<&str> = tokens.collect();
        if args.len() > kind.max_args() {
            return Err(CommandError::TooManyArguments {
                command: kind.name(),
                max: kind.max_args(),
            });
        }

        let command = match kind {
            CommandKind::Scan => Command::Scan {
                duration_s: parse_arg(kind, "duration", args.first())?
                    .unwrap_or(DEFAULT_SCAN_SECONDS),
                window_fraction: parse_arg(kind, "window_fraction", args.get(1))?
                    .unwrap_or(DEFAULT_WINDOW_FRACTION),
            },
            CommandKind::Simulate => Command::Simulate {
                payload: args
                    .first()
                    .ok_or(CommandError::MissingArgument {
                        command: kind.name(),
                        argument: "payload",
                    })?
                    .to_string(),
            },
            CommandKind::Stop => Command::Stop,
            CommandKind::Status => Command::Status,
            CommandKind::Store => Command::Store {
                blob: args.first().map(|blob| blob.to_string()),
            },
        };
        Ok(command)
    }
}

fn parse_arg<T: std::str::FromStr>(
    kind: CommandKind,
    argument: &'static str,
    value: Option<&&str>,
) -> Result<Option<T>, CommandError> {
    value
        .map(|value| {
            value.parse().map_err(|_| CommandError::InvalidArgument {
                command: kind.name(),
                argument,
                value: value.to_string(),
            })
        })
        .transpose()
}
