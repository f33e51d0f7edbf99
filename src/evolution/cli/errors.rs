//! CLI command parsing errors.

/// Error parsing CLI commands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandParseError {
    /// No command provided.
    MissingCommand,
    /// Unknown command.
    UnknownCommand(String),
    /// Unknown flag.
    UnknownFlag(String),
    /// Missing positional argument or flag value.
    MissingValue(String),
    /// Invalid value for flag.
    InvalidValue {
        /// The flag with the invalid value.
        flag: String,
        /// The invalid value that was provided.
        value: String,
    },
    /// More positional arguments than the command takes.
    UnexpectedArgument(String),
}

impl std::fmt::Display for CommandParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingCommand => {
                write!(f, "No command provided. Use 'help' for available commands.")
            }
            Self::UnknownCommand(cmd) => write!(
                f,
                "Unknown command: '{cmd}'. Use 'help' for available commands."
            ),
            Self::UnknownFlag(flag) => write!(f, "Unknown flag: '{flag}'"),
            Self::MissingValue(name) => write!(f, "Missing value for '{name}'"),
            Self::InvalidValue { flag, value } => write!(f, "Invalid value '{value}' for '{flag}'"),
            Self::UnexpectedArgument(arg) => write!(f, "Unexpected argument: '{arg}'"),
        }
    }
}

impl std::error::Error for CommandParseError {}
