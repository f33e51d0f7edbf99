//! CLI command definitions and parsing.

use std::path::PathBuf;

use super::errors::CommandParseError;

/// Default record count for `history`.
pub const DEFAULT_HISTORY_LIMIT: usize = 20;

/// Operator commands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EvolutionCommands {
    /// Show evolution status.
    Status {
        /// Skill name.
        skill: String,
    },

    /// Show recent execution records.
    History {
        /// Skill name.
        skill: String,
        /// Maximum number of records to show.
        limit: usize,
    },

    /// Show merged best practices.
    Practices {
        /// Skill name.
        skill: String,
    },

    /// Show merged optimization rules.
    Rules {
        /// Skill name.
        skill: String,
    },

    /// List configuration snapshots.
    Snapshots {
        /// Skill name.
        skill: String,
    },

    /// Run a learning pass over stored history.
    Learn {
        /// Skill name.
        skill: String,
    },

    /// Apply stored rules to a configuration file.
    Apply {
        /// Skill name.
        skill: String,
        /// Configuration document to mutate.
        config_path: PathBuf,
        /// Write rules instead of listing them for review.
        auto: bool,
    },

    /// Restore a configuration snapshot.
    Rollback {
        /// Skill name.
        skill: String,
        /// Configuration document to restore.
        config_path: PathBuf,
        /// Snapshot version.
        version: String,
    },

    /// Show help.
    Help,
}

impl EvolutionCommands {
    /// Parse a command from string arguments (program name excluded).
    ///
    /// # Errors
    ///
    /// Returns [`CommandParseError`] for unknown commands or flags and
    /// missing or malformed arguments.
    pub fn parse(args: &[String]) -> Result<Self, CommandParseError> {
        let Some(first) = args.first() else {
            return Err(CommandParseError::MissingCommand);
        };

        let cmd = first.to_lowercase();
        let rest = &args[1..];
        match cmd.as_str() {
            "status" => Ok(Self::Status {
                skill: single_skill(rest)?,
            }),

            "history" => {
                let mut limit = DEFAULT_HISTORY_LIMIT;
                let mut positional = Vec::new();

                let mut i = 0;
                while i < rest.len() {
                    match rest[i].as_str() {
                        "--limit" | "-l" => {
                            i += 1;
                            let Some(value) = rest.get(i) else {
                                return Err(CommandParseError::MissingValue("--limit".into()));
                            };
                            limit = value
                                .parse()
                                .map_err(|_| CommandParseError::InvalidValue {
                                    flag: "--limit".into(),
                                    value: value.clone(),
                                })?;
                        }
                        flag if flag.starts_with('-') => {
                            return Err(CommandParseError::UnknownFlag(flag.to_string()));
                        }
                        _ => positional.push(rest[i].clone()),
                    }
                    i += 1;
                }

                Ok(Self::History {
                    skill: single_skill(&positional)?,
                    limit,
                })
            }

            "practices" => Ok(Self::Practices {
                skill: single_skill(rest)?,
            }),

            "rules" => Ok(Self::Rules {
                skill: single_skill(rest)?,
            }),

            "snapshots" => Ok(Self::Snapshots {
                skill: single_skill(rest)?,
            }),

            "learn" => Ok(Self::Learn {
                skill: single_skill(rest)?,
            }),

            "apply" => {
                let mut auto = false;
                let mut positional = Vec::new();
                for arg in rest {
                    match arg.as_str() {
                        "--auto" | "-a" => auto = true,
                        flag if flag.starts_with('-') => {
                            return Err(CommandParseError::UnknownFlag(flag.to_string()));
                        }
                        _ => positional.push(arg.clone()),
                    }
                }
                let [skill, config_path] = positionals(positional, ["skill", "config_path"])?;
                Ok(Self::Apply {
                    skill,
                    config_path: PathBuf::from(config_path),
                    auto,
                })
            }

            "rollback" => {
                let [skill, config_path, version] =
                    positionals(rest.to_vec(), ["skill", "config_path", "version"])?;
                Ok(Self::Rollback {
                    skill,
                    config_path: PathBuf::from(config_path),
                    version,
                })
            }

            "help" | "--help" | "-h" => Ok(Self::Help),

            _ => Err(CommandParseError::UnknownCommand(cmd)),
        }
    }

    /// Skill the command targets, if any.
    #[must_use]
    pub fn skill(&self) -> Option<&str> {
        match self {
            Self::Status { skill }
            | Self::History { skill, .. }
            | Self::Practices { skill }
            | Self::Rules { skill }
            | Self::Snapshots { skill }
            | Self::Learn { skill }
            | Self::Apply { skill, .. }
            | Self::Rollback { skill, .. } => Some(skill),
            Self::Help => None,
        }
    }
}

fn single_skill(args: &[String]) -> Result<String, CommandParseError> {
    let [skill] = positionals(args.to_vec(), ["skill"])?;
    Ok(skill)
}

/// Exactly `N` positional arguments, named for error messages.
fn positionals<const N: usize>(
    args: Vec<String>,
    names: [&str; N],
) -> Result<[String; N], CommandParseError> {
    if let Some(missing) = names.get(args.len()) {
        return Err(CommandParseError::MissingValue((*missing).to_string()));
    }
    if let Some(extra) = args.get(N) {
        return Err(CommandParseError::UnexpectedArgument(extra.clone()));
    }
    args.try_into()
        .map_err(|_| CommandParseError::MissingValue(names.join(" ")))
}
