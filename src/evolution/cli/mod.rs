//! Operator CLI.
//!
//! Inspects and manages stored evolution state from the command line:
//! history, knowledge, snapshots, offline learning passes, rule
//! application and rollback.

mod commands;
mod errors;
mod help;
mod output_types;
mod runner;


pub use commands::{EvolutionCommands, DEFAULT_HISTORY_LIMIT};
pub use errors::CommandParseError;
pub use help::help_text;
pub use output_types::{
    CommandOutput, HistoryOutput, LearnOutput, PracticesOutput, RollbackOutput, RulesOutput,
    SnapshotsOutput,
};
pub use runner::CommandRunner;
