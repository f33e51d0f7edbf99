//! Storage backend.
//!
//! This module provides the file primitives the evolution stores build on:
//! - `layout`: Per-skill directory layout and skill-name validation
//! - `files`: Atomic document replacement, durable line appends, JSON helpers
//! - `locks`: One async mutex per skill name
//!
//! # Architecture
//!
//! All state lives under a single data directory, partitioned by skill name.
//! Documents are replaced with temp-file + rename so a crash never leaves a
//! half-written document behind; the execution history is an append-only
//! JSON-lines log.

mod files;
mod layout;
mod locks;

pub use files::{
    append_line, complete_lines, encode_json, read_json_or_default, read_optional, write_atomic,
    write_atomic_all,
};
pub use layout::{
    validate_skill_name, SkillPaths, HISTORY_FILE, PRACTICES_FILE, RULES_FILE, SNAPSHOTS_DIR,
    STATE_FILE,
};
pub use locks::KeyedLocks;
