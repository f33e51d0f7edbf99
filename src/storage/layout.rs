//! Per-skill on-disk layout.
//!
//! ```text
//! <dataDir>/
//!   <skill>/
//!     execution_history.jsonl
//!     best_practices.json
//!     optimization_rules.json
//!     analysis_state.json
//!     snapshots/
//!       <skill>_<version>.<ext>
//! ```

use std::path::{Path, PathBuf};

use crate::error::StorageError;

/// Execution history file name.
pub const HISTORY_FILE: &str = "execution_history.jsonl";

/// Best-practices document name.
pub const PRACTICES_FILE: &str = "best_practices.json";

/// Optimization-rules document name.
pub const RULES_FILE: &str = "optimization_rules.json";

/// Analysis state document name.
pub const STATE_FILE: &str = "analysis_state.json";

/// Snapshot directory name.
pub const SNAPSHOTS_DIR: &str = "snapshots";

/// Check that a skill name can be used as a directory name.
///
/// # Errors
///
/// Returns [`StorageError::InvalidSkillName`] for empty names, names with
/// path separators, `..`, or control characters.
pub fn validate_skill_name(name: &str) -> Result<(), StorageError> {
    let reason = if name.trim().is_empty() {
        Some("must not be empty")
    } else if name.contains('/') || name.contains('\\') {
        Some("must not contain path separators")
    } else if name == "." || name.contains("..") {
        Some("must not contain '..'")
    } else if name.chars().any(char::is_control) {
        Some("must not contain control characters")
    } else {
        None
    };

    reason.map_or(Ok(()), |reason| {
        Err(StorageError::InvalidSkillName {
            name: name.to_string(),
            reason: reason.to_string(),
        })
    })
}

/// Resolved paths for one skill.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkillPaths {
    skill_name: String,
    root: PathBuf,
}

impl SkillPaths {
    /// Resolve the layout for a skill under a data directory.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::InvalidSkillName`] if the name is unusable.
    pub fn new(data_dir: impl AsRef<Path>, skill_name: &str) -> Result<Self, StorageError> {
        validate_skill_name(skill_name)?;
        Ok(Self {
            skill_name: skill_name.to_string(),
            root: data_dir.as_ref().join(skill_name),
        })
    }

    /// Skill name.
    #[must_use]
    pub fn skill_name(&self) -> &str {
        &self.skill_name
    }

    /// Skill directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Execution history log.
    #[must_use]
    pub fn history(&self) -> PathBuf {
        self.root.join(HISTORY_FILE)
    }

    /// Best-practices document.
    #[must_use]
    pub fn practices(&self) -> PathBuf {
        self.root.join(PRACTICES_FILE)
    }

    /// Optimization-rules document.
    #[must_use]
    pub fn rules(&self) -> PathBuf {
        self.root.join(RULES_FILE)
    }

    /// Analysis state document.
    #[must_use]
    pub fn state(&self) -> PathBuf {
        self.root.join(STATE_FILE)
    }

    /// Snapshot directory.
    #[must_use]
    pub fn snapshots_dir(&self) -> PathBuf {
        self.root.join(SNAPSHOTS_DIR)
    }

    /// Snapshot file for a version.
    #[must_use]
    pub fn snapshot(&self, version: &str, extension: &str) -> PathBuf {
        self.snapshots_dir()
            .join(format!("{}_{version}.{extension}", self.skill_name))
    }

    /// Extract the version from a snapshot file name, if it belongs to this skill.
    #[must_use]
    pub fn snapshot_version<'a>(&self, file_name: &'a str) -> Option<&'a str> {
        let rest = file_name
            .strip_prefix(self.skill_name.as_str())?
            .strip_prefix('_')?;
        let (version, _ext) = rest.rsplit_once('.')?;
        (!version.is_empty()).then_some(version)
    }
}
