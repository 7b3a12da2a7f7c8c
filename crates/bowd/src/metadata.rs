//! Persistent checkpoint metadata.
//!
//! A checkpoint in progress is exactly the presence of one small ASCII
//! file. Its contents are either a non-negative retry budget `"<n>"`, or
//! `"-1 <suffix>"` arming an unconditional rollback scoped to the A/B
//! slot that was current when the checkpoint was requested.

use std::path::{Path, PathBuf};

use bowd_error::{BowError, Result};
use tracing::debug;

/// Parsed contents of the metadata file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckpointState {
    /// `"<n>"`: n boot attempts remain before rollback.
    Armed(u32),
    /// `"-1 <suffix>"`: roll back on next boot if the slot suffix still
    /// matches.
    RollbackArmed(String),
}

impl CheckpointState {
    /// Serialize to the on-disk ASCII form. No trailing newline.
    #[must_use]
    pub fn to_content(&self) -> String {
        match self {
            Self::Armed(n) => n.to_string(),
            Self::RollbackArmed(suffix) => format!("-1 {suffix}"),
        }
    }

    /// Parse on-disk contents.
    ///
    /// # Errors
    ///
    /// `MetadataCorrupt` when the content is neither a non-negative
    /// integer nor a `-1 <suffix>` pair.
    pub fn parse(content: &str) -> Result<Self> {
        if let Some(suffix) = content.strip_prefix("-1 ") {
            return Ok(Self::RollbackArmed(suffix.to_owned()));
        }
        content
            .parse::<u32>()
            .map(Self::Armed)
            .map_err(|_| BowError::MetadataCorrupt {
                detail: format!("unrecognized checkpoint state '{content}'"),
            })
    }
}

/// Handle on the metadata file at a fixed path.
#[derive(Debug, Clone)]
pub struct MetadataFile {
    path: PathBuf,
}

impl MetadataFile {
    /// Handle for `path`; nothing is touched until an operation runs.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The path this handle operates on.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Raw contents, or `None` when no checkpoint is in progress.
    ///
    /// # Errors
    ///
    /// Read failures other than the file being absent.
    pub fn read(&self) -> Result<Option<String>> {
        match std::fs::read_to_string(&self.path) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(BowError::Io(e)),
        }
    }

    /// Write `state`, creating the parent directory if needed.
    pub fn write(&self, state: &CheckpointState) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(BowError::Io)?;
        }
        let content = state.to_content();
        std::fs::write(&self.path, &content).map_err(BowError::Io)?;
        debug!(path = %self.path.display(), content = %content, "checkpoint metadata written");
        Ok(())
    }

    /// Delete the file. Absence is not an error.
    pub fn remove(&self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {
                debug!(path = %self.path.display(), "checkpoint metadata removed");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(BowError::Io(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn state_serialization() {
        assert_eq!(CheckpointState::Armed(0).to_content(), "0");
        assert_eq!(CheckpointState::Armed(4).to_content(), "4");
        assert_eq!(
            CheckpointState::RollbackArmed("_a".to_owned()).to_content(),
            "-1 _a"
        );
    }

    #[test]
    fn state_parse_roundtrip() {
        for state in [
            CheckpointState::Armed(0),
            CheckpointState::Armed(17),
            CheckpointState::RollbackArmed("_b".to_owned()),
        ] {
            assert_eq!(CheckpointState::parse(&state.to_content()).unwrap(), state);
        }
    }

    #[test]
    fn state_parse_rejects_garbage() {
        for content in ["", "abc", "-2", "- 1", "1.5"] {
            let err = CheckpointState::parse(content).unwrap_err();
            assert_eq!(err.kind(), bowd_error::ErrorKind::InvalidArgument);
        }
    }

    #[test]
    fn absent_file_reads_none() {
        let dir = tempdir().unwrap();
        let file = MetadataFile::new(dir.path().join("checkpoint"));
        assert_eq!(file.read().unwrap(), None);
        // Removing an absent file is fine.
        file.remove().unwrap();
    }

    #[test]
    fn write_read_remove() {
        let dir = tempdir().unwrap();
        let file = MetadataFile::new(dir.path().join("nested/dir/checkpoint"));

        file.write(&CheckpointState::Armed(4)).unwrap();
        assert_eq!(file.read().unwrap().as_deref(), Some("4"));

        file.write(&CheckpointState::RollbackArmed("_a".to_owned()))
            .unwrap();
        assert_eq!(file.read().unwrap().as_deref(), Some("-1 _a"));

        file.remove().unwrap();
        assert_eq!(file.read().unwrap(), None);
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn armed_roundtrips(n in any::<u32>()) {
                let state = CheckpointState::Armed(n);
                prop_assert_eq!(
                    CheckpointState::parse(&state.to_content()).unwrap(),
                    state
                );
            }

            #[test]
            fn rollback_roundtrips(suffix in "[a-z_]{1,8}") {
                let state = CheckpointState::RollbackArmed(suffix);
                prop_assert_eq!(
                    CheckpointState::parse(&state.to_content()).unwrap(),
                    state
                );
            }
        }
    }
}
