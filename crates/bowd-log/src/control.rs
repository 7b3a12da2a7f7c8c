//! Bow driver state control.
//!
//! The block remapper exposes a per-device sysfs control file; writing a
//! single ASCII digit moves the driver through its state machine. The
//! control path is derived from the block device path by swapping the
//! device-filesystem root for the sysfs root:
//! `/dev/block/dm-4` -> `/sys/block/dm-4/bow/state`.

use std::path::{Path, PathBuf};

use bowd_error::{BowError, Result};
use tracing::{debug, error};

/// States of the bow driver's checkpoint machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BowState {
    /// Checkpoint window open; writes are being logged.
    Checkpoint,
    /// Free space trimmed, driver ready for the risky window.
    Prepared,
    /// Checkpoint committed; the log is abandoned.
    Committed,
}

impl BowState {
    /// ASCII form accepted by the control file.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Checkpoint => "0",
            Self::Prepared => "1",
            Self::Committed => "2",
        }
    }
}

/// Writes bow state transitions for block devices.
#[derive(Debug, Clone)]
pub struct BowController {
    dev_root: PathBuf,
    sys_root: PathBuf,
}

impl Default for BowController {
    fn default() -> Self {
        Self::new()
    }
}

impl BowController {
    /// Controller over the production roots `/dev` and `/sys`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            dev_root: PathBuf::from("/dev"),
            sys_root: PathBuf::from("/sys"),
        }
    }

    /// Controller over alternate roots. Tests point both at a temp dir.
    #[must_use]
    pub fn with_roots(dev_root: impl Into<PathBuf>, sys_root: impl Into<PathBuf>) -> Self {
        Self {
            dev_root: dev_root.into(),
            sys_root: sys_root.into(),
        }
    }

    /// Derive the sysfs control file for `block_device`.
    ///
    /// # Errors
    ///
    /// `NotABlockDevice` when the path does not live under the device root.
    pub fn control_path(&self, block_device: &Path) -> Result<PathBuf> {
        let tail = block_device
            .strip_prefix(&self.dev_root)
            .map_err(|_| BowError::NotABlockDevice {
                path: block_device.to_path_buf(),
            })?;
        Ok(self.sys_root.join(tail).join("bow").join("state"))
    }

    /// Move the device's bow driver to `state` by whole-file replace of its
    /// control file.
    pub fn set_state(&self, block_device: &Path, state: BowState) -> Result<()> {
        let control = self.control_path(block_device)?;
        std::fs::write(&control, state.as_str()).map_err(|e| {
            error!(path = %control.display(), "failed to write bow state");
            BowError::Io(e)
        })?;
        debug!(
            device = %block_device.display(),
            state = state.as_str(),
            "bow state set"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn state_strings() {
        assert_eq!(BowState::Checkpoint.as_str(), "0");
        assert_eq!(BowState::Prepared.as_str(), "1");
        assert_eq!(BowState::Committed.as_str(), "2");
    }

    #[test]
    fn control_path_derivation() {
        let ctl = BowController::new();
        let path = ctl
            .control_path(Path::new("/dev/block/dm-4"))
            .unwrap();
        assert_eq!(path, Path::new("/sys/block/dm-4/bow/state"));
    }

    #[test]
    fn rejects_non_device_path() {
        let ctl = BowController::new();
        let err = ctl
            .control_path(Path::new("/data/block/dm-4"))
            .unwrap_err();
        assert_eq!(err.kind(), bowd_error::ErrorKind::InvalidArgument);
    }

    #[test]
    fn set_state_writes_control_file() {
        let root = tempdir().unwrap();
        let dev_root = root.path().join("dev");
        let sys_root = root.path().join("sys");
        std::fs::create_dir_all(sys_root.join("block/dm-4/bow")).unwrap();

        let ctl = BowController::with_roots(&dev_root, &sys_root);
        let device = dev_root.join("block/dm-4");
        ctl.set_state(&device, BowState::Prepared).unwrap();
        assert_eq!(
            std::fs::read_to_string(sys_root.join("block/dm-4/bow/state")).unwrap(),
            "1"
        );

        ctl.set_state(&device, BowState::Committed).unwrap();
        assert_eq!(
            std::fs::read_to_string(sys_root.join("block/dm-4/bow/state")).unwrap(),
            "2"
        );
    }

    #[test]
    fn set_state_surfaces_write_failure() {
        let root = tempdir().unwrap();
        let dev_root = root.path().join("dev");
        let sys_root = root.path().join("sys");
        // No bow/ directory created: the write must fail.
        let ctl = BowController::with_roots(&dev_root, &sys_root);
        let err = ctl
            .set_state(&dev_root.join("block/dm-9"), BowState::Prepared)
            .unwrap_err();
        assert_eq!(err.kind(), bowd_error::ErrorKind::IoFailed);
    }
}
