//! Externally imposed paths and names.
//!
//! Everything the checkpoint core touches outside its own crate boundary
//! is collected here so tests can point the whole subsystem at a temp
//! directory. The defaults are the production layout.

use std::path::PathBuf;

/// Paths and names the checkpoint subsystem operates against.
#[derive(Debug, Clone)]
pub struct CheckpointConfig {
    /// Persistent checkpoint metadata file. Its presence means a
    /// checkpoint is in progress.
    pub metadata_file: PathBuf,
    /// Static fstab-like descriptor naming checkpoint participants.
    pub fstab_path: PathBuf,
    /// Kernel-provided mount table.
    pub proc_mounts: PathBuf,
    /// Device filesystem root; block device paths must live under it.
    pub dev_root: PathBuf,
    /// Sysfs root the bow control files hang off.
    pub sys_root: PathBuf,
    /// Daemon name used to derive property keys.
    pub daemon_name: String,
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            metadata_file: PathBuf::from("/metadata/bowd/checkpoint"),
            fstab_path: PathBuf::from("/etc/fstab.bowd"),
            proc_mounts: PathBuf::from("/proc/mounts"),
            dev_root: PathBuf::from("/dev"),
            sys_root: PathBuf::from("/sys"),
            daemon_name: "bowd".to_owned(),
        }
    }
}

impl CheckpointConfig {
    /// Property key flipped to `"1"` once a checkpoint commits.
    #[must_use]
    pub fn committed_property(&self) -> String {
        format!("{}.checkpoint_committed", self.daemon_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_paths() {
        let config = CheckpointConfig::default();
        assert_eq!(
            config.metadata_file,
            PathBuf::from("/metadata/bowd/checkpoint")
        );
        assert_eq!(config.committed_property(), "bowd.checkpoint_committed");
    }

    #[test]
    fn property_follows_daemon_name() {
        let config = CheckpointConfig {
            daemon_name: "storaged".to_owned(),
            ..CheckpointConfig::default()
        };
        assert_eq!(config.committed_property(), "storaged.checkpoint_committed");
    }
}
