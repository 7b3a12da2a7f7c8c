//! Static fstab descriptor: which mounts participate in checkpoints.
//!
//! The descriptor is a five-column, whitespace-separated file:
//! ```text
//! <device> <mount_point> <fstype> <mount_options> <manager_flags>
//! ```
//! Mount options split into kernel mount flags (collected into
//! [`MountFlags`], needed to preserve them across the commit remount) and
//! free-form data passed through to the filesystem. Manager flags carry
//! the checkpoint capability: `checkpoint=block` or `checkpoint=fs`,
//! mutually exclusive per entry.

use std::path::{Path, PathBuf};

use bowd_error::{BowError, Result};

bitflags::bitflags! {
    /// Kernel mount flags preserved across a checkpoint-commit remount.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct MountFlags: u64 {
        const RDONLY = libc::MS_RDONLY as u64;
        const NOSUID = libc::MS_NOSUID as u64;
        const NODEV = libc::MS_NODEV as u64;
        const NOEXEC = libc::MS_NOEXEC as u64;
        const SYNCHRONOUS = libc::MS_SYNCHRONOUS as u64;
        const DIRSYNC = libc::MS_DIRSYNC as u64;
        const NOATIME = libc::MS_NOATIME as u64;
        const NODIRATIME = libc::MS_NODIRATIME as u64;
        const RELATIME = libc::MS_RELATIME as u64;
        const LAZYTIME = libc::MS_LAZYTIME as u64;
    }
}

fn flag_for_option(option: &str) -> Option<MountFlags> {
    match option {
        "ro" => Some(MountFlags::RDONLY),
        "rw" | "defaults" => Some(MountFlags::empty()),
        "nosuid" => Some(MountFlags::NOSUID),
        "nodev" => Some(MountFlags::NODEV),
        "noexec" => Some(MountFlags::NOEXEC),
        "sync" => Some(MountFlags::SYNCHRONOUS),
        "dirsync" => Some(MountFlags::DIRSYNC),
        "noatime" => Some(MountFlags::NOATIME),
        "nodiratime" => Some(MountFlags::NODIRATIME),
        "relatime" => Some(MountFlags::RELATIME),
        "lazytime" => Some(MountFlags::LAZYTIME),
        _ => None,
    }
}

/// One fstab row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FstabEntry {
    /// Backing block device.
    pub blk_device: PathBuf,
    /// Where the filesystem mounts.
    pub mount_point: PathBuf,
    /// Filesystem type, e.g. `f2fs` or `ext4`.
    pub fs_type: String,
    /// Kernel mount flags from the options column.
    pub flags: MountFlags,
    /// Options that are filesystem data rather than kernel flags.
    pub fs_options: String,
    /// Entry participates via the bow block remapper.
    pub checkpoint_blk: bool,
    /// Entry participates via filesystem-native checkpoint holdback.
    pub checkpoint_fs: bool,
}

impl FstabEntry {
    /// True when this entry participates in checkpoints at all.
    #[must_use]
    pub fn is_checkpoint_participant(&self) -> bool {
        self.checkpoint_blk || self.checkpoint_fs
    }
}

fn parse_line(line: &str, line_no: usize) -> Result<FstabEntry> {
    let columns: Vec<&str> = line.split_whitespace().collect();
    if columns.len() != 5 {
        return Err(BowError::invalid_argument(format!(
            "fstab line {line_no}: expected 5 columns, got {}",
            columns.len()
        )));
    }

    let mut flags = MountFlags::empty();
    let mut fs_options = Vec::new();
    for option in columns[3].split(',') {
        match flag_for_option(option) {
            Some(flag) => flags |= flag,
            None => fs_options.push(option),
        }
    }

    let mut checkpoint_blk = false;
    let mut checkpoint_fs = false;
    for flag in columns[4].split(',') {
        match flag {
            "checkpoint=block" => checkpoint_blk = true,
            "checkpoint=fs" => checkpoint_fs = true,
            // Other manager flags are not this subsystem's concern.
            _ => {}
        }
    }
    if checkpoint_blk && checkpoint_fs {
        return Err(BowError::invalid_argument(format!(
            "fstab line {line_no}: checkpoint=block and checkpoint=fs are mutually exclusive"
        )));
    }

    Ok(FstabEntry {
        blk_device: PathBuf::from(columns[0]),
        mount_point: PathBuf::from(columns[1]),
        fs_type: columns[2].to_owned(),
        flags,
        fs_options: fs_options.join(","),
        checkpoint_blk,
        checkpoint_fs,
    })
}

/// Load and parse an fstab descriptor.
///
/// Blank lines and `#` comments are skipped.
pub fn load_fstab(path: &Path) -> Result<Vec<FstabEntry>> {
    let text = std::fs::read_to_string(path).map_err(BowError::Io)?;
    let mut entries = Vec::new();
    for (index, line) in text.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        entries.push(parse_line(trimmed, index + 1)?);
    }
    Ok(entries)
}

/// Find the fstab entry for a mount point.
#[must_use]
pub fn entry_for_mount_point<'a>(
    fstab: &'a [FstabEntry],
    mount_point: &Path,
) -> Option<&'a FstabEntry> {
    fstab.iter().find(|e| e.mount_point == mount_point)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn parse_one(line: &str) -> FstabEntry {
        parse_line(line, 1).unwrap()
    }

    #[test]
    fn parses_block_checkpoint_entry() {
        let entry =
            parse_one("/dev/block/dm-4 /data f2fs noatime,nosuid,nodev,discard checkpoint=block");
        assert_eq!(entry.blk_device, PathBuf::from("/dev/block/dm-4"));
        assert_eq!(entry.mount_point, PathBuf::from("/data"));
        assert_eq!(entry.fs_type, "f2fs");
        assert_eq!(
            entry.flags,
            MountFlags::NOATIME | MountFlags::NOSUID | MountFlags::NODEV
        );
        assert_eq!(entry.fs_options, "discard");
        assert!(entry.checkpoint_blk);
        assert!(!entry.checkpoint_fs);
    }

    #[test]
    fn parses_fs_checkpoint_entry() {
        let entry = parse_one("/dev/block/dm-5 /data f2fs defaults checkpoint=fs,fileencryption");
        assert!(entry.checkpoint_fs);
        assert!(!entry.checkpoint_blk);
        assert_eq!(entry.flags, MountFlags::empty());
        assert_eq!(entry.fs_options, "");
    }

    #[test]
    fn plain_entry_does_not_participate() {
        let entry = parse_one("/dev/block/sda1 /system ext4 ro wait");
        assert!(!entry.is_checkpoint_participant());
        assert_eq!(entry.flags, MountFlags::RDONLY);
    }

    #[test]
    fn rejects_both_checkpoint_modes() {
        let err = parse_line(
            "/dev/block/dm-4 /data f2fs defaults checkpoint=block,checkpoint=fs",
            7,
        )
        .unwrap_err();
        assert_eq!(err.kind(), bowd_error::ErrorKind::InvalidArgument);
        assert!(err.to_string().contains("line 7"));
    }

    #[test]
    fn rejects_short_line() {
        let err = parse_line("/dev/block/dm-4 /data f2fs", 3).unwrap_err();
        assert_eq!(err.kind(), bowd_error::ErrorKind::InvalidArgument);
    }

    #[test]
    fn load_skips_comments_and_blanks() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("fstab");
        std::fs::write(
            &path,
            "# checkpoint participants\n\n/dev/block/dm-4 /data f2fs noatime checkpoint=block\n/dev/block/sda1 /system ext4 ro wait\n",
        )
        .unwrap();

        let entries = load_fstab(&path).unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries[0].checkpoint_blk);
        assert!(!entries[1].is_checkpoint_participant());
    }

    #[test]
    fn lookup_by_mount_point() {
        let entries = vec![
            parse_one("/dev/block/dm-4 /data f2fs defaults checkpoint=block"),
            parse_one("/dev/block/sda1 /system ext4 ro wait"),
        ];
        assert!(entry_for_mount_point(&entries, Path::new("/data")).is_some());
        assert!(entry_for_mount_point(&entries, Path::new("/cache")).is_none());
    }
}
