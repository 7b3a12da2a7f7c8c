//! Live mount inventory.
//!
//! Parses the kernel-provided mount table and joins it against the static
//! fstab descriptor to find the mounts that participate in checkpoints.
//! The kernel escapes whitespace in paths octally (`\040` for space), so
//! the inventory decodes those before comparing mount points.

use std::path::{Path, PathBuf};

use bowd_error::{BowError, Result};
use tracing::debug;

use crate::fstab::{entry_for_mount_point, FstabEntry};

/// One row of the live mount table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountedFilesystem {
    /// Device the filesystem is mounted from.
    pub blk_device: PathBuf,
    /// Mount point, octal escapes decoded.
    pub mount_point: PathBuf,
    /// Filesystem type as reported by the kernel.
    pub fs_type: String,
    /// Current mount options, comma separated.
    pub fs_options: String,
}

/// Decode the mount-table octal escapes (`\040` space, `\011` tab,
/// `\012` newline, `\134` backslash).
fn unescape(field: &str) -> String {
    let mut out = String::with_capacity(field.len());
    let mut chars = field.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        let digits: String = chars.clone().take(3).collect();
        if digits.len() == 3 {
            if let Ok(code) = u8::from_str_radix(&digits, 8) {
                out.push(code as char);
                chars.nth(2);
                continue;
            }
        }
        out.push(c);
    }
    out
}

/// Parse mount-table text. Rows that do not carry at least the four
/// standard fields are skipped.
#[must_use]
pub fn parse_mount_table(text: &str) -> Vec<MountedFilesystem> {
    let mut mounts = Vec::new();
    for line in text.lines() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 4 {
            continue;
        }
        mounts.push(MountedFilesystem {
            blk_device: PathBuf::from(unescape(fields[0])),
            mount_point: PathBuf::from(unescape(fields[1])),
            fs_type: fields[2].to_owned(),
            fs_options: fields[3].to_owned(),
        });
    }
    mounts
}

/// Read the mount table at `proc_mounts`.
pub fn read_mount_table(proc_mounts: &Path) -> Result<Vec<MountedFilesystem>> {
    let text = std::fs::read_to_string(proc_mounts).map_err(BowError::Io)?;
    Ok(parse_mount_table(&text))
}

/// Walk every mounted filesystem whose mount point matches a
/// checkpoint-participating fstab entry, yielding the joined record.
///
/// Mount rows without a matching participant are skipped silently. An
/// error from the callback stops the walk and propagates; best-effort
/// callers swallow their own per-mount failures instead.
pub fn for_each_checkpointing_mount<F>(
    proc_mounts: &Path,
    fstab: &[FstabEntry],
    mut callback: F,
) -> Result<()>
where
    F: FnMut(&MountedFilesystem, &FstabEntry) -> Result<()>,
{
    for mount in read_mount_table(proc_mounts)? {
        let Some(entry) = entry_for_mount_point(fstab, &mount.mount_point) else {
            continue;
        };
        if !entry.is_checkpoint_participant() {
            continue;
        }
        debug!(
            mount_point = %mount.mount_point.display(),
            block = entry.checkpoint_blk,
            fs = entry.checkpoint_fs,
            "visiting checkpointing mount"
        );
        callback(&mount, entry)?;
    }
    Ok(())
}
