//! Unix block-device backend.
//!
//! Wraps a read-write file descriptor with positional I/O
//! (`pread`/`pwrite` via [`FileExt`]) so concurrent offsets never share a
//! seek cursor, and exposes the `FITRIM` ioctl used to discard free space
//! on a mounted filesystem before a checkpoint is armed.

use std::fs::{File, OpenOptions};
use std::os::fd::AsRawFd;
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};

use bowd_error::{BowError, Result};
use tracing::debug;

use crate::traits::BlockDev;

/// A block device opened for random-access read-write I/O.
#[derive(Debug)]
pub struct UnixBlockDev {
    path: PathBuf,
    file: File,
}

impl UnixBlockDev {
    /// Open `path` read-write without truncation.
    pub fn open(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(BowError::Io)?;
        debug!(path = %path.display(), "opened block device");
        Ok(Self {
            path: path.to_path_buf(),
            file,
        })
    }

    /// Path this device was opened from.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl BlockDev for UnixBlockDev {
    fn read_at(&mut self, buf: &mut [u8], offset: u64) -> Result<usize> {
        let mut read = 0;
        // pread may return less than requested; loop until EOF or full.
        while read < buf.len() {
            let n = self
                .file
                .read_at(&mut buf[read..], offset + read as u64)
                .map_err(BowError::Io)?;
            if n == 0 {
                break;
            }
            read += n;
        }
        if read < buf.len() {
            buf[read..].fill(0);
        }
        Ok(read)
    }

    fn write_at(&mut self, buf: &[u8], offset: u64) -> Result<()> {
        self.file.write_all_at(buf, offset).map_err(BowError::Io)
    }

    fn sync(&mut self) -> Result<()> {
        self.file.sync_all().map_err(BowError::Io)
    }

    fn len(&self) -> Result<u64> {
        let meta = self.file.metadata().map_err(BowError::Io)?;
        Ok(meta.len())
    }
}

/// Argument block for the `FITRIM` ioctl (`struct fstrim_range` in
/// `linux/fs.h`; not exported by the libc crate).
#[repr(C)]
struct FstrimRange {
    start: u64,
    len: u64,
    minlen: u64,
}

nix::ioctl_readwrite!(fitrim_ioctl, b'X', 121, FstrimRange);

/// Issue a full-range discard over the filesystem mounted at `mount_point`.
///
/// Best-effort: the caller decides whether a failure is fatal. The ioctl is
/// issued against an `O_RDONLY` fd on the mount point directory.
pub fn trim_filesystem(mount_point: &Path) -> Result<()> {
    let dir = File::open(mount_point).map_err(BowError::Io)?;
    let mut range = FstrimRange {
        start: 0,
        len: u64::MAX,
        minlen: 0,
    };
    // SAFETY: `range` is a valid fstrim_range for the duration of the call
    // and the fd refers to an open directory.
    unsafe { fitrim_ioctl(dir.as_raw_fd(), &mut range) }
        .map_err(|e| BowError::Io(std::io::Error::from(e)))?;
    debug!(mount_point = %mount_point.display(), trimmed = range.len, "trimmed filesystem");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn read_write_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("dev.img");
        std::fs::write(&path, vec![0u8; 8192]).unwrap();

        let mut dev = UnixBlockDev::open(&path).unwrap();
        dev.write_at(b"hello", 4096).unwrap();

        let mut buf = [0u8; 5];
        let n = dev.read_at(&mut buf, 4096).unwrap();
        assert_eq!(n, 5);
        assert_eq!(&buf, b"hello");
        assert_eq!(dev.len().unwrap(), 8192);
    }

    #[test]
    fn short_read_zero_fills() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("dev.img");
        std::fs::write(&path, vec![0xAAu8; 100]).unwrap();

        let mut dev = UnixBlockDev::open(&path).unwrap();
        let mut buf = [0xFFu8; 200];
        let n = dev.read_at(&mut buf, 0).unwrap();
        assert_eq!(n, 100);
        assert!(buf[..100].iter().all(|&b| b == 0xAA));
        assert!(buf[100..].iter().all(|&b| b == 0));
    }

    #[test]
    fn open_missing_device_fails() {
        let dir = tempdir().unwrap();
        let err = UnixBlockDev::open(&dir.path().join("absent")).unwrap_err();
        assert_eq!(err.kind(), bowd_error::ErrorKind::IoFailed);
    }
}
