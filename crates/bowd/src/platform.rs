//! Host-system hooks the lifecycle manager drives.
//!
//! Remounting, discard, property publication and reboot all reach outside
//! the process. They sit behind one trait so lifecycle tests can run
//! against a recording fake without privileges.

use std::path::Path;

use bowd_error::{BowError, Result};
use tracing::{error, info};

use crate::fstab::MountFlags;

/// System operations consumed by [`crate::CheckpointManager`].
pub trait Platform: Send + Sync {
    /// Remount the filesystem at `mount_point` with its prior kernel
    /// `flags` plus `MS_REMOUNT`, passing `data` through to the
    /// filesystem (e.g. `"...,checkpoint=enable"`).
    fn remount(
        &self,
        blk_device: &Path,
        mount_point: &Path,
        flags: MountFlags,
        data: &str,
    ) -> Result<()>;

    /// Issue a full-range discard over the filesystem at `mount_point`.
    fn trim(&self, mount_point: &Path) -> Result<()>;

    /// Publish a process-visible property.
    fn set_property(&self, key: &str, value: &str) -> Result<()>;

    /// Reboot the system. Does not return on success.
    fn reboot(&self);
}

/// Production implementation over the Linux syscall surface.
///
/// Property publication is delegated to the host daemon's property
/// service by the integration layer; this implementation records the
/// value in the structured log so the transition is observable.
#[derive(Debug, Clone, Copy, Default)]
pub struct LinuxPlatform;

impl Platform for LinuxPlatform {
    fn remount(
        &self,
        blk_device: &Path,
        mount_point: &Path,
        flags: MountFlags,
        data: &str,
    ) -> Result<()> {
        let ms_flags = nix::mount::MsFlags::MS_REMOUNT
            | nix::mount::MsFlags::from_bits_truncate(flags.bits() as libc::c_ulong);
        nix::mount::mount(
            Some(blk_device),
            mount_point,
            Some("none"),
            ms_flags,
            Some(data),
        )
        .map_err(|e| BowError::RemountFailed {
            mount_point: mount_point.to_path_buf(),
            source: std::io::Error::from(e),
        })?;
        info!(
            mount_point = %mount_point.display(),
            data,
            "remounted filesystem"
        );
        Ok(())
    }

    fn trim(&self, mount_point: &Path) -> Result<()> {
        bowd_blkdev::trim_filesystem(mount_point)
    }

    fn set_property(&self, key: &str, value: &str) -> Result<()> {
        info!(key, value, "property set");
        Ok(())
    }

    fn reboot(&self) {
        info!("rebooting to complete checkpoint abort");
        if let Err(e) = nix::sys::reboot::reboot(nix::sys::reboot::RebootMode::RB_AUTOBOOT) {
            error!(error = %e, "reboot request failed");
        }
    }
}
