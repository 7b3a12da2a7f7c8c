//! Checkpoint lifecycle state machine.
//!
//! The persistent state lives in the metadata file (see
//! [`crate::metadata`]): absent means idle, `"<n>"` means a checkpoint is
//! armed with n boot attempts left, `"-1 <suffix>"` means roll back on the
//! next boot if the A/B slot has not changed. The only in-process state is
//! the `is_checkpointing` latch, set when [`CheckpointManager::needs_checkpoint`]
//! answers yes and consumed by [`CheckpointManager::commit`].
//!
//! Call order across a risky update, as driven by the host daemon:
//! ```text
//! start(retry)                 before the risky work is scheduled
//! --- reboot ---
//! needs_rollback()?            restore_checkpoint() per block device
//! needs_checkpoint()?          mark_boot_attempt(), then prepare()
//! --- risky work succeeds ---
//! commit()                     or abort() to force a rollback boot
//! ```

use std::path::Path;
use std::sync::Arc;

use bowd_blkdev::UnixBlockDev;
use bowd_error::{BowError, Result};
use bowd_log::{restore, BowController, BowState, RestoreOutcome};
use tracing::{info, warn};

use crate::config::CheckpointConfig;
use crate::fstab::{load_fstab, FstabEntry};
use crate::hal::BootControl;
use crate::metadata::{CheckpointState, MetadataFile};
use crate::mounts::for_each_checkpointing_mount;
use crate::platform::Platform;

/// Filesystem type whose native checkpoint holdback the commit path
/// re-enables.
const CHECKPOINT_FS_TYPE: &str = "f2fs";

/// Drives checkpoint arming, boot-time decisions, commit and rollback.
pub struct CheckpointManager {
    config: CheckpointConfig,
    fstab: Vec<FstabEntry>,
    metadata: MetadataFile,
    bow: BowController,
    hal: Option<Arc<dyn BootControl>>,
    platform: Arc<dyn Platform>,
    is_checkpointing: bool,
}

impl CheckpointManager {
    /// Build a manager over an already-loaded fstab.
    #[must_use]
    pub fn new(
        config: CheckpointConfig,
        fstab: Vec<FstabEntry>,
        hal: Option<Arc<dyn BootControl>>,
        platform: Arc<dyn Platform>,
    ) -> Self {
        let metadata = MetadataFile::new(config.metadata_file.clone());
        let bow = BowController::with_roots(config.dev_root.clone(), config.sys_root.clone());
        Self {
            config,
            fstab,
            metadata,
            bow,
            hal,
            platform,
            is_checkpointing: false,
        }
    }

    /// Build a manager, loading the fstab named by the config.
    pub fn load(
        config: CheckpointConfig,
        hal: Option<Arc<dyn BootControl>>,
        platform: Arc<dyn Platform>,
    ) -> Result<Self> {
        let fstab = load_fstab(&config.fstab_path)?;
        Ok(Self::new(config, fstab, hal, platform))
    }

    /// True while a checkpoint window is latched in this process.
    #[must_use]
    pub fn is_checkpointing(&self) -> bool {
        self.is_checkpointing
    }

    /// Whether any fstab entry participates in checkpoints.
    #[must_use]
    pub fn supports(&self) -> bool {
        self.fstab.iter().any(FstabEntry::is_checkpoint_participant)
    }

    /// Arm a checkpoint.
    ///
    /// `retry >= 0` grants that many boot attempts before rollback;
    /// `retry == -1` arms an unconditional rollback scoped to the current
    /// A/B slot when the boot-control HAL can name it.
    ///
    /// # Errors
    ///
    /// `RetryCountOutOfRange` for `retry < -1`; I/O failures writing the
    /// metadata file.
    pub fn start(&self, retry: i32) -> Result<()> {
        if retry < -1 {
            return Err(BowError::RetryCountOutOfRange { retry });
        }

        let state = if retry == -1 {
            match self.hal.as_deref().and_then(BootControl::current_slot_suffix) {
                Some(suffix) => CheckpointState::RollbackArmed(suffix),
                // No slot information: fall back to the plain counter.
                None => CheckpointState::Armed(0),
            }
        } else {
            #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
            let remaining = (i64::from(retry) + 1) as u32;
            CheckpointState::Armed(remaining)
        };

        info!(retry, state = %state.to_content(), "starting checkpoint");
        self.metadata.write(&state)
    }

    /// Decide whether this boot runs inside a checkpoint window, latching
    /// `is_checkpointing` when it does.
    ///
    /// The boot-control HAL is consulted first: a current slot not yet
    /// marked successful always means a checkpoint is wanted. Otherwise
    /// the metadata file decides: present with contents other than `"0"`.
    pub fn needs_checkpoint(&mut self) -> bool {
        if let Some(hal) = &self.hal {
            if hal.is_current_slot_successful() == Some(false) {
                self.is_checkpointing = true;
                return true;
            }
        }
        match self.metadata.read() {
            Ok(Some(content)) => {
                let needed = content != "0";
                self.is_checkpointing = needed;
                needed
            }
            _ => false,
        }
    }

    /// Whether the previous checkpoint must be rolled back this boot:
    /// the retry budget hit zero, or a slot-scoped rollback is armed and
    /// the slot has not switched away.
    #[must_use]
    pub fn needs_rollback(&self) -> bool {
        let Ok(Some(content)) = self.metadata.read() else {
            return false;
        };
        if content == "0" {
            return true;
        }
        if let Some(armed_suffix) = content.strip_prefix("-1 ") {
            let current = self
                .hal
                .as_deref()
                .and_then(BootControl::current_slot_suffix);
            return current.as_deref() == Some(armed_suffix);
        }
        false
    }

    /// Burn one boot attempt off the retry budget.
    ///
    /// No-op when no checkpoint is in progress or the counter is already
    /// at zero (or is the rollback sentinel).
    ///
    /// # Errors
    ///
    /// `MetadataCorrupt` when the counter does not parse; I/O failures
    /// reading or rewriting the file.
    pub fn mark_boot_attempt(&self) -> Result<()> {
        let Some(content) = self.metadata.read()? else {
            return Ok(());
        };
        let token = content.split(' ').next().unwrap_or_default();
        let retry: i64 = token.parse().map_err(|_| BowError::MetadataCorrupt {
            detail: format!("retry counter '{token}' is not an integer"),
        })?;
        if retry > 0 {
            #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
            let next = CheckpointState::Armed((retry - 1) as u32);
            info!(remaining = retry - 1, "boot attempt marked");
            self.metadata.write(&next)?;
        }
        Ok(())
    }

    /// Ready every block-mode participant for the checkpoint window:
    /// discard free space so the bow log has room, then move the driver
    /// to the prepared state.
    ///
    /// Per-mount failures are logged and skipped; preparation is
    /// best-effort.
    ///
    /// # Errors
    ///
    /// Only an unreadable mount table fails the operation.
    pub fn prepare(&self) -> Result<()> {
        for_each_checkpointing_mount(&self.config.proc_mounts, &self.fstab, |mount, entry| {
            if !entry.checkpoint_blk {
                return Ok(());
            }
            if let Err(e) = self.platform.trim(&mount.mount_point) {
                warn!(
                    mount_point = %mount.mount_point.display(),
                    error = %e,
                    "failed to trim, skipping mount"
                );
                return Ok(());
            }
            if let Err(e) = self.bow.set_state(&mount.blk_device, BowState::Prepared) {
                warn!(
                    device = %mount.blk_device.display(),
                    error = %e,
                    "failed to set bow state"
                );
            }
            Ok(())
        })
    }

    /// Make the checkpoint window's writes permanent.
    ///
    /// No-op unless a window is latched. Every fs-mode participant of the
    /// filesystem type of interest is remounted with `checkpoint=enable`
    /// on top of its prior flags; every block-mode participant's bow
    /// driver moves to committed. Only then is the committed property
    /// published, the latch cleared, and the metadata file deleted.
    ///
    /// Safe to re-run: repeating the per-mount transitions is harmless,
    /// and once the latch is down the whole call is a no-op.
    pub fn commit(&mut self) -> Result<()> {
        if !self.is_checkpointing {
            return Ok(());
        }

        for_each_checkpointing_mount(&self.config.proc_mounts, &self.fstab, |mount, entry| {
            if entry.checkpoint_fs {
                if entry.fs_type == CHECKPOINT_FS_TYPE {
                    let data = format!("{},checkpoint=enable", mount.fs_options);
                    self.platform
                        .remount(&mount.blk_device, &mount.mount_point, entry.flags, &data)?;
                }
            } else if entry.checkpoint_blk {
                self.bow.set_state(&mount.blk_device, BowState::Committed)?;
            }
            Ok(())
        })?;

        self.platform
            .set_property(&self.config.committed_property(), "1")?;
        self.is_checkpointing = false;
        self.metadata.remove()?;
        info!("checkpoint committed");
        Ok(())
    }

    /// Abandon the checkpoint window by rebooting; the armed metadata
    /// then forces a rollback on the way back up. Never fails.
    pub fn abort(&self) {
        info!("aborting checkpoint");
        self.platform.reboot();
    }

    /// Roll a block device back from its bow log at boot.
    ///
    /// # Errors
    ///
    /// Opening the device, an unparseable log root, or an apply-phase
    /// failure (see [`bowd_log::restore`]).
    pub fn restore_checkpoint(&self, block_device: &Path) -> Result<RestoreOutcome> {
        info!(device = %block_device.display(), "restoring checkpoint");
        let mut dev = UnixBlockDev::open(block_device)?;
        restore(&mut dev)
    }
}
