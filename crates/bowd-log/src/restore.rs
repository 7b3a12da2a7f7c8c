//! Validate-then-replay restore engine.
//!
//! [`restore`] undoes every write the bow driver logged during a checkpoint
//! window. It runs two passes over the same device:
//!
//! 1. **Validate** — a dry run. Log sectors are walked newest-first and the
//!    entries inside each are checked last-to-first. Reads go through the
//!    growing [`RemapTable`], so re-reading sector 0 after learning an entry
//!    that covers it transparently yields the next-older log sector in the
//!    chain. Nothing is written.
//! 2. **Apply** — the identical traversal, except reads bypass the table
//!    (no later entry overlays the physical log) and each validated entry's
//!    payload is written back to its `source` sector. Re-reading sector 0
//!    directly works because applying an entry that covers sector 0 is
//!    exactly what exposes the next-older log sector there.
//!
//! A validation failure means the log cannot be trusted to undo anything;
//! the engine then rolls forward instead: it copies the pre-image of block
//! 0 (stashed at the sector the header names) back over sector 0 and lets
//! the filesystem's own journal recover. An apply failure after validation
//! passed leaves the medium indeterminate and is surfaced verbatim.

use bowd_blkdev::BlockDev;
use bowd_error::{BowError, Result};
use tracing::{debug, error, info, warn};

use crate::checksum::payload_checksum;
use crate::format::{LogEntry, LogSector, LogSectorHeader, BLOCK_SIZE, SECTOR_SIZE};
use crate::remap::RemapTable;

/// How a completed restore left the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreOutcome {
    /// The full log validated and was replayed.
    Restored {
        /// Log sectors walked (highest sequence + 1).
        log_sectors: u32,
        /// Entries replayed across all log sectors.
        entries_applied: usize,
    },
    /// Validation failed; only the block-0 pre-image was restored.
    RolledForward,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Validate,
    Apply,
}

impl Phase {
    /// Reads are redirected through the remap table only while validating.
    const fn remaps_reads(self) -> bool {
        matches!(self, Self::Validate)
    }

    const fn label(self) -> &'static str {
        match self {
            Self::Validate => "validating",
            Self::Apply => "restoring",
        }
    }
}

fn sector_offset(sector: u64) -> u64 {
    sector * SECTOR_SIZE as u64
}

/// Read one block at `sector`, redirected through `table` when the phase
/// calls for it. Short reads surface as zeros in the tail, which the
/// caller's magic/checksum validation rejects.
fn read_block<D: BlockDev>(
    dev: &mut D,
    table: &RemapTable,
    phase: Phase,
    sector: u64,
) -> Result<Vec<u8>> {
    let resolved = if phase.remaps_reads() {
        table.resolve(sector)
    } else {
        sector
    };
    let mut buf = vec![0u8; BLOCK_SIZE];
    dev.read_at(&mut buf, sector_offset(resolved))?;
    Ok(buf)
}

/// Read an entry's payload starting at its `dest` sector.
///
/// While validating, each block's starting sector is resolved against the
/// table independently; while applying, the payload is read in one piece.
fn read_payload<D: BlockDev>(
    dev: &mut D,
    table: &RemapTable,
    phase: Phase,
    entry: &LogEntry,
) -> Result<Vec<u8>> {
    let size = entry.size as usize;
    if !phase.remaps_reads() {
        let mut buf = vec![0u8; size];
        dev.read_at(&mut buf, sector_offset(entry.dest))?;
        return Ok(buf);
    }

    let mut buf = vec![0u8; size];
    let mut sector = entry.dest;
    for chunk in buf.chunks_mut(BLOCK_SIZE) {
        let resolved = table.resolve(sector);
        dev.read_at(chunk, sector_offset(resolved))?;
        sector += (BLOCK_SIZE / SECTOR_SIZE) as u64;
    }
    Ok(buf)
}

/// Peek the fixed header of the log chain root at device sector 0.
///
/// Entries are deliberately not parsed here: a malformed entry array must
/// still leave the sequence bound and roll-forward pointer available.
fn read_root_header<D: BlockDev>(dev: &mut D) -> Result<LogSectorHeader> {
    let block = read_block(dev, &RemapTable::new(), Phase::Apply, 0)?;
    LogSectorHeader::from_bytes(&block)
}

/// Walk the log from `highest_sequence` down to 0, validating every entry
/// and, in the apply phase, writing each payload back to its source.
///
/// `table` collects accepted entries; on failure it holds the prefix that
/// validated before the error, which the roll-forward path reads through.
/// Returns the number of entries accepted.
fn walk_log<D: BlockDev>(
    dev: &mut D,
    table: &mut RemapTable,
    phase: Phase,
    highest_sequence: u32,
) -> Result<usize> {
    let mut accepted = 0usize;

    for seq in (0..=highest_sequence).rev() {
        let block = read_block(dev, table, phase, 0)?;
        let header = LogSector::from_block(&block)?;
        if header.sequence != seq {
            return Err(BowError::SequenceMismatch {
                expected: seq,
                actual: header.sequence,
            });
        }

        debug!(
            phase = phase.label(),
            sequence = seq,
            entries = header.entries.len(),
            "walking log sector"
        );

        for entry in header.entries.iter().rev() {
            debug!(
                phase = phase.label(),
                size = entry.size,
                dest = entry.dest,
                source = entry.source,
                checksum = entry.checksum,
                "replaying entry"
            );

            let payload = read_payload(dev, table, phase, entry)?;
            let crc = payload_checksum(entry.source, &payload);
            if entry.checksum != 0 && crc != entry.checksum {
                return Err(BowError::ChecksumMismatch {
                    sector: entry.source,
                    expected: entry.checksum,
                    actual: crc,
                });
            }

            table.push(*entry);

            if phase == Phase::Apply {
                dev.write_at(&payload, sector_offset(entry.source))?;
            }
            accepted += 1;
        }
    }

    Ok(accepted)
}

/// Copy the block-0 pre-image named by the root header back over sector 0.
///
/// `table` holds whatever entries validated before the failure; with none
/// accepted the read is direct.
fn roll_forward<D: BlockDev>(dev: &mut D, table: &RemapTable, sector0: u64) -> Result<()> {
    let block = {
        let resolved = table.resolve(sector0);
        let mut buf = vec![0u8; BLOCK_SIZE];
        dev.read_at(&mut buf, sector_offset(resolved))?;
        buf
    };
    dev.write_at(&block, 0)?;
    dev.sync()?;
    Ok(())
}

/// Restore a block device from its bow log.
///
/// Returns [`RestoreOutcome::Restored`] when the full log replayed, or
/// [`RestoreOutcome::RolledForward`] when validation failed and only the
/// block-0 pre-image was put back.
///
/// # Errors
///
/// `BadMagic`/`InvalidLogFormat` when sector 0 does not parse as a log
/// sector at all (there is then no trusted pre-image pointer to roll
/// forward from); any error from the apply pass, which indicates the
/// medium is in an indeterminate state.
pub fn restore<D: BlockDev>(dev: &mut D) -> Result<RestoreOutcome> {
    let root = read_root_header(dev)?;
    let highest = root.sequence;
    info!(log_sectors = highest + 1, "validating checkpoint log");

    // Pass 1: validate. The table outlives the walk so a partial failure
    // leaves the accepted prefix available to the roll-forward read.
    let mut table = RemapTable::new();
    if let Err(err) = walk_log(dev, &mut table, Phase::Validate, highest) {
        warn!(error = %err, "checkpoint validation failed, attempting roll forward");
        roll_forward(dev, &table, root.sector0)?;
        info!(sector0 = root.sector0, "rolled forward block-0 pre-image");
        return Ok(RestoreOutcome::RolledForward);
    }

    info!(log_sectors = highest + 1, "restoring checkpoint log");

    // Pass 2: apply. Failure here is fatal.
    let mut apply_table = RemapTable::new();
    match walk_log(dev, &mut apply_table, Phase::Apply, highest) {
        Ok(entries_applied) => {
            dev.sync()?;
            info!(entries_applied, "checkpoint restore complete");
            Ok(RestoreOutcome::Restored {
                log_sectors: highest + 1,
                entries_applied,
            })
        }
        Err(err) => {
            error!(error = %err, "checkpoint restore failed after validation passed");
            Err(err)
        }
    }
}
