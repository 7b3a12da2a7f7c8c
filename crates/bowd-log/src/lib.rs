//! Bow copy-on-write log: on-disk format, restore engine, driver control.
//!
//! The kernel's bow device-mapper target relocates the pre-image of every
//! block overwritten during a checkpoint window and appends a record of the
//! relocation to an on-device log rooted at sector 0. This crate consumes
//! that log: [`restore`] validates the whole chain and then replays it in
//! reverse to undo the checkpoint window's writes, and [`BowController`]
//! drives the driver's state machine through its sysfs control file.
//!
//! The on-disk layout (all integers little-endian, offsets in 512-byte
//! sectors, payload sizes in multiples of 4096 bytes):
//! ```text
//! [Log sector: 20-byte header + count * 24-byte entries]   <- device sector 0
//! [relocated pre-image blocks, positions named by entries]
//! ```

pub mod checksum;
pub mod control;
pub mod format;
pub mod remap;
pub mod restore;

pub use checksum::{crc32_fold, entry_seed, payload_checksum};
pub use control::{BowController, BowState};
pub use format::{
    LogEntry, LogSector, LogSectorHeader, BLOCK_SIZE, BOW_MAGIC, LOG_ENTRY_BYTES,
    LOG_SECTOR_HEADER_BYTES, MAX_LOG_ENTRIES, SECTORS_PER_BLOCK, SECTOR_SIZE,
};
pub use remap::RemapTable;
pub use restore::{restore, RestoreOutcome};
