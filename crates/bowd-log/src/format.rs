//! On-disk bow log structures.
//!
//! Layout of the log sector at device sector 0:
//! ```text
//! Offset  Size  Description
//!   0       4   Magic: 0x00574F42 ("BOW\0")
//!   4       4   Number of entries in this log sector
//!   8       4   Sequence: index of this log sector; the sector-0 header
//!               also names the highest sequence in the chain
//!  12       8   Sector where the original block-0 contents reside
//!  20      24*  count entries
//! ```
//!
//! Entry layout:
//! ```text
//! Offset  Size  Description
//!   0       8   source: sector the data originally lived at
//!   8       8   dest: sector the pre-image was relocated to
//!  16       4   size: payload length in bytes, multiple of 4096
//!  20       4   checksum: chained CRC-32 of the pre-image; 0 = unverified
//! ```

use bowd_error::{BowError, Result};

/// Device addressing granularity in bytes.
pub const SECTOR_SIZE: usize = 512;
/// CRC and I/O granularity in bytes.
pub const BLOCK_SIZE: usize = 4096;
/// Sectors per block.
pub const SECTORS_PER_BLOCK: u64 = (BLOCK_SIZE / SECTOR_SIZE) as u64;

/// "BOW\0" in ASCII, little-endian.
pub const BOW_MAGIC: u32 = 0x0057_4F42;

/// Fixed log sector header size in bytes.
pub const LOG_SECTOR_HEADER_BYTES: usize = 20;
/// Packed size of one log entry in bytes.
pub const LOG_ENTRY_BYTES: usize = 24;

/// Maximum entry count a log sector can carry.
///
/// The header lives at sector 0 but is read at block granularity, so the
/// trailing entry array is bounded by the rest of that 4096-byte block.
pub const MAX_LOG_ENTRIES: usize = (BLOCK_SIZE - LOG_SECTOR_HEADER_BYTES) / LOG_ENTRY_BYTES;

fn read_u32_le(buf: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes(
        buf[offset..offset + 4]
            .try_into()
            .expect("slice length checked by caller"),
    )
}

fn read_u64_le(buf: &[u8], offset: usize) -> u64 {
    u64::from_le_bytes(
        buf[offset..offset + 8]
            .try_into()
            .expect("slice length checked by caller"),
    )
}

/// One relocation record: `size` bytes that lived at sector `source` were
/// moved to sector `dest` before being overwritten.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogEntry {
    /// Sector where the data originally lived.
    pub source: u64,
    /// Sector where the pre-image was relocated to.
    pub dest: u64,
    /// Payload length in bytes; multiple of [`BLOCK_SIZE`].
    pub size: u32,
    /// Chained CRC-32 of the pre-image; 0 means "do not verify".
    pub checksum: u32,
}

impl LogEntry {
    /// Decode one packed entry.
    ///
    /// # Errors
    ///
    /// `InvalidLogFormat` when the buffer is short or `size` is not a
    /// multiple of the block size.
    pub fn from_bytes(buf: &[u8]) -> Result<Self> {
        if buf.len() < LOG_ENTRY_BYTES {
            return Err(BowError::format(format!(
                "log entry truncated: need {LOG_ENTRY_BYTES} bytes, got {}",
                buf.len()
            )));
        }
        let entry = Self {
            source: read_u64_le(buf, 0),
            dest: read_u64_le(buf, 8),
            size: read_u32_le(buf, 16),
            checksum: read_u32_le(buf, 20),
        };
        if entry.size as usize % BLOCK_SIZE != 0 {
            return Err(BowError::format(format!(
                "log entry size {} is not a multiple of {BLOCK_SIZE}",
                entry.size
            )));
        }
        Ok(entry)
    }

    /// Encode into the packed on-disk representation.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; LOG_ENTRY_BYTES] {
        let mut buf = [0u8; LOG_ENTRY_BYTES];
        buf[0..8].copy_from_slice(&self.source.to_le_bytes());
        buf[8..16].copy_from_slice(&self.dest.to_le_bytes());
        buf[16..20].copy_from_slice(&self.size.to_le_bytes());
        buf[20..24].copy_from_slice(&self.checksum.to_le_bytes());
        buf
    }

    /// Number of sectors this entry's payload covers.
    #[must_use]
    pub fn sector_span(&self) -> u64 {
        u64::from(self.size) / SECTOR_SIZE as u64
    }
}

/// The fixed 20-byte log sector header, without its entry array.
///
/// The restore engine peeks this off sector 0 before anything else: the
/// `sequence` bounds the walk and `sector0` is the roll-forward pointer,
/// both needed even when the trailing entries turn out to be garbage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogSectorHeader {
    /// Must equal [`BOW_MAGIC`].
    pub magic: u32,
    /// Number of entries that follow the header.
    pub count: u32,
    /// Index of this log sector in the chain.
    pub sequence: u32,
    /// Sector holding the original contents of device block 0.
    pub sector0: u64,
}

impl LogSectorHeader {
    /// Decode the fixed header fields.
    ///
    /// # Errors
    ///
    /// `InvalidLogFormat` when the buffer is short; `BadMagic` when the
    /// magic does not match.
    pub fn from_bytes(buf: &[u8]) -> Result<Self> {
        if buf.len() < LOG_SECTOR_HEADER_BYTES {
            return Err(BowError::format(format!(
                "log sector truncated: need {LOG_SECTOR_HEADER_BYTES} bytes, got {}",
                buf.len()
            )));
        }
        let magic = read_u32_le(buf, 0);
        if magic != BOW_MAGIC {
            return Err(BowError::BadMagic { found: magic });
        }
        Ok(Self {
            magic,
            count: read_u32_le(buf, 4),
            sequence: read_u32_le(buf, 8),
            sector0: read_u64_le(buf, 12),
        })
    }
}

/// A parsed log sector: fixed header plus its trailing entry array.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSector {
    /// Must equal [`BOW_MAGIC`].
    pub magic: u32,
    /// Index of this log sector in the chain.
    pub sequence: u32,
    /// Sector holding the original contents of device block 0.
    pub sector0: u64,
    /// Relocation records, oldest first.
    pub entries: Vec<LogEntry>,
}

impl LogSector {
    /// Parse a log sector from one 4096-byte block.
    ///
    /// # Errors
    ///
    /// `BadMagic` when the magic does not match; `InvalidLogFormat` when
    /// the buffer is short, the entry count exceeds the block's capacity,
    /// or any entry is malformed.
    pub fn from_block(buf: &[u8]) -> Result<Self> {
        let header = LogSectorHeader::from_bytes(buf)?;

        let count = header.count as usize;
        let capacity = (buf.len() - LOG_SECTOR_HEADER_BYTES) / LOG_ENTRY_BYTES;
        if count > capacity.min(MAX_LOG_ENTRIES) {
            return Err(BowError::format(format!(
                "log sector claims {count} entries but holds at most {MAX_LOG_ENTRIES}"
            )));
        }

        let mut entries = Vec::with_capacity(count);
        for i in 0..count {
            let offset = LOG_SECTOR_HEADER_BYTES + i * LOG_ENTRY_BYTES;
            entries.push(LogEntry::from_bytes(&buf[offset..offset + LOG_ENTRY_BYTES])?);
        }

        Ok(Self {
            magic: header.magic,
            sequence: header.sequence,
            sector0: header.sector0,
            entries,
        })
    }

    /// Serialize into one zero-padded 4096-byte block.
    ///
    /// Used by tests and tooling that construct log images; the kernel
    /// driver is the production writer.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn to_block(&self) -> Vec<u8> {
        debug_assert!(self.entries.len() <= MAX_LOG_ENTRIES);
        let mut buf = vec![0u8; BLOCK_SIZE];
        buf[0..4].copy_from_slice(&self.magic.to_le_bytes());
        buf[4..8].copy_from_slice(&(self.entries.len() as u32).to_le_bytes());
        buf[8..12].copy_from_slice(&self.sequence.to_le_bytes());
        buf[12..20].copy_from_slice(&self.sector0.to_le_bytes());
        for (i, entry) in self.entries.iter().enumerate() {
            let offset = LOG_SECTOR_HEADER_BYTES + i * LOG_ENTRY_BYTES;
            buf[offset..offset + LOG_ENTRY_BYTES].copy_from_slice(&entry.to_bytes());
        }
        buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_entry() -> LogEntry {
        LogEntry {
            source: 8,
            dest: 16,
            size: 4096,
            checksum: 0xDEAD_BEEF,
        }
    }

    #[test]
    fn entry_roundtrip() {
        let entry = sample_entry();
        let decoded = LogEntry::from_bytes(&entry.to_bytes()).unwrap();
        assert_eq!(decoded, entry);
    }

    #[test]
    fn entry_rejects_unaligned_size() {
        let mut bytes = sample_entry().to_bytes();
        bytes[16..20].copy_from_slice(&100u32.to_le_bytes());
        let err = LogEntry::from_bytes(&bytes).unwrap_err();
        assert_eq!(err.kind(), bowd_error::ErrorKind::InvalidFormat);
    }

    #[test]
    fn entry_allows_multi_block_size() {
        let mut bytes = sample_entry().to_bytes();
        bytes[16..20].copy_from_slice(&(3 * 4096u32).to_le_bytes());
        let entry = LogEntry::from_bytes(&bytes).unwrap();
        assert_eq!(entry.sector_span(), 24);
    }

    #[test]
    fn sector_roundtrip() {
        let sector = LogSector {
            magic: BOW_MAGIC,
            sequence: 3,
            sector0: 40,
            entries: vec![sample_entry(), sample_entry()],
        };
        let block = sector.to_block();
        assert_eq!(block.len(), BLOCK_SIZE);
        let decoded = LogSector::from_block(&block).unwrap();
        assert_eq!(decoded, sector);
    }

    #[test]
    fn sector_rejects_bad_magic() {
        let mut block = LogSector {
            magic: BOW_MAGIC,
            sequence: 0,
            sector0: 0,
            entries: vec![],
        }
        .to_block();
        block[0] = 0x42 + 1;
        let err = LogSector::from_block(&block).unwrap_err();
        assert!(matches!(err, BowError::BadMagic { .. }));
    }

    #[test]
    fn sector_rejects_oversized_count() {
        let mut block = LogSector {
            magic: BOW_MAGIC,
            sequence: 0,
            sector0: 0,
            entries: vec![],
        }
        .to_block();
        let bogus = (MAX_LOG_ENTRIES as u32) + 1;
        block[4..8].copy_from_slice(&bogus.to_le_bytes());
        let err = LogSector::from_block(&block).unwrap_err();
        assert_eq!(err.kind(), bowd_error::ErrorKind::InvalidFormat);
    }

    #[test]
    fn max_entries_fills_block() {
        assert_eq!(MAX_LOG_ENTRIES, 169);
        assert!(LOG_SECTOR_HEADER_BYTES + MAX_LOG_ENTRIES * LOG_ENTRY_BYTES <= BLOCK_SIZE);
    }

    #[test]
    fn header_peek_ignores_malformed_entries() {
        let sector = LogSector {
            magic: BOW_MAGIC,
            sequence: 5,
            sector0: 48,
            entries: vec![sample_entry()],
        };
        let mut block = sector.to_block();
        // Corrupt the entry's size field; the full parse must fail but the
        // header peek still yields sequence and sector0.
        block[36..40].copy_from_slice(&3u32.to_le_bytes());
        assert!(LogSector::from_block(&block).is_err());

        let header = LogSectorHeader::from_bytes(&block).unwrap();
        assert_eq!(header.sequence, 5);
        assert_eq!(header.sector0, 48);
        assert_eq!(header.count, 1);
    }

    #[test]
    fn empty_sector_parses() {
        let sector = LogSector {
            magic: BOW_MAGIC,
            sequence: 0,
            sector0: 0,
            entries: vec![],
        };
        let decoded = LogSector::from_block(&sector.to_block()).unwrap();
        assert!(decoded.entries.is_empty());
        assert_eq!(decoded.sequence, 0);
    }
}
