//! Sector remap table built during restore.
//!
//! As log entries validate, the pre-images they describe are known to live
//! at their `dest` sectors, so any later read of a `source` sector must be
//! redirected there. Lookups prefer the most-recently-learned entry: the
//! driver appends entries chronologically and reverse replay learns them
//! newest-first, which makes the newest covering entry authoritative.

use crate::format::{LogEntry, SECTOR_SIZE};

/// Ordered set of accepted relocation records.
///
/// Created empty per restore invocation, appended to as entries validate,
/// discarded on completion.
#[derive(Debug, Clone, Default)]
pub struct RemapTable {
    entries: Vec<LogEntry>,
}

impl RemapTable {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a validated entry.
    pub fn push(&mut self, entry: LogEntry) {
        self.entries.push(entry);
    }

    /// Number of recorded entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no entry has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Resolve a read of `sector` against the table.
    ///
    /// Scans newest to oldest; the first entry covering `sector` redirects
    /// the read into its relocated range. Uncovered sectors map to
    /// themselves.
    #[must_use]
    pub fn resolve(&self, sector: u64) -> u64 {
        for entry in self.entries.iter().rev() {
            if sector >= entry.source
                && (sector - entry.source) * (SECTOR_SIZE as u64) < u64::from(entry.size)
            {
                return sector - entry.source + entry.dest;
            }
        }
        sector
    }
}
