use std::path::PathBuf;

use thiserror::Error;

/// Primary error type for bowd checkpoint operations.
///
/// Structured variants for the cases callers dispatch on, each classified
/// into one of four coarse kinds (see [`ErrorKind`]) that the daemon's
/// service layer reports to its clients.
#[derive(Error, Debug)]
pub enum BowError {
    // === Argument / state validation ===
    /// Malformed caller-supplied argument.
    #[error("invalid argument: {detail}")]
    InvalidArgument { detail: String },

    /// Retry count passed to checkpoint start is below the -1 sentinel.
    #[error("retry count must be more than -1, got {retry}")]
    RetryCountOutOfRange { retry: i32 },

    /// Checkpoint metadata file exists but cannot be parsed.
    #[error("could not parse checkpoint metadata: {detail}")]
    MetadataCorrupt { detail: String },

    /// A path that must name a block device does not.
    #[error("expected block device, got '{path}'")]
    NotABlockDevice { path: PathBuf },

    /// A log sector carries a sequence number other than the one expected
    /// at its position in the chain.
    #[error("expecting log sector {expected} but got {actual}")]
    SequenceMismatch { expected: u32, actual: u32 },

    // === I/O ===
    /// Underlying read/write/open failure. Carries the OS error code.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Fewer bytes than required were read from the device.
    #[error("short read: expected {expected} bytes, got {actual}")]
    ShortRead { expected: usize, actual: usize },

    /// Remount of a checkpoint-participating filesystem failed.
    #[error("failed to remount '{mount_point}': {source}")]
    RemountFailed {
        mount_point: PathBuf,
        source: std::io::Error,
    },

    // === Bow log format ===
    /// The first log sector does not carry the bow magic.
    #[error("no bow magic: found {found:#010x}")]
    BadMagic { found: u32 },

    /// Structurally impossible field in the bow log.
    #[error("bow log is malformed: {detail}")]
    InvalidLogFormat { detail: String },

    // === Payload integrity ===
    /// CRC of a replayed payload disagrees with the entry's stored checksum.
    #[error("checksum mismatch for sector {sector}: expected {expected:#010x}, got {actual:#010x}")]
    ChecksumMismatch {
        sector: u64,
        expected: u32,
        actual: u32,
    },
}

/// Coarse error classification reported across the daemon's service surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed retry count, metadata, device path, or log-sequence mismatch.
    InvalidArgument,
    /// Underlying read/write/open failure.
    IoFailed,
    /// Bow log header magic mismatch or structurally impossible fields.
    InvalidFormat,
    /// Replayed payload CRC disagrees with the stored checksum.
    ChecksumMismatch,
}

impl BowError {
    /// Classify this error for the service surface.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidArgument { .. }
            | Self::RetryCountOutOfRange { .. }
            | Self::MetadataCorrupt { .. }
            | Self::NotABlockDevice { .. }
            | Self::SequenceMismatch { .. } => ErrorKind::InvalidArgument,
            Self::Io(_) | Self::ShortRead { .. } | Self::RemountFailed { .. } => ErrorKind::IoFailed,
            Self::BadMagic { .. } | Self::InvalidLogFormat { .. } => ErrorKind::InvalidFormat,
            Self::ChecksumMismatch { .. } => ErrorKind::ChecksumMismatch,
        }
    }

    /// Raw OS error code, when this error wraps one.
    #[must_use]
    pub fn errno(&self) -> Option<i32> {
        match self {
            Self::Io(e) => e.raw_os_error(),
            Self::RemountFailed { source, .. } => source.raw_os_error(),
            _ => None,
        }
    }

    /// Create an invalid-argument error.
    pub fn invalid_argument(detail: impl Into<String>) -> Self {
        Self::InvalidArgument {
            detail: detail.into(),
        }
    }

    /// Create a malformed-log error.
    pub fn format(detail: impl Into<String>) -> Self {
        Self::InvalidLogFormat {
            detail: detail.into(),
        }
    }
}

/// Result type alias using [`BowError`].
pub type Result<T> = std::result::Result<T, BowError>;
