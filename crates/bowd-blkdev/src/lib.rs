//! Block-device I/O abstraction for the bowd checkpoint subsystem.
//!
//! This crate decouples the restore engine from the backing store. Real
//! devices go through [`UnixBlockDev`]; tests run against the in-memory
//! [`MemoryBlockDev`] with no root privileges or loop devices required.

pub mod memory;
pub mod traits;
pub mod unix;

pub use memory::MemoryBlockDev;
pub use traits::BlockDev;
pub use unix::{trim_filesystem, UnixBlockDev};
