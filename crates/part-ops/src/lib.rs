//! Tools for moving partition data within a disk image or block device.

#[macro_use]
extern crate derive_new;
#[macro_use]
extern crate log;

mod mvpart;

pub use self::mvpart::*;

/// Defines the start and end sectors of a partition on the disk, both
/// inclusive.
#[derive(new, Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockCoordinates {
    pub start: u64,
    pub end: u64,
}

impl BlockCoordinates {
    /// Number of sectors spanned.
    pub fn sectors(&self) -> u64 { self.end - self.start + 1 }

    /// Adjusts the end coordinate so the range spans `new_len` sectors from
    /// the same start. Used to clamp a source range to the final (possibly
    /// shrunk) partition size before computing copy offsets.
    pub fn resize_to(&mut self, new_len: u64) {
        debug_assert!(new_len > 0);
        self.end = self.start + new_len - 1;
    }
}

/// Defines how many sectors to skip, how far the data moves, and how many
/// sectors travel with it.
#[derive(Debug, Clone, Copy)]
pub struct OffsetCoordinates {
    pub skip: u64,
    pub offset: i64,
    pub length: u64,
}
