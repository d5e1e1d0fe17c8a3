//! Backend library for resizing the boot (FAT32) and root (ext4) partitions
//! of a two-partition DOS/MBR disk image.
//!
//! The library plans a new partition layout from a target boot size and/or
//! target image size, decides whether the root partition must shrink, move,
//! or grow, and performs an overlap-safe relocation of the root partition
//! data when the enlarged boot partition would otherwise collide with it.
//! Filesystem-level work (fsck, resize, format) is delegated to the system
//! toolchain behind the [`Toolchain`] trait; block device mapping is behind
//! [`DeviceMap`]. Both have fakeable seams so planning and sequencing can be
//! exercised without real block devices.

#[macro_use]
extern crate failure_derive;
#[macro_use]
extern crate log;

mod errors;
pub mod logging;
mod plan;
mod resize;
mod sizing;
mod toolchain;

pub use crate::{errors::*, plan::*, resize::*, sizing::*, toolchain::*};
pub use imgresize_part_ops::{BlockCoordinates, OffsetCoordinates, RelocationError};
pub use part_types::{
    FileSystem, FilesystemUsage, PartitionEntry, PartitionTable, SizeSpec, MEBIBYTE, SECTOR_SIZE,
};
