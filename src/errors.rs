use imgresize_part_ops::RelocationError;
use part_types::{SectorError, SizeParseError, TableParseError};
use std::{io, path::PathBuf};

/// Defines the errors that may arise while planning and committing a
/// resize. Every variant is fatal; nothing is retried once one is raised,
/// and the only work performed afterwards is device cleanup.
#[rustfmt::skip]
#[derive(Debug, Fail)]
pub enum ResizeError {
    #[fail(display = "{}", why)]
    InvalidSize { why: SizeParseError },
    #[fail(display = "target size of {} MiB is outside the supported range of {} MiB to {} MiB", target_mib, min_mib, max_mib)]
    SizeOutOfRange { target_mib: u64, min_mib: u64, max_mib: u64 },
    #[fail(display = "cannot shrink image to {} MiB: partitions end at {} MiB and a {} MiB margin is kept beyond them", target_mib, floor_mib, margin_mib)]
    ShrinkBelowPartitionBoundary { target_mib: u64, floor_mib: u64, margin_mib: u64 },
    #[fail(display = "not enough free space on the host filesystem: need {} MiB, have {} MiB", needed_mib, available_mib)]
    InsufficientHostSpace { needed_mib: u64, available_mib: u64 },
    #[fail(display = "failed to parse partition table: {}", why)]
    LayoutParse { why: TableParseError },
    #[fail(display = "root partition is {}, but moving or shrinking requires ext4", fs)]
    UnsupportedFilesystem { fs: String },
    #[fail(display = "root partition needs {} MiB but only {} MiB are available; short {} MiB", needed_mib, available_mib, shortfall_mib)]
    InsufficientSpace { needed_mib: u64, available_mib: u64, shortfall_mib: u64 },
    #[fail(display = "{}", why)]
    RelocationFailed { why: RelocationError },
    #[fail(display = "filesystem check failed on {:?}: {}", part, why)]
    FilesystemCheckFailed { part: PathBuf, why: io::Error },
    #[fail(display = "filesystem resize failed on {:?}: {}", part, why)]
    FilesystemResizeFailed { part: PathBuf, why: io::Error },
    #[fail(display = "failed to format {:?}: {}", part, why)]
    FormatFailed { part: PathBuf, why: io::Error },
    #[fail(display = "{:?} is mounted; refusing to operate on a live filesystem", device)]
    DeviceMounted { device: PathBuf },
    #[fail(display = "device mapping error: {}", why)]
    DeviceMap { why: io::Error },
    #[fail(display = "{}", why)]
    Arithmetic { why: SectorError },
    #[fail(display = "{}", why)]
    Io { why: io::Error },
}

impl From<io::Error> for ResizeError {
    fn from(why: io::Error) -> ResizeError { ResizeError::Io { why } }
}

impl From<TableParseError> for ResizeError {
    fn from(why: TableParseError) -> ResizeError { ResizeError::LayoutParse { why } }
}

impl From<SizeParseError> for ResizeError {
    fn from(why: SizeParseError) -> ResizeError { ResizeError::InvalidSize { why } }
}

impl From<SectorError> for ResizeError {
    fn from(why: SectorError) -> ResizeError { ResizeError::Arithmetic { why } }
}

impl From<RelocationError> for ResizeError {
    fn from(why: RelocationError) -> ResizeError { ResizeError::RelocationFailed { why } }
}
