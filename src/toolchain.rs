use imgresize_external_commands as external;
use part_types::{FileSystem, FilesystemUsage, PartitionTable};
use std::{
    io,
    path::{Path, PathBuf},
};

/// The filesystem toolchain the engine delegates to.
///
/// The production implementation shells out to the system tools; tests
/// substitute a fake so planning and sequencing can run against synthetic
/// disks without touching real block devices.
pub trait Toolchain {
    /// Reads the partition table of a device or image file as a sector-unit
    /// dump.
    fn read_table(&self, device: &Path) -> io::Result<String>;

    /// Replaces the partition table of the device. The kernel's view of the
    /// partitions is stale until the device map is refreshed.
    fn write_table(&self, device: &Path, table: &PartitionTable) -> io::Result<()>;

    fn fsck(&self, part: &Path, fs: FileSystem) -> io::Result<()>;

    /// Resizes the filesystem on `part` to `size_sectors` 512-byte sectors,
    /// or to the size of its partition when `None`.
    fn resize_filesystem(&self, part: &Path, size_sectors: Option<u64>) -> io::Result<()>;

    /// Creates a fresh FAT32 filesystem on the boot partition.
    fn format_boot(&self, part: &Path, label: Option<&str>) -> io::Result<()>;

    /// Total 512-byte sectors on the device.
    fn disk_sectors(&self, device: &Path) -> io::Result<u64>;

    fn filesystem_usage(&self, part: &Path) -> io::Result<FilesystemUsage>;

    fn probe_filesystem(&self, part: &Path) -> Option<FileSystem>;

    fn filesystem_label(&self, part: &Path) -> Option<String>;

    /// Free bytes on the host filesystem containing `path`.
    fn host_free_space(&self, path: &Path) -> io::Result<u64>;

    fn backup_boot_files(&self, part: &Path, stash: &Path) -> io::Result<()>;

    fn restore_boot_files(&self, stash: &Path, part: &Path) -> io::Result<()>;
}

/// Maps an image file to a block device with addressable partitions.
pub trait DeviceMap {
    fn attach(&self, image: &Path) -> io::Result<PathBuf>;

    /// The path of the `num`th partition of an attached device. Only valid
    /// until the next table rewrite; re-derive after every `remap`.
    fn partition_path(&self, device: &Path, num: u32) -> PathBuf;

    /// Refreshes the kernel's view of the device after a table rewrite.
    fn remap(&self, device: &Path) -> io::Result<()>;

    fn detach(&self, device: &Path) -> io::Result<()>;
}

/// Shells out to the system partitioning and filesystem tools.
pub struct SystemToolchain;

impl Toolchain for SystemToolchain {
    fn read_table(&self, device: &Path) -> io::Result<String> {
        external::dump_partition_table(device)
    }

    fn write_table(&self, device: &Path, table: &PartitionTable) -> io::Result<()> {
        external::write_partition_table(device, &table.to_script())
    }

    fn fsck(&self, part: &Path, fs: FileSystem) -> io::Result<()> { external::fsck(part, fs) }

    fn resize_filesystem(&self, part: &Path, size_sectors: Option<u64>) -> io::Result<()> {
        external::resize2fs(part, size_sectors)
    }

    fn format_boot(&self, part: &Path, label: Option<&str>) -> io::Result<()> {
        external::mkfs_fat32(part, label)
    }

    fn disk_sectors(&self, device: &Path) -> io::Result<u64> { external::disk_sectors(device) }

    fn filesystem_usage(&self, part: &Path) -> io::Result<FilesystemUsage> {
        external::ext_usage(part)
    }

    fn probe_filesystem(&self, part: &Path) -> Option<FileSystem> {
        external::blkid_partition(part)
    }

    fn filesystem_label(&self, part: &Path) -> Option<String> { external::partition_label(part) }

    fn host_free_space(&self, path: &Path) -> io::Result<u64> { external::host_free_space(path) }

    fn backup_boot_files(&self, part: &Path, stash: &Path) -> io::Result<()> {
        external::backup_boot_files(part, stash)
    }

    fn restore_boot_files(&self, stash: &Path, part: &Path) -> io::Result<()> {
        external::restore_boot_files(stash, part)
    }
}

/// Attaches images to loop devices with partition scanning.
pub struct LoopDeviceMap;

impl DeviceMap for LoopDeviceMap {
    fn attach(&self, image: &Path) -> io::Result<PathBuf> { external::losetup_attach(image) }

    fn partition_path(&self, device: &Path, num: u32) -> PathBuf {
        external::partition_device(device, num)
    }

    fn remap(&self, device: &Path) -> io::Result<()> { external::reread_partitions(device) }

    fn detach(&self, device: &Path) -> io::Result<()> { external::losetup_detach(device) }
}
