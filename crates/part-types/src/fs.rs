use std::{fmt, str::FromStr};

/// Describes a file system format which may be found on one of the two
/// partitions of an image.
#[derive(Debug, PartialEq, Eq, Copy, Clone, Hash)]
pub enum FileSystem {
    Ext2,
    Ext3,
    Ext4,
    Fat16,
    Fat32,
}

impl FileSystem {
    /// Whether this is one of the FAT variants expected on a boot partition.
    pub fn is_fat(self) -> bool { matches!(self, FileSystem::Fat16 | FileSystem::Fat32) }

    /// Whether this is a member of the extended filesystem family.
    pub fn is_ext(self) -> bool {
        matches!(self, FileSystem::Ext2 | FileSystem::Ext3 | FileSystem::Ext4)
    }
}

impl FromStr for FileSystem {
    type Err = &'static str;

    fn from_str(string: &str) -> Result<Self, Self::Err> {
        let type_ = match string.to_lowercase().as_str() {
            "ext2" => FileSystem::Ext2,
            "ext3" => FileSystem::Ext3,
            "ext4" => FileSystem::Ext4,
            "fat16" => FileSystem::Fat16,
            "fat32" | "vfat" | "fat" => FileSystem::Fat32,
            _ => return Err("invalid file system name"),
        };

        Ok(type_)
    }
}

impl From<FileSystem> for &'static str {
    fn from(fs: FileSystem) -> Self {
        match fs {
            FileSystem::Ext2 => "ext2",
            FileSystem::Ext3 => "ext3",
            FileSystem::Ext4 => "ext4",
            FileSystem::Fat16 => "fat16",
            FileSystem::Fat32 => "fat32",
        }
    }
}

impl fmt::Display for FileSystem {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(<&'static str>::from(*self))
    }
}
