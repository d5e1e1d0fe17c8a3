use crate::errors::ResizeError;
use imgresize_part_ops::BlockCoordinates;
use part_types::{
    align_up, bytes_to_sectors, FileSystem, FilesystemUsage, PartitionTable, SectorError,
    MEBIBYTE, PARTITION_ALIGNMENT, SECTOR_SIZE,
};

/// Fixed headroom (100 MiB of sectors) added on top of scaled usage when
/// computing the smallest root partition that is safe to create.
pub const ROOT_SAFETY_SECTORS: u64 = 204_800;

/// Buffer kept between a force-shrunk root partition and the end of the
/// disk (100 MiB of sectors).
pub const ROOT_SHRINK_BUFFER_SECTORS: u64 = 204_800;

/// Sectors reserved past the root partition when growing it to fill the
/// disk (1 MiB).
pub const TAIL_RESERVED_SECTORS: u64 = PARTITION_ALIGNMENT;

/// The layout computed for a boot partition resize: where both partitions
/// will live, and whether the root partition has to shrink and/or move to
/// get there.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResizePlan {
    pub new_boot: BlockCoordinates,
    pub new_root: BlockCoordinates,
    pub needs_move: bool,
    pub needs_shrink: bool,
    pub root_min_safe_sectors: u64,
}

/// The direction of a completed image-level size change, which decides the
/// post-resize adjustment of the root partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageSizeChange {
    Expanded,
    Shrunk,
}

/// A root partition adjustment required after the image itself changed
/// size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TailAdjustment {
    Grow { size_sectors: u64 },
    Shrink { size_sectors: u64 },
}

/// The smallest root partition considered safe for the given usage
/// snapshot: 120% of the used bytes, rounded up to sectors, plus a fixed
/// 100 MiB of headroom for filesystem metadata growth.
pub fn root_min_safe_sectors(usage: &FilesystemUsage) -> Result<u64, ResizeError> {
    let scaled = usage
        .used_bytes
        .checked_mul(6)
        .map(|v| (v + 4) / 5)
        .ok_or(SectorError::ArithmeticOverflow { value: usage.used_bytes })?;

    Ok(bytes_to_sectors(scaled)? + ROOT_SAFETY_SECTORS)
}

/// Computes the new layout for a target boot partition size.
///
/// Performs no I/O: the current table, disk size, probed filesystem types,
/// and usage snapshot are all supplied by the caller, so the planner can be
/// driven entirely with synthetic inputs.
pub fn plan_boot_resize(
    table: &PartitionTable,
    boot_size_sectors: u64,
    disk_sectors: u64,
    boot_fs: Option<FileSystem>,
    root_fs: Option<FileSystem>,
    usage: &FilesystemUsage,
) -> Result<ResizePlan, ResizeError> {
    if boot_size_sectors == 0 {
        return Err(ResizeError::SizeOutOfRange {
            target_mib: 0,
            min_mib: 1,
            max_mib: disk_sectors * SECTOR_SIZE / MEBIBYTE,
        });
    }

    if !boot_fs.map_or(false, FileSystem::is_fat) {
        warn!("boot partition does not probe as FAT ({:?}); continuing anyway", boot_fs);
    }

    let boot = &table.boot;
    let root = &table.root;
    let new_boot = BlockCoordinates::new(boot.start, boot.start + boot_size_sectors - 1);
    let root_min_safe_sectors = root_min_safe_sectors(usage)?;

    if new_boot.end < root.start {
        // The enlarged boot partition still ends before the root begins, so
        // only the boot entry changes.
        return Ok(ResizePlan {
            new_boot,
            new_root: BlockCoordinates::new(root.start, root.end()),
            needs_move: false,
            needs_shrink: false,
            root_min_safe_sectors,
        });
    }

    // The boot partition runs into the root partition; the root data has to
    // move, and only ext4 roots can be moved safely.
    if root_fs != Some(FileSystem::Ext4) {
        return Err(ResizeError::UnsupportedFilesystem {
            fs: root_fs.map_or_else(|| "unknown".to_owned(), |fs| fs.to_string()),
        });
    }

    let root_new_start = align_up(new_boot.end + 1, PARTITION_ALIGNMENT)?;
    let tentative_end = root_new_start + (root.size - 1);

    if tentative_end < disk_sectors {
        return Ok(ResizePlan {
            new_boot,
            new_root: BlockCoordinates::new(root_new_start, tentative_end),
            needs_move: true,
            needs_shrink: false,
            root_min_safe_sectors,
        });
    }

    // No room at the current size; shrink the root into whatever remains,
    // keeping a buffer before the end of the disk.
    let max_root = disk_sectors.saturating_sub(root_new_start);
    let target = max_root.saturating_sub(ROOT_SHRINK_BUFFER_SECTORS);
    if target < root_min_safe_sectors {
        let needed_mib = root_min_safe_sectors * SECTOR_SIZE / MEBIBYTE;
        let available_mib = target * SECTOR_SIZE / MEBIBYTE;
        return Err(ResizeError::InsufficientSpace {
            needed_mib,
            available_mib,
            shortfall_mib: needed_mib - available_mib,
        });
    }

    Ok(ResizePlan {
        new_boot,
        new_root: BlockCoordinates::new(root_new_start, root_new_start + target - 1),
        needs_move: true,
        needs_shrink: true,
        root_min_safe_sectors,
    })
}

/// Decides whether the root partition should be resized to track an
/// image-level size change: grow into newly available tail space, or
/// shrink to fit a smaller disk.
pub fn plan_tail_adjust(
    table: &PartitionTable,
    disk_sectors: u64,
    change: ImageSizeChange,
    usage: &FilesystemUsage,
) -> Result<Option<TailAdjustment>, ResizeError> {
    let root = &table.root;
    let max_root = disk_sectors.saturating_sub(root.start).saturating_sub(TAIL_RESERVED_SECTORS);

    match change {
        ImageSizeChange::Expanded if max_root > root.size => {
            Ok(Some(TailAdjustment::Grow { size_sectors: max_root }))
        }
        ImageSizeChange::Shrunk if max_root < root.size => {
            let min_safe = root_min_safe_sectors(usage)?;
            if max_root < min_safe {
                let needed_mib = min_safe * SECTOR_SIZE / MEBIBYTE;
                let available_mib = max_root * SECTOR_SIZE / MEBIBYTE;
                return Err(ResizeError::InsufficientSpace {
                    needed_mib,
                    available_mib,
                    shortfall_mib: needed_mib - available_mib,
                });
            }

            Ok(Some(TailAdjustment::Shrink { size_sectors: max_root }))
        }
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use part_types::{ranges_overlap, PartitionEntry};

    const DISK_700_MIB: u64 = 1_433_600;

    fn table(boot_size: u64, root_start: u64, root_size: u64) -> PartitionTable {
        PartitionTable {
            boot: PartitionEntry {
                num: 1,
                start: 8192,
                size: boot_size,
                type_code: "c".into(),
                bootable: true,
            },
            root: PartitionEntry {
                num: 2,
                start: root_start,
                size: root_size,
                type_code: "83".into(),
                bootable: false,
            },
            label_id: None,
        }
    }

    fn usage_mib(used: u64) -> FilesystemUsage {
        FilesystemUsage { used_bytes: used * MEBIBYTE, total_bytes: 512 * MEBIBYTE }
    }

    fn assert_plan_invariants(plan: &ResizePlan, disk_sectors: u64) {
        assert!(!ranges_overlap(
            plan.new_boot.start,
            plan.new_boot.end,
            plan.new_root.start,
            plan.new_root.end
        ));
        assert!(plan.new_boot.end < disk_sectors);
        assert!(plan.new_root.end < disk_sectors);
        assert!(plan.root_min_safe_sectors <= plan.new_root.sectors() || !plan.needs_shrink);
    }

    #[test]
    fn noop_when_boot_already_large_enough() {
        let table = table(131_072, 139_264, 409_600);

        // Same size as today, and a smaller one; neither requires touching
        // the root partition.
        for boot_sectors in &[131_072u64, 65_536] {
            let plan = plan_boot_resize(
                &table,
                *boot_sectors,
                DISK_700_MIB,
                Some(FileSystem::Fat32),
                Some(FileSystem::Ext4),
                &usage_mib(20),
            )
            .unwrap();

            assert!(!plan.needs_move);
            assert!(!plan.needs_shrink);
            assert_eq!(plan.new_root, BlockCoordinates::new(139_264, 548_863));
            assert_plan_invariants(&plan, DISK_700_MIB);
        }
    }

    #[test]
    fn growing_boot_moves_root() {
        let table = table(131_072, 139_264, 409_600);

        // 64 MiB -> 256 MiB with plenty of spare tail: the root slides
        // forward but keeps its size.
        let plan = plan_boot_resize(
            &table,
            524_288,
            DISK_700_MIB,
            Some(FileSystem::Fat32),
            Some(FileSystem::Ext4),
            &usage_mib(20),
        )
        .unwrap();

        assert!(plan.needs_move);
        assert!(!plan.needs_shrink);
        assert_eq!(plan.new_boot, BlockCoordinates::new(8192, 532_479));
        assert_eq!(plan.new_root.start, 532_480);
        assert_eq!(plan.new_root.sectors(), 409_600);
        assert_plan_invariants(&plan, DISK_700_MIB);
    }

    #[test]
    fn relocated_root_start_is_aligned() {
        let table = table(131_072, 139_264, 409_600);

        // An unaligned boot end lands the root on the next 1 MiB boundary.
        let plan = plan_boot_resize(
            &table,
            524_308,
            DISK_700_MIB,
            Some(FileSystem::Fat32),
            Some(FileSystem::Ext4),
            &usage_mib(20),
        )
        .unwrap();

        assert_eq!(plan.new_root.start % PARTITION_ALIGNMENT, 0);
        assert!(plan.new_root.start > plan.new_boot.end);
        assert_plan_invariants(&plan, DISK_700_MIB);
    }

    #[test]
    fn growing_boot_shrinks_oversized_root() {
        // Root fills the image; moving it requires shrinking it first.
        let table = table(131_072, 139_264, 1_294_336);

        let plan = plan_boot_resize(
            &table,
            524_288,
            DISK_700_MIB,
            Some(FileSystem::Fat32),
            Some(FileSystem::Ext4),
            &usage_mib(50),
        )
        .unwrap();

        assert!(plan.needs_move);
        assert!(plan.needs_shrink);
        assert_eq!(plan.new_root.start, 532_480);
        // 700 MiB - 260 MiB for the boot area - 100 MiB buffer.
        assert_eq!(plan.new_root.sectors(), 696_320);
        assert!(plan.new_root.sectors() >= plan.root_min_safe_sectors);
        assert_plan_invariants(&plan, DISK_700_MIB);
    }

    #[test]
    fn refuses_to_move_non_ext4_root() {
        let table = table(131_072, 139_264, 409_600);

        let result = plan_boot_resize(
            &table,
            524_288,
            DISK_700_MIB,
            Some(FileSystem::Fat32),
            Some(FileSystem::Fat32),
            &usage_mib(20),
        );

        match result {
            Err(ResizeError::UnsupportedFilesystem { fs }) => assert_eq!(fs, "fat32"),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn unsatisfiable_boot_size_reports_shortfall() {
        let table = table(131_072, 139_264, 409_600);

        // A 600 MiB boot partition leaves no room for the root at all.
        let result = plan_boot_resize(
            &table,
            1_228_800,
            DISK_700_MIB,
            Some(FileSystem::Fat32),
            Some(FileSystem::Ext4),
            &usage_mib(100),
        );

        match result {
            Err(ResizeError::InsufficientSpace { needed_mib, available_mib, shortfall_mib }) => {
                // 120% of 100 MiB used, plus the fixed 100 MiB of headroom.
                assert_eq!(needed_mib, 220);
                assert_eq!(available_mib, 0);
                assert_eq!(shortfall_mib, 220);
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn min_safe_size_is_monotonic_in_usage() {
        let mut previous = 0;
        for used_mib in &[0u64, 1, 10, 100, 250, 1000, 4096] {
            let min_safe = root_min_safe_sectors(&usage_mib(*used_mib)).unwrap();
            assert!(min_safe >= previous);
            previous = min_safe;
        }
    }

    #[test]
    fn min_safe_size_formula() {
        // 100 MiB used scales to 120 MiB, plus the 100 MiB headroom.
        assert_eq!(root_min_safe_sectors(&usage_mib(100)).unwrap(), 245_760 + 204_800);
        // Zero usage still demands the fixed headroom.
        assert_eq!(
            root_min_safe_sectors(&FilesystemUsage::default()).unwrap(),
            ROOT_SAFETY_SECTORS
        );
    }

    #[test]
    fn tail_grow_after_expansion() {
        let table = table(524_288, 532_480, 409_600);
        let disk = 3_072_000; // 1500 MiB

        let adjust =
            plan_tail_adjust(&table, disk, ImageSizeChange::Expanded, &usage_mib(20)).unwrap();

        assert_eq!(adjust, Some(TailAdjustment::Grow { size_sectors: 2_537_472 }));
    }

    #[test]
    fn tail_noop_when_root_already_fits() {
        // Shrunk image, but the root ends well before the new end.
        let table = table(131_072, 139_264, 409_600);
        let disk = 1_228_800; // 600 MiB

        assert_eq!(
            plan_tail_adjust(&table, disk, ImageSizeChange::Shrunk, &usage_mib(20)).unwrap(),
            None
        );

        // Expanded image with the root already spanning to the tail.
        let table = self::table(131_072, 139_264, 1_228_800 - 139_264 - 2048);
        assert_eq!(
            plan_tail_adjust(&table, disk, ImageSizeChange::Expanded, &usage_mib(20)).unwrap(),
            None
        );
    }

    #[test]
    fn tail_shrink_to_fit() {
        let table = table(131_072, 139_264, 1_294_336);
        let disk = 1_228_800; // 600 MiB

        let adjust =
            plan_tail_adjust(&table, disk, ImageSizeChange::Shrunk, &usage_mib(50)).unwrap();

        assert_eq!(adjust, Some(TailAdjustment::Shrink { size_sectors: 1_087_488 }));
    }

    #[test]
    fn tail_shrink_below_safe_minimum_is_fatal() {
        let table = table(131_072, 139_264, 1_294_336);
        let disk = 1_228_800;

        // 450 MiB used scales past the space remaining after the shrink.
        let result = plan_tail_adjust(&table, disk, ImageSizeChange::Shrunk, &usage_mib(450));

        match result {
            Err(ResizeError::InsufficientSpace { needed_mib, available_mib, shortfall_mib }) => {
                assert_eq!(needed_mib, 640);
                assert_eq!(available_mib, 531);
                assert_eq!(shortfall_mib, 109);
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
