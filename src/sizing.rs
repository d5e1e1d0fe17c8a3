use crate::errors::ResizeError;
use part_types::{sectors_to_bytes, PartitionTable, SizeSpec, MEBIBYTE, TEBIBYTE};

/// Bounds on the overall image size a resize may target.
pub const IMAGE_SIZE_MIN: u64 = 100 * MEBIBYTE;
pub const IMAGE_SIZE_MAX: u64 = 10 * TEBIBYTE;

/// Fixed margin kept between the end of the last partition and the end of
/// a shrunk image (10 MiB of 512-byte sectors).
pub const SHRINK_MARGIN_SECTORS: u64 = 20_480;

/// The decision on what to do with the image file itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeAdjustment {
    Unchanged,
    Expand { bytes: u64 },
    Shrink { bytes: u64 },
}

/// Decides whether an image must grow, shrink, or stay as it is to reach
/// the requested size.
///
/// This validates only; the caller performs the actual truncation as a
/// single `set_len` using the returned byte count. Shrinking is refused
/// outright when the target would cut into a partition or the margin kept
/// beyond the last one.
pub fn plan_image_size(
    current_bytes: u64,
    target: SizeSpec,
    table: &PartitionTable,
) -> Result<SizeAdjustment, ResizeError> {
    let target_bytes = target.as_bytes();
    if target_bytes < IMAGE_SIZE_MIN || target_bytes > IMAGE_SIZE_MAX {
        return Err(ResizeError::SizeOutOfRange {
            target_mib: target_bytes / MEBIBYTE,
            min_mib: IMAGE_SIZE_MIN / MEBIBYTE,
            max_mib: IMAGE_SIZE_MAX / MEBIBYTE,
        });
    }

    if target_bytes == current_bytes {
        return Ok(SizeAdjustment::Unchanged);
    }

    if target_bytes > current_bytes {
        return Ok(SizeAdjustment::Expand { bytes: target_bytes });
    }

    let occupied = table.last_used_sector() + 1;
    let floor_bytes = sectors_to_bytes(occupied + SHRINK_MARGIN_SECTORS)?;
    if target_bytes < floor_bytes {
        return Err(ResizeError::ShrinkBelowPartitionBoundary {
            target_mib: target_bytes / MEBIBYTE,
            floor_mib: sectors_to_bytes(occupied)? / MEBIBYTE,
            margin_mib: sectors_to_bytes(SHRINK_MARGIN_SECTORS)? / MEBIBYTE,
        });
    }

    Ok(SizeAdjustment::Shrink { bytes: target_bytes })
}

/// Confirms that the host filesystem backing an image has room for the
/// requested expansion.
pub fn ensure_host_space(
    available_bytes: u64,
    current_bytes: u64,
    target_bytes: u64,
) -> Result<(), ResizeError> {
    let growth = target_bytes.saturating_sub(current_bytes);
    if available_bytes < growth {
        return Err(ResizeError::InsufficientHostSpace {
            needed_mib: growth / MEBIBYTE,
            available_mib: available_bytes / MEBIBYTE,
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use part_types::PartitionEntry;

    fn table(root_start: u64, root_size: u64) -> PartitionTable {
        PartitionTable {
            boot: PartitionEntry {
                num: 1,
                start: 8192,
                size: 131_072,
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

    #[test]
    fn noop_when_size_matches() {
        let table = table(139_264, 409_600);
        let current = 700 * MEBIBYTE;
        let target = "700M".parse::<SizeSpec>().unwrap();
        assert_eq!(plan_image_size(current, target, &table).unwrap(), SizeAdjustment::Unchanged);
    }

    #[test]
    fn expansion() {
        let table = table(139_264, 409_600);
        let target = "2G".parse::<SizeSpec>().unwrap();
        assert_eq!(
            plan_image_size(700 * MEBIBYTE, target, &table).unwrap(),
            SizeAdjustment::Expand { bytes: 2048 * MEBIBYTE }
        );
    }

    #[test]
    fn shrink_respects_partition_margin() {
        // Root ends at sector 1_126_399 (550 MiB); with the 10 MiB margin
        // the smallest permitted image is 560 MiB.
        let table = table(139_264, 987_136);

        let ok = "560M".parse::<SizeSpec>().unwrap();
        assert_eq!(
            plan_image_size(700 * MEBIBYTE, ok, &table).unwrap(),
            SizeAdjustment::Shrink { bytes: 560 * MEBIBYTE }
        );

        let too_small = "559M".parse::<SizeSpec>().unwrap();
        match plan_image_size(700 * MEBIBYTE, too_small, &table) {
            Err(ResizeError::ShrinkBelowPartitionBoundary { target_mib, floor_mib, margin_mib }) => {
                assert_eq!(target_mib, 559);
                assert_eq!(floor_mib, 550);
                assert_eq!(margin_mib, 10);
            }
            other => panic!("unexpected result: {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn rejects_sizes_outside_bounds() {
        let table = table(139_264, 409_600);

        let tiny = "99M".parse::<SizeSpec>().unwrap();
        assert!(matches!(
            plan_image_size(700 * MEBIBYTE, tiny, &table),
            Err(ResizeError::SizeOutOfRange { .. })
        ));

        let huge = "11T".parse::<SizeSpec>().unwrap();
        assert!(matches!(
            plan_image_size(700 * MEBIBYTE, huge, &table),
            Err(ResizeError::SizeOutOfRange { .. })
        ));
    }

    #[test]
    fn host_space_check() {
        assert!(ensure_host_space(2048 * MEBIBYTE, 700 * MEBIBYTE, 1500 * MEBIBYTE).is_ok());
        match ensure_host_space(500 * MEBIBYTE, 700 * MEBIBYTE, 1500 * MEBIBYTE) {
            Err(ResizeError::InsufficientHostSpace { needed_mib, available_mib }) => {
                assert_eq!(needed_mib, 800);
                assert_eq!(available_mib, 500);
            }
            other => panic!("unexpected result: {:?}", other.map(|_| ())),
        }
    }
}
