/// The size of each logical sector, in bytes. Partition tables handled by
/// this crate are always expressed in 512-byte units.
pub const SECTOR_SIZE: u64 = 512;

/// Partition starts are aligned to this many sectors (1 MiB).
pub const PARTITION_ALIGNMENT: u64 = 2048;

pub const MEBIBYTE: u64 = 1_048_576;
pub const GIBIBYTE: u64 = MEBIBYTE * 1024;
pub const TEBIBYTE: u64 = GIBIBYTE * 1024;

/// Raised when a byte or sector quantity cannot be represented.
#[derive(Debug, Fail, PartialEq, Eq, Clone, Copy)]
pub enum SectorError {
    #[fail(display = "arithmetic overflow on sector value {}", value)]
    ArithmeticOverflow { value: u64 },
}

/// Converts a byte count into the number of sectors required to hold it,
/// rounding up to a whole sector.
pub fn bytes_to_sectors(bytes: u64) -> Result<u64, SectorError> {
    bytes
        .checked_add(SECTOR_SIZE - 1)
        .map(|padded| padded / SECTOR_SIZE)
        .ok_or(SectorError::ArithmeticOverflow { value: bytes })
}

/// Converts a sector count into bytes.
pub fn sectors_to_bytes(sectors: u64) -> Result<u64, SectorError> {
    sectors
        .checked_mul(SECTOR_SIZE)
        .ok_or(SectorError::ArithmeticOverflow { value: sectors })
}

/// Rounds a sector up to the next multiple of `alignment`.
pub fn align_up(sector: u64, alignment: u64) -> Result<u64, SectorError> {
    debug_assert_ne!(alignment, 0);
    sector
        .checked_add(alignment - 1)
        .map(|padded| padded - padded % alignment)
        .ok_or(SectorError::ArithmeticOverflow { value: sector })
}

/// Whether the inclusive sector ranges `[a_start, a_end]` and
/// `[b_start, b_end]` intersect.
pub fn ranges_overlap(a_start: u64, a_end: u64, b_start: u64, b_end: u64) -> bool {
    a_start <= b_end && b_start <= a_end
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_sector_conversion() {
        assert_eq!(bytes_to_sectors(0), Ok(0));
        assert_eq!(bytes_to_sectors(1), Ok(1));
        assert_eq!(bytes_to_sectors(512), Ok(1));
        assert_eq!(bytes_to_sectors(513), Ok(2));
        assert_eq!(bytes_to_sectors(MEBIBYTE), Ok(2048));
        assert_eq!(sectors_to_bytes(2048), Ok(MEBIBYTE));
    }

    #[test]
    fn conversion_overflow() {
        assert_eq!(
            bytes_to_sectors(u64::max_value()),
            Err(SectorError::ArithmeticOverflow { value: u64::max_value() })
        );
        assert_eq!(
            sectors_to_bytes(u64::max_value() / 2),
            Err(SectorError::ArithmeticOverflow { value: u64::max_value() / 2 })
        );
    }

    #[test]
    fn alignment() {
        assert_eq!(align_up(0, PARTITION_ALIGNMENT), Ok(0));
        assert_eq!(align_up(1, PARTITION_ALIGNMENT), Ok(2048));
        assert_eq!(align_up(2048, PARTITION_ALIGNMENT), Ok(2048));
        assert_eq!(align_up(2049, PARTITION_ALIGNMENT), Ok(4096));
        assert_eq!(align_up(532_481, PARTITION_ALIGNMENT), Ok(534_528));
    }

    #[test]
    fn overlap() {
        assert!(ranges_overlap(0, 10, 10, 20));
        assert!(ranges_overlap(10, 20, 0, 10));
        assert!(ranges_overlap(5, 30, 10, 20));
        assert!(!ranges_overlap(0, 9, 10, 20));
        assert!(!ranges_overlap(21, 30, 10, 20));
    }
}
