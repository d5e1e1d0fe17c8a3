use super::OffsetCoordinates;
use part_types::ranges_overlap;
use std::{
    error::Error,
    fmt,
    fs::OpenOptions,
    io::{self, Read, Seek, SeekFrom, Write},
    path::Path,
};

/// Sectors per chunk when source and destination ranges intersect. Kept to
/// a few hundred sectors so the copy window never outruns the unread
/// region.
pub const OVERLAP_CHUNK_SECTORS: u64 = 512;

/// Sectors per chunk for disjoint copies, sized for throughput (8 MiB at
/// 512-byte sectors).
pub const BULK_CHUNK_SECTORS: u64 = 16_384;

/// A failed sector copy during partition relocation.
///
/// The partition table has not been rewritten when this is raised, so the
/// on-disk table still describes the original, valid data placement.
#[derive(Debug)]
pub struct RelocationError {
    pub sector: u64,
    pub why: io::Error,
}

impl fmt::Display for RelocationError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "relocation failed at sector {}: {}", self.sector, self.why)
    }
}

impl Error for RelocationError {
    fn source(&self) -> Option<&(dyn Error + 'static)> { Some(&self.why) }
}

/// Performs direct reads & writes on the disk to shift a partition's data,
/// using the supplied offset coordinates to determine where the data is and
/// where it should go.
///
/// The copy direction is chosen from whether the two ranges overlap: a
/// disjoint pair is streamed start-to-end in large blocks, while an
/// overlapping forward move is copied chunk-by-chunk from the tail toward
/// the head, so that no chunk is overwritten before it has been read. The
/// length must already be the final (possibly shrunk) partition size.
///
/// `progress` is invoked after each chunk with `(copied, total)` sector
/// counts.
pub fn move_partition<P: AsRef<Path>, F: FnMut(u64, u64)>(
    path: P,
    coords: OffsetCoordinates,
    bs: u64,
    mut progress: F,
) -> Result<(), RelocationError> {
    if coords.length == 0 || coords.offset == 0 {
        return Ok(());
    }

    info!(
        "moving partition data on {} with {} sector size: {{ skip: {}; offset: {}; length: {} }}",
        path.as_ref().display(),
        bs,
        coords.skip,
        coords.offset,
        coords.length
    );

    let src_start = coords.skip;
    let dst_start = (src_start as i64 + coords.offset) as u64;
    let src_end = src_start + coords.length - 1;
    let dst_end = dst_start + coords.length - 1;

    let overlap = ranges_overlap(src_start, src_end, dst_start, dst_end);
    let backward = overlap && coords.offset > 0;
    let chunk_sectors = if overlap { OVERLAP_CHUNK_SECTORS } else { BULK_CHUNK_SECTORS };

    debug!(
        "copy strategy: {}",
        if backward {
            "backward chunked (overlapping)"
        } else if overlap {
            "forward chunked (overlapping)"
        } else {
            "forward bulk"
        }
    );

    let mut disk = OpenOptions::new()
        .read(true)
        .write(true)
        .open(&path)
        .map_err(|why| RelocationError { sector: src_start, why })?;

    let mut buffer = vec![0; (chunk_sectors * bs) as usize];
    let total = coords.length;
    let mut copied = 0;

    while copied < total {
        let chunk = chunk_sectors.min(total - copied);
        let chunk_offset = if backward { total - copied - chunk } else { copied };
        let src = src_start + chunk_offset;
        let dst = dst_start + chunk_offset;

        copy_chunk(&mut disk, src, dst, chunk, bs, &mut buffer)
            .map_err(|why| RelocationError { sector: src, why })?;

        copied += chunk;
        progress(copied, total);
    }

    disk.sync_all().map_err(|why| RelocationError { sector: src_end, why })
}

fn copy_chunk(
    disk: &mut std::fs::File,
    src: u64,
    dst: u64,
    sectors: u64,
    bs: u64,
    buffer: &mut [u8],
) -> io::Result<()> {
    let bytes = (sectors * bs) as usize;

    disk.seek(SeekFrom::Start(src * bs))?;
    disk.read_exact(&mut buffer[..bytes])?;

    disk.seek(SeekFrom::Start(dst * bs))?;
    disk.write_all(&buffer[..bytes])
}
