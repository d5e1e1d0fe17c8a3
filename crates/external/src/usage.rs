use part_types::FilesystemUsage;
use std::{
    io::{self, BufRead, Cursor},
    path::Path,
    process::{Command, Stdio},
};

/// Queries used and total bytes on an extended filesystem by reading the
/// superblock summary from `dumpe2fs -h`.
pub fn ext_usage<P: AsRef<Path>>(part: P) -> io::Result<FilesystemUsage> {
    let reader = Cursor::new(
        Command::new("dumpe2fs")
            .arg("-h")
            .arg(part.as_ref())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .output()?
            .stdout,
    );

    parse_ext_usage(reader.lines().skip(1))
}

fn parse_ext_usage<R: Iterator<Item = io::Result<String>>>(
    mut reader: R,
) -> io::Result<FilesystemUsage> {
    let total_blocks = parse_field(&mut reader, "Block count:")?;
    let free_blocks = parse_field(&mut reader, "Free blocks:")?;
    let block_size = parse_field(&mut reader, "Block size:")?;

    Ok(FilesystemUsage {
        used_bytes: (total_blocks - free_blocks) * block_size,
        total_bytes: total_blocks * block_size,
    })
}

fn parse_field<R: Iterator<Item = io::Result<String>>>(
    reader: &mut R,
    field: &str,
) -> io::Result<u64> {
    for line in reader {
        let line = line?;
        if line.starts_with(field) {
            match line[field.len()..].split_whitespace().next().map(|v| v.parse::<u64>()) {
                Some(Ok(value)) => return Ok(value),
                _ => return Err(io::Error::new(io::ErrorKind::Other, "invalid dump field")),
            }
        }
    }

    Err(io::Error::new(io::ErrorKind::Other, "invalid dump output: EOF"))
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXT_INPUT: &str = r#"dumpe2fs 1.46.5 (30-Dec-2021)
Filesystem volume name:   rootfs
Last mounted on:          /
Filesystem UUID:          21f6a63c-0913-47d2-89ec-46193b3503bd
Filesystem magic number:  0xEF53
Filesystem revision #:    1 (dynamic)
Filesystem features:      has_journal ext_attr resize_inode dir_index filetype extent 64bit flex_bg sparse_super large_file huge_file dir_nlink extra_isize metadata_csum
Filesystem flags:         unsigned_directory_hash
Default mount options:    user_xattr acl
Filesystem state:         clean
Errors behavior:          Continue
Filesystem OS type:       Linux
Inode count:              80896
Block count:              323584
Reserved block count:     16179
Free blocks:              291022
Free inodes:              67210
First block:              0
Block size:               4096
Fragment size:            4096
Group descriptor size:    64
Reserved GDT blocks:      157
Blocks per group:         32768
Fragments per group:      32768
Inodes per group:         8090
Inode blocks per group:   506
Flex block group size:    16
Filesystem created:       Thu May  5 10:06:52 2022
Last mount time:          Mon Aug  1 07:41:19 2022
Last write time:          Mon Aug  1 07:41:19 2022
Mount count:              12
Maximum mount count:      -1
Journal inode:            8
Default directory hash:   half_md4
Journal backup:           inode blocks
Checksum type:            crc32c
Checksum:                 0x3c1fd897
"#;

    #[test]
    fn ext_usage_from_dump() {
        let usage = parse_ext_usage(EXT_INPUT.lines().map(|x| Ok(x.into()))).unwrap();
        assert_eq!(usage.total_bytes, 323_584 * 4096);
        assert_eq!(usage.used_bytes, (323_584 - 291_022) * 4096);
    }

    #[test]
    fn field_parsing() {
        let mut reader = EXT_INPUT.lines().map(|x| Ok(x.into()));
        assert_eq!(parse_field(&mut reader, "Block count:").unwrap(), 323_584);
        assert_eq!(parse_field(&mut reader, "Free blocks:").unwrap(), 291_022);
    }

    #[test]
    fn missing_field() {
        let mut reader = "no such field\n".lines().map(|x| Ok(x.into()));
        assert!(parse_field(&mut reader, "Block count:").is_err());
    }
}
