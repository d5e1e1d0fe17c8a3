use super::{exec, exec_capture};
use crate::retry::Retry;
use part_types::FileSystem;
use std::{
    ffi::{OsStr, OsString},
    io,
    path::Path,
    process::{Command, Stdio},
};

/// e2fsck exit codes up to this value mean "errors were corrected"; anything
/// above is a real failure.
const FSCK_CORRECTED_CODES: &[i32] = &[1, 2];
const FSCK_FAT_CORRECTED_CODES: &[i32] = &[1];

/// Utilized for ensuring that block & partition information has synced with
/// the OS.
pub fn blockdev<P: AsRef<Path>, S: AsRef<OsStr>, I: IntoIterator<Item = S>>(
    disk: P,
    args: I,
) -> io::Result<()> {
    exec("blockdev", None, None, &{
        let mut args = args.into_iter().map(|x| x.as_ref().into()).collect::<Vec<OsString>>();
        args.push(disk.as_ref().into());
        args
    })
}

/// The total number of 512-byte sectors on a block device, via
/// `blockdev --getsz`.
pub fn disk_sectors<P: AsRef<Path>>(disk: P) -> io::Result<u64> {
    let output = exec_capture("blockdev", &["--getsz".into(), disk.as_ref().into()])?;
    output
        .trim()
        .parse::<u64>()
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "invalid blockdev sector count"))
}

/// Checks & corrects errors on a partition that has been moved or resized.
///
/// Exit codes meaning "errors were found and fixed" are accepted; anything
/// beyond that is surfaced as a failure.
pub fn fsck<P: AsRef<Path>>(part: P, fs: FileSystem) -> io::Result<()> {
    let (cmd, arg, codes): (&str, &str, &'static [i32]) = if fs.is_fat() {
        ("fsck.fat", "-a", FSCK_FAT_CORRECTED_CODES)
    } else {
        ("e2fsck", "-f -p", FSCK_CORRECTED_CODES)
    };

    Retry::default().run(move || {
        let mut args: Vec<OsString> = arg.split_whitespace().map(Into::into).collect();
        args.push(part.as_ref().into());
        exec(cmd, None, Some(codes), &args)
    })
}

/// Resizes an extended filesystem to the given number of 512-byte sectors,
/// or to the size of its partition when no size is given.
pub fn resize2fs<P: AsRef<Path>>(part: P, size_sectors: Option<u64>) -> io::Result<()> {
    let mut args: Vec<OsString> = vec![part.as_ref().into()];
    if let Some(sectors) = size_sectors {
        args.push(format!("{}s", sectors).into());
    }

    exec("resize2fs", None, None, &args)
}

/// Creates a fresh FAT32 filesystem on the given partition, optionally
/// applying a volume label.
pub fn mkfs_fat32<P: AsRef<Path>>(part: P, label: Option<&str>) -> io::Result<()> {
    let mut args: Vec<OsString> = vec!["-F".into(), "32".into()];
    if let Some(label) = label {
        args.push("-n".into());
        args.push(label.into());
    }
    args.push(part.as_ref().into());

    exec("mkfs.fat", None, None, &args)
}

/// Obtains the file system on a partition via blkid.
pub fn blkid_partition<P: AsRef<Path>>(part: P) -> Option<FileSystem> {
    let output = Command::new("blkid")
        .arg(part.as_ref())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .output()
        .ok()?
        .stdout;

    for field in String::from_utf8_lossy(&output).split_whitespace() {
        if field.starts_with("TYPE=") {
            let length = field.len();
            return if length > 7 { field[6..length - 1].parse::<FileSystem>().ok() } else { None };
        }
    }

    None
}

/// Get the volume label from the given partition, if it exists.
pub fn partition_label<P: AsRef<Path>>(part: P) -> Option<String> {
    let output = Command::new("blkid")
        .args(&["-s", "LABEL", "-o", "value"])
        .arg(part.as_ref())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .output()
        .ok()?
        .stdout;

    let label = String::from_utf8_lossy(&output).trim_end().to_owned();
    if label.is_empty() {
        None
    } else {
        Some(label)
    }
}
