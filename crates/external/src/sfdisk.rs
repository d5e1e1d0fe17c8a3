use super::{exec, exec_capture};
use std::{io, path::Path};

/// Reads the partition table of a device (or image file) as an sfdisk
/// sector-unit dump.
pub fn dump_partition_table<P: AsRef<Path>>(device: P) -> io::Result<String> {
    exec_capture("sfdisk", &["--dump".into(), device.as_ref().into()])
}

/// Replaces the partition table of a device with the given sfdisk input
/// script. The caller is responsible for re-reading device mappings
/// afterwards; the kernel's view is stale until then.
pub fn write_partition_table<P: AsRef<Path>>(device: P, script: &str) -> io::Result<()> {
    info!("writing partition table to {}:\n{}", device.as_ref().display(), script.trim_end());
    exec("sfdisk", Some(script.as_bytes()), None, &["--quiet".into(), device.as_ref().into()])
}
