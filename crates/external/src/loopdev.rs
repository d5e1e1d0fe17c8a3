use super::{blockdev, exec, exec_capture};
use crate::retry::Retry;
use std::{
    io,
    path::{Path, PathBuf},
};

/// Attaches an image file to the first free loop device, scanning for
/// partitions, and returns the device path.
pub fn losetup_attach<P: AsRef<Path>>(image: P) -> io::Result<PathBuf> {
    let output = exec_capture(
        "losetup",
        &["--show".into(), "-f".into(), "-P".into(), image.as_ref().into()],
    )?;

    let device = output.trim();
    if device.is_empty() {
        return Err(io::Error::new(io::ErrorKind::NotFound, "losetup did not report a device"));
    }

    info!("attached {} to {}", image.as_ref().display(), device);
    Ok(PathBuf::from(device))
}

/// Detaches a loop device.
pub fn losetup_detach<P: AsRef<Path>>(device: P) -> io::Result<()> {
    exec("losetup", None, None, &["-d".into(), device.as_ref().into()])
}

/// Forces the kernel to re-read a device's partition table after it has
/// been rewritten, so that the partition sub-devices reflect the new
/// layout.
pub fn reread_partitions<P: AsRef<Path>>(device: P) -> io::Result<()> {
    exec("partprobe", None, None, &[device.as_ref().into()])?;
    Retry::default().attempts(3).delay_ms(1000).run(|| blockdev(&device, &["--flushbufs"]))
}

/// The path of the `num`th partition of a device. Devices whose names end
/// in a digit (loop0, nvme0n1) use a `p` separator.
pub fn partition_device<P: AsRef<Path>>(device: P, num: u32) -> PathBuf {
    let base = device.as_ref().to_string_lossy();
    let path = if base.ends_with(|c: char| c.is_ascii_digit()) {
        format!("{}p{}", base, num)
    } else {
        format!("{}{}", base, num)
    };

    PathBuf::from(path)
}
