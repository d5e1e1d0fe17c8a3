use super::exec;
use std::{io, path::Path};
use tempdir::TempDir;

/// Mounts a partition on a temporary directory for the duration of `action`.
/// The partition is unmounted before this returns, even if the action
/// failed.
fn with_mount<T, F: FnOnce(&Path) -> io::Result<T>>(part: &Path, action: F) -> io::Result<T> {
    let target = TempDir::new("imgresize-mnt")?;
    info!("temporarily mounting {} at {}", part.display(), target.path().display());
    exec("mount", None, None, &[part.into(), target.path().into()])?;

    let result = action(target.path());
    let unmounted = exec("umount", None, None, &[target.path().into()]);

    match (result, unmounted) {
        (Err(why), _) => Err(why),
        (Ok(_), Err(why)) => Err(why),
        (Ok(value), Ok(())) => Ok(value),
    }
}

/// Copies the contents of the boot partition into a staging directory
/// before the filesystem is recreated.
pub fn backup_boot_files(part: &Path, stash: &Path) -> io::Result<()> {
    with_mount(part, |mountpoint| copy_contents(mountpoint, stash))
}

/// Restores previously staged boot files onto a freshly formatted boot
/// partition.
pub fn restore_boot_files(stash: &Path, part: &Path) -> io::Result<()> {
    with_mount(part, |mountpoint| copy_contents(stash, mountpoint))
}

fn copy_contents(source: &Path, target: &Path) -> io::Result<()> {
    exec(
        "cp",
        None,
        None,
        &["-a".into(), format!("{}/.", source.display()).into(), target.into()],
    )
}
