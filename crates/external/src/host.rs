use std::{ffi::CString, io, mem, os::unix::ffi::OsStrExt, path::Path};

/// Free space, in bytes, available to unprivileged writes on the filesystem
/// containing `path`.
pub fn host_free_space<P: AsRef<Path>>(path: P) -> io::Result<u64> {
    let path = CString::new(path.as_ref().as_os_str().as_bytes())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "path contains a NUL byte"))?;

    let mut stats: libc::statvfs = unsafe { mem::zeroed() };
    if unsafe { libc::statvfs(path.as_ptr(), &mut stats) } != 0 {
        return Err(io::Error::last_os_error());
    }

    Ok(stats.f_bavail as u64 * stats.f_frsize as u64)
}
