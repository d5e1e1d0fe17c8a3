//! A collection of external commands used throughout the program.

#[macro_use]
extern crate log;
#[macro_use]
extern crate smart_default;

pub mod block;
pub mod bootfiles;
pub mod host;
pub mod loopdev;
pub mod sfdisk;
pub mod usage;
pub(crate) mod retry;

pub use self::{block::*, bootfiles::*, host::*, loopdev::*, sfdisk::*, usage::*};

use std::{
    ffi::OsString,
    io::{self, Write},
    process::{Command, Stdio},
};

/// A generic function for executing a variety of external commands.
///
/// Exit codes listed in `valid_codes` are treated as success. Stderr is
/// captured and folded into the error message so that toolchain failures
/// reach the caller verbatim.
pub fn exec(
    cmd: &str,
    stdin: Option<&[u8]>,
    valid_codes: Option<&'static [i32]>,
    args: &[OsString],
) -> io::Result<()> {
    info!("executing {} with {:?}", cmd, args);

    let mut child = Command::new(cmd)
        .args(args)
        .stdin(if stdin.is_some() { Stdio::piped() } else { Stdio::null() })
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()?;

    if let Some(stdin) = stdin {
        child.stdin.as_mut().expect("stdin not obtained").write_all(stdin)?;
    }

    let output = child.wait_with_output()?;
    let success = output.status.success()
        || valid_codes.map_or(false, |codes| {
            output.status.code().map_or(false, |code| codes.contains(&code))
        });

    if success {
        Ok(())
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr);
        Err(io::Error::new(
            io::ErrorKind::Other,
            format!(
                "{} failed with status: {}: {}",
                cmd,
                match output.status.code() {
                    Some(code) => code.to_string(),
                    None => "unknown".into(),
                },
                stderr.trim()
            ),
        ))
    }
}

/// Executes a command and returns its standard output as a string.
pub fn exec_capture(cmd: &str, args: &[OsString]) -> io::Result<String> {
    info!("executing {} with {:?}", cmd, args);

    let output = Command::new(cmd)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()?;

    if output.status.success() {
        String::from_utf8(output.stdout)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "non-UTF8 command output"))
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr);
        Err(io::Error::new(io::ErrorKind::Other, format!("{} failed: {}", cmd, stderr.trim())))
    }
}
