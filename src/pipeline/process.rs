//! Running external programs with captured output.
//!
//! LibreOffice and Ghostscript are opaque collaborators: we hand them an
//! argument vector (never a shell string, so file names with spaces or quotes
//! are safe) and classify how they ended.
//!
//! | How the child ended          | Result                               |
//! |------------------------------|--------------------------------------|
//! | exit code 0                  | `Ok(output)`                         |
//! | exit code ≠ 0                | [`Sheet2PdfError::ProcessFailed`]    |
//! | killed by SIGINT             | [`Sheet2PdfError::Cancelled`]        |
//! | killed by any other signal   | [`Sheet2PdfError::ProcessCrashed`]   |
//! | could not be started         | [`Sheet2PdfError::ProcessSpawn`]     |
//!
//! Children are spawned with `kill_on_drop`, so dropping the batch future on
//! Ctrl-C also stops a running conversion.

use crate::error::Sheet2PdfError;
use std::ffi::OsString;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use tokio::process::Command;
use tracing::debug;

/// Run `program` with `args`, returning combined stdout + stderr on success.
pub async fn run_captured(program: &Path, args: &[OsString]) -> Result<String, Sheet2PdfError> {
    let shown = program.display().to_string();
    debug!("Running {} {:?}", shown, args);

    let output = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|source| Sheet2PdfError::ProcessSpawn {
            program: shown.clone(),
            source,
        })?;

    let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
    combined.push_str(&String::from_utf8_lossy(&output.stderr));

    classify_exit(shown, output.status, combined)
}

fn classify_exit(
    program: String,
    status: ExitStatus,
    output: String,
) -> Result<String, Sheet2PdfError> {
    if status.success() {
        return Ok(output);
    }
    if let Some(signal) = termination_signal(&status) {
        if is_interrupt(signal) {
            return Err(Sheet2PdfError::Cancelled);
        }
        return Err(Sheet2PdfError::ProcessCrashed {
            program,
            signal,
            output,
        });
    }
    Err(Sheet2PdfError::ProcessFailed {
        program,
        code: status.code().unwrap_or(-1),
        output,
    })
}

#[cfg(unix)]
fn termination_signal(status: &ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

#[cfg(not(unix))]
fn termination_signal(_status: &ExitStatus) -> Option<i32> {
    None
}

#[cfg(unix)]
fn is_interrupt(signal: i32) -> bool {
    signal == libc::SIGINT
}

#[cfg(not(unix))]
fn is_interrupt(_signal: i32) -> bool {
    false
}
