//! Run local `sh -c` commands with optional timeouts, without risking pipe
//! deadlocks.

use std::io::{Read, Write};
use std::process::{Command, Stdio};
use std::thread;
use std::time::Duration;

use tracing::{debug, error, instrument, warn};
use wait_timeout::ChildExt;

use crate::core::types::CommandResult;
use crate::error::{DeployError, Result};

/// Exit code reported when a command is killed for exceeding its timeout
/// (same convention as coreutils `timeout`).
pub const TIMED_OUT_EXIT_CODE: i32 = 124;

/// Run `script` with `sh -c`, feeding `stdin` if given.
///
/// Output is read concurrently while the child runs. With a timeout, a child
/// still running when it expires is killed and reported with
/// [`TIMED_OUT_EXIT_CODE`]. A child killed by a signal reports `-1`.
#[instrument(skip_all, fields(timeout_secs = timeout.map(|t| t.as_secs())))]
pub fn run_shell(
    script: &str,
    stdin: Option<&[u8]>,
    timeout: Option<Duration>,
) -> Result<CommandResult> {
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(script);
    if stdin.is_some() {
        cmd.stdin(Stdio::piped());
    } else {
        cmd.stdin(Stdio::null());
    }
    cmd.stdout(Stdio::piped()).stderr(Stdio::piped());

    debug!("spawning child process");
    let mut child = match cmd.spawn() {
        Ok(c) => c,
        Err(e) => {
            error!(err = %e, "failed to spawn command");
            return Err(DeployError::io("spawn sh", e));
        }
    };

    let stdout = child.stdout.take().map(|out| thread::spawn(move || drain(out)));
    let stderr = child.stderr.take().map(|err| thread::spawn(move || drain(err)));
    // Dropping the handle closes the pipe so the child sees EOF.
    let feeder = match (stdin, child.stdin.take()) {
        (Some(input), Some(mut child_stdin)) => {
            let input = input.to_vec();
            Some(thread::spawn(move || child_stdin.write_all(&input)))
        }
        _ => None,
    };

    let mut timed_out = false;
    let status = match timeout {
        Some(limit) => match child
            .wait_timeout(limit)
            .map_err(|e| DeployError::io("wait for command", e))?
        {
            Some(status) => status,
            None => {
                warn!(timeout_secs = limit.as_secs(), "command timed out, killing");
                timed_out = true;
                child
                    .kill()
                    .map_err(|e| DeployError::io("kill command", e))?;
                child
                    .wait()
                    .map_err(|e| DeployError::io("wait command after kill", e))?
            }
        },
        None => child
            .wait()
            .map_err(|e| DeployError::io("wait for command", e))?,
    };

    if let Some(feeder) = feeder {
        // The exit status takes precedence over a stdin pipe the child closed.
        match feeder.join() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(err = %e, "child did not consume all of stdin"),
            Err(_) => warn!("stdin writer thread panicked"),
        }
    }

    let stdout = join_output(stdout)?;
    let mut stderr = join_output(stderr)?;
    let exit_code = if timed_out {
        stderr.push_str("\n[command timed out]\n");
        TIMED_OUT_EXIT_CODE
    } else {
        status.code().unwrap_or(-1)
    };

    debug!(exit_code, timed_out, "command finished");
    Ok(CommandResult {
        stdout,
        stderr,
        exit_code,
    })
}

fn join_output(handle: Option<thread::JoinHandle<std::io::Result<String>>>) -> Result<String> {
    let Some(handle) = handle else {
        return Ok(String::new());
    };
    match handle.join() {
        Ok(result) => result.map_err(|e| DeployError::io("read command output", e)),
        Err(_) => Err(DeployError::io(
            "read command output",
            std::io::Error::other("output reader thread panicked"),
        )),
    }
}

fn drain<R: Read>(mut reader: R) -> std::io::Result<String> {
    let mut buf = Vec::new();
    reader.read_to_end(&mut buf)?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}
