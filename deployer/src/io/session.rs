//! The remote session contract every operation runs through.
//!
//! A session is one serial command channel to one host. Implementations only
//! move bytes and report exit codes; the failure policy (which non-zero exits
//! are errors) lives in [`RemoteSession::run`].

use std::path::Path;

use tracing::{debug, warn};

use crate::core::shell;
pub use crate::core::types::CommandResult;
use crate::error::{DeployError, Result};

/// Per-command execution options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Run through `sudo`.
    pub elevated: bool,
    /// Return non-zero exits as results instead of `RemoteCommandFailed`.
    pub allow_failure: bool,
}

impl RunOptions {
    /// Unprivileged; non-zero exit is an error.
    pub const CHECKED: Self = Self {
        elevated: false,
        allow_failure: false,
    };
    /// Unprivileged; non-zero exit is returned to the caller.
    pub const PROBE: Self = Self {
        elevated: false,
        allow_failure: true,
    };
    /// Privileged; non-zero exit is an error.
    pub const ELEVATED: Self = Self {
        elevated: true,
        allow_failure: false,
    };
    /// Privileged; non-zero exit is returned to the caller.
    pub const ELEVATED_PROBE: Self = Self {
        elevated: true,
        allow_failure: true,
    };
}

/// Authenticated command and file-transfer channel to a single host.
///
/// Not safe for concurrent use: callers issue one command at a time.
pub trait RemoteSession {
    /// Run `command` through the remote shell and capture its output.
    ///
    /// A non-zero exit status is reported in the result, not as an error;
    /// errors are reserved for transport failures.
    fn exec(&self, command: &str, elevated: bool) -> Result<CommandResult>;

    /// Copy a local file to an absolute remote path, overwriting it. The remote
    /// parent directory must already exist.
    fn put_file(&self, local: &Path, remote: &str) -> Result<()>;

    /// Run `command` and apply the failure policy from `options`.
    fn run(&self, command: &str, options: RunOptions) -> Result<CommandResult> {
        debug!(command, elevated = options.elevated, "running remote command");
        let result = self.exec(command, options.elevated)?;
        if !result.success() {
            if options.allow_failure {
                debug!(command, exit_code = result.exit_code, "tolerated non-zero exit");
            } else {
                warn!(command, exit_code = result.exit_code, "remote command failed");
                return Err(DeployError::RemoteCommandFailed {
                    command: command.to_string(),
                    exit_code: result.exit_code,
                    stderr: result.stderr.trim().to_string(),
                });
            }
        }
        Ok(result)
    }
}

/// Wrap `command` for privileged execution.
///
/// With a password the command reads it from stdin (`sudo -S`); the returned
/// stdin payload must be written before reading output. Without one, sudo runs
/// non-interactively and fails fast if a password would be required.
pub fn elevate(command: &str, sudo_password: Option<&str>) -> (String, Option<String>) {
    let inner = shell::quote(command);
    match sudo_password {
        Some(password) => (
            format!("sudo -S -p '' sh -c {inner}"),
            Some(format!("{password}\n")),
        ),
        None => (format!("sudo -n sh -c {inner}"), None),
    }
}
