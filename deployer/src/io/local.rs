//! Session against the local machine.
//!
//! Runs commands with `sh -c` and copies files on the local filesystem, so
//! every operation can target `localhost` without an SSH server.

use std::fs;
use std::path::Path;
use std::time::Duration;

use tracing::{debug, instrument};

use super::process::run_shell;
use super::session::{RemoteSession, elevate};
use crate::core::types::CommandResult;
use crate::error::{DeployError, Result};

#[derive(Debug, Clone, Default)]
pub struct LocalSession {
    sudo_password: Option<String>,
    command_timeout: Option<Duration>,
}

impl LocalSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Password fed to `sudo -S` for elevated commands.
    pub fn with_sudo_password(mut self, password: impl Into<String>) -> Self {
        self.sudo_password = Some(password.into());
        self
    }

    /// Kill commands running longer than `timeout`.
    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = Some(timeout);
        self
    }
}

impl RemoteSession for LocalSession {
    #[instrument(skip_all, fields(elevated = elevated))]
    fn exec(&self, command: &str, elevated: bool) -> Result<CommandResult> {
        if elevated {
            let (wrapped, stdin) = elevate(command, self.sudo_password.as_deref());
            return run_shell(
                &wrapped,
                stdin.as_deref().map(str::as_bytes),
                self.command_timeout,
            );
        }
        run_shell(command, None, self.command_timeout)
    }

    fn put_file(&self, local: &Path, remote: &str) -> Result<()> {
        debug!(local = %local.display(), remote, "copying file");
        fs::copy(local, remote).map_err(|e| {
            DeployError::io(format!("copy {} to {remote}", local.display()), e)
        })?;
        Ok(())
    }
}
