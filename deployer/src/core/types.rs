//! Value types shared by the remote operations.
//!
//! All of these are immutable records: operations produce new values instead
//! of mutating existing ones.

use serde::{Deserialize, Serialize};

/// Default supervisor log locations. `%(program_name)s` is expanded by the
/// daemon, not by us.
pub const DEFAULT_STDOUT_LOGFILE: &str = "/var/log/supervisor/%(program_name)s.log";
pub const DEFAULT_STDERR_LOGFILE: &str = "/var/log/supervisor/%(program_name)s_err.log";

/// Captured result of one remote command.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl CommandResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// A discovered interpreter binary on the remote host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterpreterInstance {
    /// Version string derived from the file name (e.g. `3.11`).
    pub version: String,
    /// Absolute path of the binary (e.g. `/usr/bin/python3.11`).
    pub executable_path: String,
}

/// An isolated package environment on the remote host.
///
/// References its interpreter by value; many environments may share one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VirtualEnvironment {
    pub name: String,
    pub interpreter: InterpreterInstance,
    pub remote_path: String,
}

/// A supervised program, mapped 1:1 to a `[program:<name>]` stanza.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceDefinition {
    pub name: String,
    pub command: String,
    pub directory: String,
    pub user: String,
    #[serde(default = "default_true")]
    pub autostart: bool,
    #[serde(default = "default_true")]
    pub autorestart: bool,
    #[serde(default = "default_stdout_logfile")]
    pub stdout_logfile: String,
    #[serde(default = "default_stderr_logfile")]
    pub stderr_logfile: String,
}

impl ServiceDefinition {
    /// Definition with the daemon defaults: autostart and autorestart on,
    /// logs under `/var/log/supervisor`.
    pub fn new(
        name: impl Into<String>,
        command: impl Into<String>,
        directory: impl Into<String>,
        user: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            directory: directory.into(),
            user: user.into(),
            autostart: true,
            autorestart: true,
            stdout_logfile: default_stdout_logfile(),
            stderr_logfile: default_stderr_logfile(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_stdout_logfile() -> String {
    DEFAULT_STDOUT_LOGFILE.to_string()
}

fn default_stderr_logfile() -> String {
    DEFAULT_STDERR_LOGFILE.to_string()
}
