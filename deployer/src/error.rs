//! Error taxonomy for remote deployment operations.

use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, DeployError>;

#[derive(Debug, Error)]
pub enum DeployError {
    /// A local file or directory was missing before an upload started.
    #[error("local path not found: {}", .0.display())]
    LocalNotFound(PathBuf),

    /// The interpreter glob matched nothing on the remote host.
    #[error("no interpreters found on the remote host (searched {pattern})")]
    NoInterpretersFound { pattern: String },

    /// Interpreters exist, but none has a version starting with `prefix`.
    #[error("no interpreter found for version {prefix}")]
    InterpreterNotFound { prefix: String },

    /// A remote command exited non-zero and the caller did not tolerate it.
    #[error("remote command `{command}` failed with exit code {exit_code}: {stderr}")]
    RemoteCommandFailed {
        command: String,
        exit_code: i32,
        stderr: String,
    },

    /// Session credentials were absent or conflicting.
    #[error("invalid authentication config: {0}")]
    AuthenticationConfigInvalid(String),

    /// The server's host key failed verification; no credentials were sent.
    #[error("host key for {host} rejected: {reason}")]
    HostKeyRejected { host: String, reason: String },

    #[error("invalid service definition: {0}")]
    InvalidServiceDefinition(String),

    #[error("ssh: {0}")]
    Ssh(#[from] ssh2::Error),

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl DeployError {
    pub(crate) fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Exit code of the failed remote command, if this is a command failure.
    pub fn remote_exit_code(&self) -> Option<i32> {
        match self {
            Self::RemoteCommandFailed { exit_code, .. } => Some(*exit_code),
            _ => None,
        }
    }
}
