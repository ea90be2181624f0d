//! SSH session backed by libssh2.
//!
//! One TCP connection and one authenticated `ssh2::Session` per
//! [`SshSession`]. The server's host key is checked before any credential is
//! sent. Each command opens a fresh channel on the session; file copies use
//! SCP. The session closes when dropped.

use std::fs::File;
use std::io::{self, ErrorKind, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::path::Path;
use std::thread;
use std::time::Duration;

use ssh2::{CheckResult, Channel, HashType, KnownHostFileKind, Session};
use tracing::{debug, info, instrument, warn};

use super::config::expand_home;
use super::session::{RemoteSession, elevate};
use crate::core::auth::{AuthMethod, SessionTarget};
use crate::core::host_key::{HostKeyPolicy, verify_fingerprint};
use crate::core::types::CommandResult;
use crate::error::{DeployError, Result};

/// Mode for uploaded files when the local mode is unavailable.
#[cfg(not(unix))]
const DEFAULT_FILE_MODE: i32 = 0o644;

/// Back-off between polls when neither output stream had data.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

pub struct SshSession {
    session: Session,
    target: SessionTarget,
}

impl SshSession {
    /// Connect and authenticate. `connect_timeout` bounds the TCP connect only;
    /// commands run without a timeout.
    #[instrument(skip_all, fields(target = %target.display_name()))]
    pub fn connect(target: SessionTarget, connect_timeout: Duration) -> Result<Self> {
        let addr = (target.host.as_str(), target.port)
            .to_socket_addrs()
            .map_err(|e| DeployError::io(format!("resolve {}", target.host), e))?
            .next()
            .ok_or_else(|| {
                DeployError::io(
                    format!("resolve {}", target.host),
                    io::Error::new(io::ErrorKind::NotFound, "no addresses"),
                )
            })?;
        let tcp = TcpStream::connect_timeout(&addr, connect_timeout)
            .map_err(|e| DeployError::io(format!("connect to {addr}"), e))?;

        let mut session = Session::new()?;
        session.set_tcp_stream(tcp);
        session.handshake()?;
        verify_host_key(&session, &target)?;

        match &target.auth {
            AuthMethod::Password(password) => {
                session.userauth_password(&target.user, password)?;
            }
            AuthMethod::KeyFile { path, passphrase } => {
                session.userauth_pubkey_file(&target.user, None, path, passphrase.as_deref())?;
            }
        }
        if !session.authenticated() {
            return Err(DeployError::AuthenticationConfigInvalid(format!(
                "server rejected credentials for {}",
                target.display_name()
            )));
        }

        info!("ssh session established");
        Ok(Self { session, target })
    }

    pub fn target(&self) -> &SessionTarget {
        &self.target
    }
}

impl RemoteSession for SshSession {
    #[instrument(skip_all, fields(elevated = elevated))]
    fn exec(&self, command: &str, elevated: bool) -> Result<CommandResult> {
        let (script, stdin) = if elevated {
            elevate(command, self.target.auth.sudo_password())
        } else {
            (command.to_string(), None)
        };

        let mut channel = self.session.channel_session()?;
        channel.exec(&script)?;
        if let Some(input) = stdin {
            channel
                .write_all(input.as_bytes())
                .map_err(|e| DeployError::io("write sudo password", e))?;
        }
        channel.send_eof()?;

        self.session.set_blocking(false);
        let drained = drain_streams(&mut channel);
        self.session.set_blocking(true);
        let (stdout, stderr) = drained?;

        channel.wait_close()?;
        let exit_code = channel.exit_status()?;
        debug!(exit_code, "remote command finished");
        Ok(CommandResult {
            stdout,
            stderr,
            exit_code,
        })
    }

    #[instrument(skip_all, fields(local = %local.display(), remote = remote))]
    fn put_file(&self, local: &Path, remote: &str) -> Result<()> {
        let mut file = File::open(local)
            .map_err(|e| DeployError::io(format!("open {}", local.display()), e))?;
        let metadata = file
            .metadata()
            .map_err(|e| DeployError::io(format!("stat {}", local.display()), e))?;

        let mut channel =
            self.session
                .scp_send(Path::new(remote), file_mode(&metadata), metadata.len(), None)?;
        io::copy(&mut file, &mut channel)
            .map_err(|e| DeployError::io(format!("send {} to {remote}", local.display()), e))?;
        channel.send_eof()?;
        channel.wait_eof()?;
        channel.close()?;
        channel.wait_close()?;
        debug!(bytes = metadata.len(), "file sent");
        Ok(())
    }
}

/// Check the server's host key against `target.host_key`.
fn verify_host_key(session: &Session, target: &SessionTarget) -> Result<()> {
    let rejected = |reason: String| DeployError::HostKeyRejected {
        host: target.host.clone(),
        reason,
    };
    match &target.host_key {
        HostKeyPolicy::AcceptAny => {
            warn!("host key verification disabled");
            Ok(())
        }
        HostKeyPolicy::Fingerprint(expected) => {
            let hash = session
                .host_key_hash(HashType::Sha256)
                .ok_or_else(|| rejected("server presented no host key".to_string()))?;
            verify_fingerprint(&target.host, expected, hash)
        }
        HostKeyPolicy::KnownHosts(path) => {
            let path = expand_home(path);
            if !path.exists() {
                return Err(rejected(format!(
                    "known hosts file {} does not exist",
                    path.display()
                )));
            }
            let (key, _) = session
                .host_key()
                .ok_or_else(|| rejected("server presented no host key".to_string()))?;
            let mut known = session.known_hosts()?;
            known.read_file(&path, KnownHostFileKind::OpenSSH)?;
            match known.check_port(&target.host, target.port, key) {
                CheckResult::Match => {
                    debug!(file = %path.display(), "host key matches known hosts");
                    Ok(())
                }
                CheckResult::NotFound => Err(rejected(format!(
                    "host is not listed in {}",
                    path.display()
                ))),
                CheckResult::Mismatch => Err(rejected(format!(
                    "key differs from the one recorded in {}",
                    path.display()
                ))),
                CheckResult::Failure => Err(rejected(format!(
                    "could not check {}",
                    path.display()
                ))),
            }
        }
    }
}

/// Read stdout and stderr together until the channel reaches EOF.
///
/// Both streams share one receive window, so reading either one to EOF first
/// can stall a command that fills the other. The session must be in
/// non-blocking mode.
fn drain_streams(channel: &mut Channel) -> Result<(String, String)> {
    let mut stdout = Vec::new();
    let mut stderr = Vec::new();
    let mut stderr_stream = channel.stderr();
    let mut buf = [0u8; 8192];
    loop {
        let mut progressed = read_available(&mut *channel, &mut buf, &mut stdout, "stdout")?;
        progressed |= read_available(&mut stderr_stream, &mut buf, &mut stderr, "stderr")?;
        if !progressed {
            if channel.eof() {
                break;
            }
            thread::sleep(POLL_INTERVAL);
        }
    }
    Ok((
        String::from_utf8_lossy(&stdout).into_owned(),
        String::from_utf8_lossy(&stderr).into_owned(),
    ))
}

/// One non-blocking read into `out`. Returns whether any bytes arrived.
fn read_available<R: Read>(
    reader: &mut R,
    buf: &mut [u8],
    out: &mut Vec<u8>,
    stream: &str,
) -> Result<bool> {
    match reader.read(buf) {
        Ok(0) => Ok(false),
        Ok(n) => {
            out.extend_from_slice(&buf[..n]);
            Ok(true)
        }
        Err(e) if e.kind() == ErrorKind::WouldBlock => Ok(false),
        Err(e) => Err(DeployError::io(format!("read remote {stream}"), e)),
    }
}

#[cfg(unix)]
fn file_mode(metadata: &std::fs::Metadata) -> i32 {
    use std::os::unix::fs::PermissionsExt;
    (metadata.permissions().mode() & 0o777) as i32
}

#[cfg(not(unix))]
fn file_mode(_metadata: &std::fs::Metadata) -> i32 {
    DEFAULT_FILE_MODE
}
