//! Supervisor daemon management: install, deploy program stanzas, control.
//!
//! Privileged steps run elevated. Deploys overwrite any existing stanza of the
//! same name; there is no remote existence check.

use std::fs;
use std::path::Path;

use tracing::{info, instrument, warn};

use super::remote_fs;
use super::session::{RemoteSession, RunOptions};
use super::transfer::upload_file;
use crate::core::paths;
use crate::core::shell::quote;
pub use crate::core::supervisor_config::render_config;
use crate::core::supervisor_config::{CONFIG_DIR, config_file_name, validate};
use crate::core::types::{CommandResult, ServiceDefinition};
use crate::error::{DeployError, Result};

/// System package providing the daemon and its control CLI.
pub const DAEMON_PACKAGE: &str = "supervisor";
const CONTROL_CLI: &str = "supervisorctl";

/// Install the daemon with apt and start it under systemd.
///
/// A failed package index update is logged and tolerated; every later step
/// must succeed.
#[instrument(skip_all)]
pub fn install<S: RemoteSession + ?Sized>(session: &S) -> Result<()> {
    info!("installing supervisor");
    let update = session.run("apt-get update", RunOptions::ELEVATED_PROBE)?;
    if !update.success() {
        warn!(
            exit_code = update.exit_code,
            stderr = %update.stderr.trim(),
            "package index update failed, continuing"
        );
    }
    session.run(
        &format!("apt-get install -y {DAEMON_PACKAGE}"),
        RunOptions::ELEVATED,
    )?;
    session.run(
        &format!("systemctl enable {DAEMON_PACKAGE}"),
        RunOptions::ELEVATED,
    )?;
    session.run(
        &format!("systemctl start {DAEMON_PACKAGE}"),
        RunOptions::ELEVATED,
    )?;
    info!("supervisor installed and started");
    Ok(())
}

/// True when the control CLI is on the remote `PATH`.
pub fn is_installed<S: RemoteSession + ?Sized>(session: &S) -> Result<bool> {
    let probe = session.run(&format!("which {CONTROL_CLI}"), RunOptions::PROBE)?;
    Ok(probe.success())
}

/// Render, upload, install and load the stanza for `definition`.
///
/// The rendered file is written to a fresh local temp directory as
/// `<name>.conf` and removed on every exit path. A failed removal is reported
/// only when the deploy itself succeeded.
#[instrument(skip_all, fields(service = %definition.name))]
pub fn deploy<S: RemoteSession + ?Sized>(
    session: &S,
    definition: &ServiceDefinition,
) -> Result<()> {
    validate(definition)?;
    let file_name = config_file_name(&definition.name);

    let scratch = tempfile::Builder::new()
        .prefix("deployer-")
        .tempdir()
        .map_err(|e| DeployError::io("create local temp dir", e))?;
    let local = scratch.path().join(&file_name);

    let outcome = fs::write(&local, render_config(definition))
        .map_err(|e| DeployError::io(format!("write {}", local.display()), e))
        .and_then(|()| push_config(session, &local, &file_name));

    if let Err(cleanup_err) = scratch.close() {
        warn!(err = %cleanup_err, "failed to remove local temp config");
        if outcome.is_ok() {
            return Err(DeployError::io("remove local temp config", cleanup_err));
        }
    }
    if outcome.is_ok() {
        info!("service deployed");
    }
    outcome
}

fn push_config<S: RemoteSession + ?Sized>(
    session: &S,
    local: &Path,
    file_name: &str,
) -> Result<()> {
    let staged = paths::staging_path(file_name);
    upload_file(session, local, &staged)?;

    let installed = format!("{CONFIG_DIR}/{file_name}");
    info!(path = %installed, "moving config into place");
    remote_fs::ensure_dir(session, CONFIG_DIR, RunOptions::ELEVATED)?;
    remote_fs::move_file(session, &staged, &installed, RunOptions::ELEVATED)?;

    info!("reloading supervisor");
    session.run(&format!("{CONTROL_CLI} reread"), RunOptions::ELEVATED)?;
    session.run(&format!("{CONTROL_CLI} update"), RunOptions::ELEVATED)?;
    Ok(())
}

#[instrument(skip_all, fields(service = name))]
pub fn start<S: RemoteSession + ?Sized>(session: &S, name: &str) -> Result<CommandResult> {
    info!("starting service");
    control(session, "start", name)
}

#[instrument(skip_all, fields(service = name))]
pub fn stop<S: RemoteSession + ?Sized>(session: &S, name: &str) -> Result<CommandResult> {
    info!("stopping service");
    control(session, "stop", name)
}

#[instrument(skip_all, fields(service = name))]
pub fn restart<S: RemoteSession + ?Sized>(session: &S, name: &str) -> Result<CommandResult> {
    info!("restarting service");
    control(session, "restart", name)
}

/// Raw `supervisorctl status [name]` output.
///
/// The control CLI exits non-zero whenever a program is not running, so the
/// result is returned as-is for the caller to interpret.
pub fn status<S: RemoteSession + ?Sized>(
    session: &S,
    name: Option<&str>,
) -> Result<CommandResult> {
    let command = match name {
        Some(name) => format!("{CONTROL_CLI} status {}", quote(name)),
        None => format!("{CONTROL_CLI} status"),
    };
    session.run(&command, RunOptions::ELEVATED_PROBE)
}

fn control<S: RemoteSession + ?Sized>(
    session: &S,
    action: &str,
    name: &str,
) -> Result<CommandResult> {
    session.run(
        &format!("{CONTROL_CLI} {action} {}", quote(name)),
        RunOptions::ELEVATED,
    )
}
