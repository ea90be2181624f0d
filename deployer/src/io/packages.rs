//! Package installation into a virtual environment.
//!
//! All installs run `pip` through [`run_in`], so a failing install
//! surfaces as `RemoteCommandFailed`.

use std::fs;
use std::path::Path;

use tracing::{info, instrument, warn};

use super::remote_fs;
use super::session::RemoteSession;
use super::transfer::upload_directory;
use super::venv::run_in;
use crate::core::paths;
use crate::core::shell::{self, quote};
use crate::core::types::VirtualEnvironment;
use crate::error::{DeployError, Result};

/// Install registry packages in one `pip install` invocation. An empty list is
/// a no-op.
#[instrument(skip_all, fields(env = %env.name, count = package_names.len()))]
pub fn install_packages<S: RemoteSession + ?Sized>(
    session: &S,
    env: &VirtualEnvironment,
    package_names: &[String],
) -> Result<()> {
    if package_names.is_empty() {
        info!("no packages requested");
        return Ok(());
    }
    info!(packages = %package_names.join(" "), "installing packages");
    run_in(session, env, &format!("pip install {}", shell::join(package_names)))?;
    Ok(())
}

/// Upload a local source tree to the staging root, install it, and remove the
/// staged copy.
///
/// The staged directory is removed whether or not the install succeeded; an
/// install failure is returned after cleanup and takes precedence over a
/// cleanup failure. If the upload itself fails, nothing is cleaned up.
#[instrument(skip_all, fields(env = %env.name, local = %local_dir.display()))]
pub fn install_local_package<S: RemoteSession + ?Sized>(
    session: &S,
    env: &VirtualEnvironment,
    local_dir: &Path,
) -> Result<()> {
    if !local_dir.exists() {
        return Err(DeployError::LocalNotFound(local_dir.to_path_buf()));
    }
    let staging = paths::staging_path(&package_dir_name(local_dir)?);

    upload_directory(session, local_dir, &staging)?;

    info!(staging = %staging, "installing staged package");
    let installed = run_in(session, env, &format!("pip install {}", quote(&staging)));
    let cleaned = remote_fs::remove_tree(session, &staging);

    match (installed, cleaned) {
        (Ok(_), Ok(())) => Ok(()),
        (Ok(_), Err(cleanup_err)) => Err(cleanup_err),
        (Err(install_err), Ok(())) => Err(install_err),
        (Err(install_err), Err(cleanup_err)) => {
            warn!(staging = %staging, err = %cleanup_err, "failed to remove staged package");
            Err(install_err)
        }
    }
}

/// Install straight from a source-control URL (`pip install git+<url>`).
#[instrument(skip_all, fields(env = %env.name, url = repository_url))]
pub fn install_from_source_control<S: RemoteSession + ?Sized>(
    session: &S,
    env: &VirtualEnvironment,
    repository_url: &str,
) -> Result<()> {
    info!("installing from source control");
    run_in(
        session,
        env,
        &format!("pip install {}", quote(&format!("git+{repository_url}"))),
    )?;
    Ok(())
}

/// Final path segment of the local package directory. `.` and trailing
/// slashes resolve through the canonical path.
fn package_dir_name(local_dir: &Path) -> Result<String> {
    let canonical = fs::canonicalize(local_dir)
        .map_err(|e| DeployError::io(format!("resolve {}", local_dir.display()), e))?;
    canonical
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| {
            DeployError::io(
                format!("resolve {}", local_dir.display()),
                std::io::Error::new(std::io::ErrorKind::InvalidInput, "path has no final segment"),
            )
        })
}
