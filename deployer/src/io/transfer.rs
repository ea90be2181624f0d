//! Idempotent uploads of single files and directory trees.
//!
//! Uploads are additive: remote files with no local counterpart are never
//! deleted. Re-running an upload leaves the remote side unchanged apart from
//! rewriting the same bytes.

use std::fs;
use std::path::Path;

use tracing::{debug, info, instrument};

use super::remote_fs;
use super::session::{RemoteSession, RunOptions};
use crate::core::paths;
use crate::error::{DeployError, Result};

/// Upload one file, creating the remote parent directory first.
///
/// Fails with [`DeployError::LocalNotFound`] before touching the session when
/// `local_path` does not exist. Overwrites `remote_path` unconditionally.
#[instrument(skip_all, fields(local = %local_path.display(), remote = remote_path))]
pub fn upload_file<S: RemoteSession + ?Sized>(
    session: &S,
    local_path: &Path,
    remote_path: &str,
) -> Result<()> {
    if !local_path.exists() {
        return Err(DeployError::LocalNotFound(local_path.to_path_buf()));
    }
    remote_fs::ensure_dir(session, paths::parent(remote_path), RunOptions::CHECKED)?;
    info!("uploading file");
    session.put_file(local_path, remote_path)?;
    debug!("upload complete");
    Ok(())
}

/// Mirror `local_dir` under `remote_dir`.
///
/// Every local subdirectory gets a `mkdir -p` of its mirrored path and every
/// file is copied to its mirrored path. Entries are visited in file-name order.
/// Symlinked directories are created but not descended into; symlinked files
/// are uploaded with their target's contents.
#[instrument(skip_all, fields(local = %local_dir.display(), remote = remote_dir))]
pub fn upload_directory<S: RemoteSession + ?Sized>(
    session: &S,
    local_dir: &Path,
    remote_dir: &str,
) -> Result<()> {
    if !local_dir.exists() {
        return Err(DeployError::LocalNotFound(local_dir.to_path_buf()));
    }
    if !local_dir.is_dir() {
        return Err(DeployError::io(
            format!("upload {}", local_dir.display()),
            std::io::Error::new(std::io::ErrorKind::NotADirectory, "not a directory"),
        ));
    }
    remote_fs::ensure_dir(session, remote_dir, RunOptions::CHECKED)?;
    info!("uploading directory");
    let mut files = 0usize;
    mirror(session, local_dir, local_dir, remote_dir, &mut files)?;
    debug!(files, "upload complete");
    Ok(())
}

fn mirror<S: RemoteSession + ?Sized>(
    session: &S,
    root: &Path,
    dir: &Path,
    remote_root: &str,
    files: &mut usize,
) -> Result<()> {
    let mut entries = fs::read_dir(dir)
        .map_err(|e| DeployError::io(format!("read directory {}", dir.display()), e))?
        .collect::<std::io::Result<Vec<_>>>()
        .map_err(|e| DeployError::io(format!("read directory {}", dir.display()), e))?;
    entries.sort_by_key(|entry| entry.file_name());

    for entry in entries {
        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(&path);
        let remote = paths::join(remote_root, relative);
        let file_type = entry
            .file_type()
            .map_err(|e| DeployError::io(format!("stat {}", path.display()), e))?;

        if file_type.is_dir() {
            remote_fs::ensure_dir(session, &remote, RunOptions::CHECKED)?;
            mirror(session, root, &path, remote_root, files)?;
        } else if file_type.is_symlink() && path.is_dir() {
            remote_fs::ensure_dir(session, &remote, RunOptions::CHECKED)?;
        } else {
            session.put_file(&path, &remote)?;
            *files += 1;
        }
    }
    Ok(())
}
