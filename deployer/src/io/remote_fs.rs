//! Small remote filesystem primitives shared by the operations.
//!
//! Each helper is one remote command. Paths are shell-quoted.

use super::session::{RemoteSession, RunOptions};
use crate::core::shell::quote;
use crate::error::Result;

/// `mkdir -p`: succeeds whether or not the directory already exists.
pub fn ensure_dir<S: RemoteSession + ?Sized>(
    session: &S,
    path: &str,
    options: RunOptions,
) -> Result<()> {
    session.run(&format!("mkdir -p {}", quote(path)), options)?;
    Ok(())
}

/// `test -d`: true when `path` is an existing directory.
pub fn dir_exists<S: RemoteSession + ?Sized>(session: &S, path: &str) -> Result<bool> {
    let result = session.run(&format!("test -d {}", quote(path)), RunOptions::PROBE)?;
    Ok(result.success())
}

/// `rm -rf`: removing an absent path succeeds.
pub fn remove_tree<S: RemoteSession + ?Sized>(session: &S, path: &str) -> Result<()> {
    session.run(&format!("rm -rf {}", quote(path)), RunOptions::CHECKED)?;
    Ok(())
}

/// `mv -f`, replacing any existing destination.
pub fn move_file<S: RemoteSession + ?Sized>(
    session: &S,
    from: &str,
    to: &str,
    options: RunOptions,
) -> Result<()> {
    session.run(&format!("mv -f {} {}", quote(from), quote(to)), options)?;
    Ok(())
}
