//! Interpreter discovery on the remote host.

use tracing::{debug, info, instrument};

use super::session::{RemoteSession, RunOptions};
use crate::core::interpreter::{self, INTERPRETER_GLOB};
use crate::core::types::InterpreterInstance;
use crate::error::{DeployError, Result};

/// List interpreter binaries matching [`INTERPRETER_GLOB`], in listing order.
///
/// `ls` exits non-zero when the glob matches nothing, so the listing is run
/// as a probe and an empty result maps to
/// [`DeployError::NoInterpretersFound`].
#[instrument(skip_all)]
pub fn list_interpreters<S: RemoteSession + ?Sized>(
    session: &S,
) -> Result<Vec<InterpreterInstance>> {
    // The glob is expanded by the remote shell, so it must not be quoted.
    let listing = session.run(&format!("ls -1 {INTERPRETER_GLOB}"), RunOptions::PROBE)?;
    let instances = interpreter::parse_listing(&listing.stdout);
    if instances.is_empty() {
        return Err(DeployError::NoInterpretersFound {
            pattern: INTERPRETER_GLOB.to_string(),
        });
    }
    for instance in &instances {
        debug!(version = %instance.version, path = %instance.executable_path, "found interpreter");
    }
    Ok(instances)
}

/// First discovered interpreter whose version starts with `version_prefix`.
#[instrument(skip_all, fields(version_prefix = version_prefix))]
pub fn select_interpreter<S: RemoteSession + ?Sized>(
    session: &S,
    version_prefix: &str,
) -> Result<InterpreterInstance> {
    let instances = list_interpreters(session)?;
    let selected = interpreter::select(&instances, version_prefix).ok_or_else(|| {
        DeployError::InterpreterNotFound {
            prefix: version_prefix.to_string(),
        }
    })?;
    info!(version = %selected.version, path = %selected.executable_path, "selected interpreter");
    Ok(selected.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FakeSession;

    #[test]
    fn lists_in_listing_order() {
        let session = FakeSession::with_interpreters(&["3.11", "3.8", "3.9"]);
        let versions: Vec<String> = list_interpreters(&session)
            .expect("list")
            .into_iter()
            .map(|i| i.version)
            .collect();
        // The fake lists lexically, like `ls`.
        assert_eq!(versions, vec!["3.11", "3.8", "3.9"]);
        assert_eq!(session.commands(), vec!["ls -1 /usr/bin/python3.*"]);
    }

    #[test]
    fn empty_listing_is_no_interpreters_found() {
        let session = FakeSession::new();
        let err = list_interpreters(&session).unwrap_err();
        assert!(matches!(err, DeployError::NoInterpretersFound { .. }));
    }

    #[test]
    fn selects_matching_prefix() {
        let session = FakeSession::with_interpreters(&["3.8", "3.9", "3.11"]);
        let selected = select_interpreter(&session, "3.9").expect("select");
        assert_eq!(selected.version, "3.9");
        assert_eq!(selected.executable_path, "/usr/bin/python3.9");
    }

    #[test]
    fn unmatched_prefix_is_interpreter_not_found() {
        let session = FakeSession::with_interpreters(&["3.8", "3.9", "3.11"]);
        let err = select_interpreter(&session, "3.12").unwrap_err();
        match err {
            DeployError::InterpreterNotFound { prefix } => assert_eq!(prefix, "3.12"),
            other => panic!("unexpected error: {other}"),
        }
    }
}
