//! Virtual environments on the remote host.

use tracing::{debug, info, instrument};

use super::remote_fs;
use super::session::{RemoteSession, RunOptions};
use crate::core::paths;
use crate::core::shell::quote;
use crate::core::types::{CommandResult, InterpreterInstance, VirtualEnvironment};
use crate::error::Result;

/// Activation script location, relative to the environment root.
pub const ACTIVATE_SCRIPT: &str = "bin/activate";

/// Describe the environment at `path` without touching the host.
pub fn describe(interpreter: &InterpreterInstance, path: &str) -> VirtualEnvironment {
    VirtualEnvironment {
        name: paths::file_name(path).to_string(),
        interpreter: interpreter.clone(),
        remote_path: path.to_string(),
    }
}

/// Create an environment at `path` with `interpreter`, unless a directory is
/// already there.
///
/// Returns the same value whether the environment was created or found.
#[instrument(skip_all, fields(path = path, version = %interpreter.version))]
pub fn create<S: RemoteSession + ?Sized>(
    session: &S,
    interpreter: &InterpreterInstance,
    path: &str,
) -> Result<VirtualEnvironment> {
    if remote_fs::dir_exists(session, path)? {
        info!("virtual environment already present, skipping creation");
        return Ok(describe(interpreter, path));
    }
    session.run(
        &format!("{} -m venv {}", quote(&interpreter.executable_path), quote(path)),
        RunOptions::CHECKED,
    )?;
    info!("created virtual environment");
    Ok(describe(interpreter, path))
}

/// Remove the environment directory. An absent directory is not an error.
pub fn delete<S: RemoteSession + ?Sized>(session: &S, env: &VirtualEnvironment) -> Result<()> {
    delete_at(session, &env.remote_path)
}

/// Remove the environment rooted at `path`; no interpreter is needed.
#[instrument(skip_all, fields(path = path))]
pub fn delete_at<S: RemoteSession + ?Sized>(session: &S, path: &str) -> Result<()> {
    remote_fs::remove_tree(session, path)?;
    info!("deleted virtual environment");
    Ok(())
}

/// Shell line that activates `env` and then runs `command` in the same shell.
pub fn activated_command(env: &VirtualEnvironment, command: &str) -> String {
    activation_line(&env.remote_path, command)
}

fn activation_line(path: &str, command: &str) -> String {
    let script = format!("{}/{ACTIVATE_SCRIPT}", path.trim_end_matches('/'));
    format!(". {} && {command}", quote(&script))
}

/// Run `command` inside `env`. A non-zero exit is an error.
pub fn run_in<S: RemoteSession + ?Sized>(
    session: &S,
    env: &VirtualEnvironment,
    command: &str,
) -> Result<CommandResult> {
    run_in_with(session, env, command, RunOptions::CHECKED)
}

/// Run `command` inside `env` with explicit options.
#[instrument(skip_all, fields(env = %env.name))]
pub fn run_in_with<S: RemoteSession + ?Sized>(
    session: &S,
    env: &VirtualEnvironment,
    command: &str,
    options: RunOptions,
) -> Result<CommandResult> {
    debug!(command, "running in virtual environment");
    session.run(&activated_command(env, command), options)
}

/// Run `command` inside the environment rooted at `path`.
///
/// Activation only needs the environment's own script, so no interpreter
/// lookup happens.
#[instrument(skip_all, fields(path = path))]
pub fn run_at<S: RemoteSession + ?Sized>(
    session: &S,
    path: &str,
    command: &str,
    options: RunOptions,
) -> Result<CommandResult> {
    debug!(command, "running in virtual environment");
    session.run(&activation_line(path, command), options)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DeployError;
    use crate::test_support::{FakeSession, interpreter};

    #[test]
    fn create_runs_venv_module_when_absent() {
        let session = FakeSession::new();
        let env = create(&session, &interpreter("3.11"), "/srv/app/.venv").expect("create");
        assert_eq!(env.name, ".venv");
        assert_eq!(env.remote_path, "/srv/app/.venv");
        assert_eq!(
            session.commands(),
            vec![
                "test -d /srv/app/.venv",
                "/usr/bin/python3.11 -m venv /srv/app/.venv",
            ]
        );
        assert!(session.file("/srv/app/.venv/bin/activate").is_some());
    }

    #[test]
    fn create_is_idempotent() {
        let session = FakeSession::new();
        let first = create(&session, &interpreter("3.11"), "/srv/app/venv").expect("first");
        let second = create(&session, &interpreter("3.11"), "/srv/app/venv").expect("second");
        assert_eq!(first, second);
        let creations = session
            .commands()
            .iter()
            .filter(|c| c.contains("-m venv"))
            .count();
        assert_eq!(creations, 1);
    }

    #[test]
    fn create_propagates_creation_failure() {
        let session = FakeSession::new();
        session.fail_on("-m venv", 1, "ensurepip is not available");
        let err = create(&session, &interpreter("3.11"), "/srv/app/venv").unwrap_err();
        assert_eq!(err.remote_exit_code(), Some(1));
        assert!(err.to_string().contains("ensurepip"));
    }

    #[test]
    fn delete_removes_unconditionally() {
        let session = FakeSession::new();
        let env = describe(&interpreter("3.9"), "/srv/app/venv");
        delete(&session, &env).expect("delete absent");
        assert_eq!(session.commands(), vec!["rm -rf /srv/app/venv"]);
    }

    #[test]
    fn run_in_sources_activation_script_first() {
        let session = FakeSession::new();
        let env = create(&session, &interpreter("3.11"), "/srv/app/venv").expect("create");
        run_in(&session, &env, "python -V").expect("run");
        assert_eq!(
            session.commands().last().map(String::as_str),
            Some(". /srv/app/venv/bin/activate && python -V")
        );
    }

    #[test]
    fn path_helpers_skip_interpreter_lookup() {
        let session = FakeSession::new();
        session.add_file("/srv/app/venv/bin/activate", b"");
        let result = run_at(&session, "/srv/app/venv/", "python -V", RunOptions::PROBE)
            .expect("run");
        assert!(result.success());
        delete_at(&session, "/srv/app/venv").expect("delete");
        assert_eq!(
            session.commands(),
            vec![
                ". /srv/app/venv/bin/activate && python -V",
                "rm -rf /srv/app/venv",
            ]
        );
    }

    #[test]
    fn run_in_surfaces_command_failure() {
        let session = FakeSession::new();
        let env = create(&session, &interpreter("3.11"), "/srv/app/venv").expect("create");
        session.fail_on("pytest", 5, "no tests ran");
        let err = run_in(&session, &env, "pytest").unwrap_err();
        assert!(matches!(
            err,
            DeployError::RemoteCommandFailed { exit_code: 5, .. }
        ));

        let result = run_in_with(&session, &env, "pytest", RunOptions::PROBE).expect("probe");
        assert_eq!(result.exit_code, 5);
    }
}
