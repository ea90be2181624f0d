//! End-to-end deployment flow against the in-memory `FakeSession`.

use std::fs;

use deployer::DeployError;
use deployer::core::types::ServiceDefinition;
use deployer::io::{discovery, packages, supervisor, venv};
use deployer::test_support::FakeSession;

#[test]
fn interpreter_to_running_service() {
    let session = FakeSession::with_interpreters(&["3.8", "3.11"]);

    let python = discovery::select_interpreter(&session, "3.11").expect("select");
    assert_eq!(python.executable_path, "/usr/bin/python3.11");

    let env = venv::create(&session, &python, "/srv/app/venv").expect("venv");
    assert_eq!(env.name, "venv");
    packages::install_packages(&session, &env, &["gunicorn".to_string()]).expect("packages");

    let src = tempfile::tempdir().expect("tempdir");
    let pkg = src.path().join("webapp");
    fs::create_dir_all(&pkg).expect("mkdir");
    fs::write(pkg.join("pyproject.toml"), "[project]\nname = \"webapp\"\n").expect("write");
    packages::install_local_package(&session, &env, &pkg).expect("local package");

    assert!(!supervisor::is_installed(&session).expect("probe"));
    supervisor::install(&session).expect("install supervisor");

    let def = ServiceDefinition::new(
        "webapp",
        "/srv/app/venv/bin/gunicorn webapp:app",
        "/srv/app",
        "www-data",
    );
    supervisor::deploy(&session, &def).expect("deploy");
    supervisor::start(&session, "webapp").expect("start");

    let installed = session
        .file("/etc/supervisor/conf.d/webapp.conf")
        .expect("config installed");
    let text = String::from_utf8(installed).expect("utf8");
    assert!(text.starts_with("[program:webapp]\n"));
    assert!(text.contains("command=/srv/app/venv/bin/gunicorn webapp:app\n"));
    assert!(!session.has_dir("/tmp/webapp"));

    let commands = session.commands();
    assert_eq!(
        commands.last().map(String::as_str),
        Some("supervisorctl start webapp")
    );
}

#[test]
fn second_venv_create_is_a_no_op() {
    let session = FakeSession::with_interpreters(&["3.11"]);
    let python = discovery::select_interpreter(&session, "3").expect("select");
    let first = venv::create(&session, &python, "/srv/app/venv").expect("first");
    let runs_after_first = session.commands().len();
    let second = venv::create(&session, &python, "/srv/app/venv").expect("second");

    assert_eq!(first, second);
    let commands = session.commands();
    assert_eq!(&commands[runs_after_first..], ["test -d /srv/app/venv"]);
}

#[test]
fn missing_interpreter_versions_are_distinguished() {
    let empty = FakeSession::new();
    assert!(matches!(
        discovery::list_interpreters(&empty).unwrap_err(),
        DeployError::NoInterpretersFound { .. }
    ));

    let session = FakeSession::with_interpreters(&["3.8"]);
    assert!(matches!(
        discovery::select_interpreter(&session, "3.12").unwrap_err(),
        DeployError::InterpreterNotFound { ref prefix } if prefix == "3.12"
    ));
}
