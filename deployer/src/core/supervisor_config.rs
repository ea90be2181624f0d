//! Supervisor program stanza rendering and definition validation.

use std::sync::LazyLock;

use minijinja::{Environment, context};
use regex::Regex;

use super::types::ServiceDefinition;
use crate::error::{DeployError, Result};

/// Directory the daemon reads program stanzas from.
pub const CONFIG_DIR: &str = "/etc/supervisor/conf.d";

const PROGRAM_TEMPLATE: &str = include_str!("../templates/supervisor_program.conf");

static ENGINE: LazyLock<Environment<'static>> = LazyLock::new(|| {
    let mut env = Environment::new();
    env.set_keep_trailing_newline(true);
    env.add_template("program", PROGRAM_TEMPLATE)
        .expect("program template should be valid");
    env
});

static NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_.-]*$").unwrap());

/// File name of a service's stanza inside [`CONFIG_DIR`].
pub fn config_file_name(service_name: &str) -> String {
    format!("{service_name}.conf")
}

/// Render the `[program:<name>]` stanza for `definition`.
///
/// Pure and deterministic: the same definition always yields byte-identical
/// text. Booleans are the literal tokens `true` / `false`.
pub fn render_config(definition: &ServiceDefinition) -> String {
    let template = ENGINE
        .get_template("program")
        .expect("program template is registered");
    template
        .render(context! {
            name => definition.name.as_str(),
            command => definition.command.as_str(),
            directory => definition.directory.as_str(),
            user => definition.user.as_str(),
            autostart => bool_token(definition.autostart),
            autorestart => bool_token(definition.autorestart),
            stdout_logfile => definition.stdout_logfile.as_str(),
            stderr_logfile => definition.stderr_logfile.as_str(),
        })
        .expect("program template rendering should not fail")
}

/// Reject definitions that would produce an unusable file name or inject
/// extra lines into the stanza.
pub fn validate(definition: &ServiceDefinition) -> Result<()> {
    if !NAME_RE.is_match(&definition.name) {
        return Err(DeployError::InvalidServiceDefinition(format!(
            "service name '{}' must match {}",
            definition.name,
            NAME_RE.as_str()
        )));
    }
    let fields = [
        ("command", &definition.command),
        ("directory", &definition.directory),
        ("user", &definition.user),
        ("stdout_logfile", &definition.stdout_logfile),
        ("stderr_logfile", &definition.stderr_logfile),
    ];
    for (field, value) in fields {
        if value.trim().is_empty() {
            return Err(DeployError::InvalidServiceDefinition(format!(
                "{field} must not be empty"
            )));
        }
        if value.contains(['\n', '\r']) {
            return Err(DeployError::InvalidServiceDefinition(format!(
                "{field} must be a single line"
            )));
        }
    }
    Ok(())
}

impl ServiceDefinition {
    /// See [`validate`].
    pub fn validate(&self) -> Result<()> {
        validate(self)
    }
}

fn bool_token(value: bool) -> &'static str {
    if value { "true" } else { "false" }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn worker() -> ServiceDefinition {
        ServiceDefinition::new("worker", "run.sh", "/srv/app", "app")
    }

    #[test]
    fn renders_default_stanza_exactly() {
        let expected = "[program:worker]\n\
command=run.sh\n\
directory=/srv/app\n\
user=app\n\
autostart=true\n\
autorestart=true\n\
stdout_logfile=/var/log/supervisor/%(program_name)s.log\n\
stderr_logfile=/var/log/supervisor/%(program_name)s_err.log\n";
        assert_eq!(render_config(&worker()), expected);
    }

    #[test]
    fn renders_false_booleans_as_literals() {
        let mut def = worker();
        def.autostart = false;
        def.autorestart = false;
        let rendered = render_config(&def);
        assert!(rendered.contains("\nautostart=false\n"));
        assert!(rendered.contains("\nautorestart=false\n"));
        assert!(!rendered.contains('0'));
    }

    #[test]
    fn rendering_is_deterministic() {
        let def = worker();
        assert_eq!(render_config(&def), render_config(&def));
    }

    #[test]
    fn commands_are_not_escaped() {
        let mut def = worker();
        def.command = "/srv/app/.venv/bin/python -m app --bind 0.0.0.0:8000 && echo '<ok>'".into();
        let rendered = render_config(&def);
        assert!(rendered.contains(
            "command=/srv/app/.venv/bin/python -m app --bind 0.0.0.0:8000 && echo '<ok>'\n"
        ));
    }

    #[test]
    fn validate_accepts_default_definition() {
        validate(&worker()).expect("valid");
        worker().validate().expect("valid via method");
    }

    #[test]
    fn validate_rejects_path_like_names() {
        for name in ["", "../etc", "a b", "svc/x", "-flag"] {
            let mut def = worker();
            def.name = name.to_string();
            let err = validate(&def).unwrap_err();
            assert!(
                matches!(err, DeployError::InvalidServiceDefinition(_)),
                "{name:?} should be rejected"
            );
        }
    }

    #[test]
    fn validate_rejects_multiline_fields() {
        let mut def = worker();
        def.command = "run.sh\n[program:evil]".into();
        let err = validate(&def).unwrap_err();
        assert!(err.to_string().contains("command must be a single line"));
    }

    #[test]
    fn config_file_name_appends_conf() {
        assert_eq!(config_file_name("worker"), "worker.conf");
    }
}
