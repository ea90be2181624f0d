//! `deployer` CLI: drive remote deployment operations from `deploy.toml`.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use deployer::DeployError;
use deployer::core::shell;
use deployer::core::types::VirtualEnvironment;
use deployer::exit_codes;
use deployer::io::config::{DEFAULT_CONFIG_FILE, DeployConfig, load_config};
use deployer::io::session::{RemoteSession, RunOptions};
use deployer::io::{discovery, packages, supervisor, transfer, venv};
use deployer::logging;

#[derive(Parser)]
#[command(
    name = "deployer",
    version,
    about = "Deploy interpreter-based services to a remote host over SSH"
)]
struct Cli {
    /// Deployment config file.
    #[arg(short, long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Increase log verbosity (-v info, -vv debug). `RUST_LOG` overrides.
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List interpreters installed on the host.
    Interpreters {
        /// Print JSON instead of `version<TAB>path` lines.
        #[arg(long)]
        json: bool,
    },
    /// Upload a local file or directory tree to an absolute remote path.
    Upload { local: PathBuf, remote: String },
    /// Manage virtual environments.
    #[command(subcommand)]
    Venv(VenvCommand),
    /// Install packages into a virtual environment.
    #[command(subcommand)]
    Install(InstallCommand),
    /// Install supervisor and manage the services from the config.
    #[command(subcommand)]
    Service(ServiceCommand),
}

/// Remote virtual environment plus the interpreter version it uses.
#[derive(Args)]
struct EnvArgs {
    /// Remote path of the environment.
    #[arg(long = "venv")]
    path: String,

    /// Interpreter version prefix, matched against discovered versions.
    #[arg(long, default_value = "3")]
    python: String,
}

/// Remote virtual environment addressed by path alone.
#[derive(Args)]
struct VenvPath {
    /// Remote path of the environment.
    #[arg(long = "venv")]
    path: String,
}

#[derive(Subcommand)]
enum VenvCommand {
    /// Create the environment unless it already exists.
    Create(EnvArgs),
    /// Remove the environment directory.
    Delete(VenvPath),
    /// Run a command with the environment activated. Each word is passed
    /// through as one argument.
    Run {
        #[command(flatten)]
        env: VenvPath,
        #[arg(required = true, trailing_var_arg = true)]
        command: Vec<String>,
    },
}

#[derive(Subcommand)]
enum InstallCommand {
    /// Install packages from the package index.
    Packages {
        #[command(flatten)]
        env: EnvArgs,
        names: Vec<String>,
    },
    /// Upload a local package directory and install it.
    Local {
        #[command(flatten)]
        env: EnvArgs,
        dir: PathBuf,
    },
    /// Install from a git repository URL.
    Git {
        #[command(flatten)]
        env: EnvArgs,
        url: String,
    },
}

#[derive(Subcommand)]
enum ServiceCommand {
    /// Print the rendered program config without connecting.
    Render { name: String },
    #[command(flatten)]
    Remote(ServiceAction),
}

/// Service operations that need a session.
#[derive(Subcommand)]
enum ServiceAction {
    /// Install and start the supervisor daemon.
    Install,
    /// Exit 0 when supervisor is installed, 3 when it is not.
    Check,
    /// Render, upload and load the program config.
    Deploy { name: String },
    Start { name: String },
    Stop { name: String },
    Restart { name: String },
    /// Print supervisor status for one service or all of them.
    Status { name: Option<String> },
}

fn main() {
    let code = match run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{:#}", err);
            error_exit_code(&err)
        }
    };
    std::process::exit(code);
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let config = match load_config(&cli.config) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{:#}", err);
            return Ok(exit_codes::INVALID);
        }
    };
    dispatch(&config, cli.command)
}

/// Only commands that touch the host open a session.
fn dispatch(config: &DeployConfig, command: Command) -> Result<i32> {
    let connect = || config.open_session();
    match command {
        Command::Interpreters { json } => cmd_interpreters(connect()?.as_ref(), json),
        Command::Upload { local, remote } => cmd_upload(connect()?.as_ref(), &local, &remote),
        Command::Venv(cmd) => cmd_venv(connect()?.as_ref(), cmd),
        Command::Install(cmd) => cmd_install(connect()?.as_ref(), cmd),
        Command::Service(ServiceCommand::Render { name }) => {
            print!("{}", supervisor::render_config(config.find_service(&name)?));
            Ok(exit_codes::OK)
        }
        Command::Service(ServiceCommand::Remote(action)) => {
            cmd_service(config, connect()?.as_ref(), action)
        }
    }
}

fn cmd_interpreters(session: &dyn RemoteSession, json: bool) -> Result<i32> {
    let instances = discovery::list_interpreters(session)?;
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&instances).context("serialize interpreters")?
        );
    } else {
        for instance in &instances {
            println!("{}\t{}", instance.version, instance.executable_path);
        }
    }
    Ok(exit_codes::OK)
}

fn cmd_upload(session: &dyn RemoteSession, local: &Path, remote: &str) -> Result<i32> {
    if local.is_dir() {
        transfer::upload_directory(session, local, remote)?;
    } else {
        transfer::upload_file(session, local, remote)?;
    }
    Ok(exit_codes::OK)
}

fn cmd_venv(session: &dyn RemoteSession, cmd: VenvCommand) -> Result<i32> {
    match cmd {
        VenvCommand::Create(args) => {
            let interpreter = discovery::select_interpreter(session, &args.python)?;
            let env = venv::create(session, &interpreter, &args.path)?;
            println!("{}", env.remote_path);
            Ok(exit_codes::OK)
        }
        VenvCommand::Delete(env) => {
            venv::delete_at(session, &env.path)?;
            Ok(exit_codes::OK)
        }
        VenvCommand::Run { env, command } => {
            let command = shell::join(&command);
            let result = venv::run_at(session, &env.path, &command, RunOptions::PROBE)?;
            print!("{}", result.stdout);
            eprint!("{}", result.stderr);
            Ok(match result.exit_code {
                code @ 0..=255 => code,
                _ => exit_codes::FAILED,
            })
        }
    }
}

fn cmd_install(session: &dyn RemoteSession, cmd: InstallCommand) -> Result<i32> {
    match cmd {
        InstallCommand::Packages { env, names } => {
            packages::install_packages(session, &resolve_env(session, &env)?, &names)?;
        }
        InstallCommand::Local { env, dir } => {
            packages::install_local_package(session, &resolve_env(session, &env)?, &dir)?;
        }
        InstallCommand::Git { env, url } => {
            packages::install_from_source_control(session, &resolve_env(session, &env)?, &url)?;
        }
    }
    Ok(exit_codes::OK)
}

fn cmd_service(
    config: &DeployConfig,
    session: &dyn RemoteSession,
    action: ServiceAction,
) -> Result<i32> {
    match action {
        ServiceAction::Install => supervisor::install(session)?,
        ServiceAction::Check => {
            if !supervisor::is_installed(session)? {
                println!("supervisor is not installed");
                return Ok(exit_codes::NOT_INSTALLED);
            }
            println!("supervisor is installed");
        }
        ServiceAction::Deploy { name } => {
            supervisor::deploy(session, config.find_service(&name)?)?;
        }
        ServiceAction::Start { name } => {
            print!("{}", supervisor::start(session, &name)?.stdout);
        }
        ServiceAction::Stop { name } => {
            print!("{}", supervisor::stop(session, &name)?.stdout);
        }
        ServiceAction::Restart { name } => {
            print!("{}", supervisor::restart(session, &name)?.stdout);
        }
        ServiceAction::Status { name } => {
            let result = supervisor::status(session, name.as_deref())?;
            print!("{}", result.stdout);
            if !result.success() {
                return Ok(exit_codes::FAILED);
            }
        }
    }
    Ok(exit_codes::OK)
}

/// The environment at `--venv`, bound to the interpreter matching `--python`.
fn resolve_env(session: &dyn RemoteSession, args: &EnvArgs) -> Result<VirtualEnvironment> {
    let interpreter = discovery::select_interpreter(session, &args.python)?;
    Ok(venv::describe(&interpreter, &args.path))
}

/// Invalid credentials or definitions map to [`exit_codes::INVALID`];
/// everything else is a failed operation.
fn error_exit_code(err: &anyhow::Error) -> i32 {
    let invalid = err.chain().any(|cause| {
        matches!(
            cause.downcast_ref::<DeployError>(),
            Some(
                DeployError::AuthenticationConfigInvalid(_)
                    | DeployError::InvalidServiceDefinition(_)
            )
        )
    });
    if invalid {
        exit_codes::INVALID
    } else {
        exit_codes::FAILED
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use deployer::test_support::FakeSession;

    #[test]
    fn parse_defaults_to_deploy_toml() {
        let cli = Cli::parse_from(["deployer", "interpreters"]);
        assert_eq!(cli.config, PathBuf::from("deploy.toml"));
        assert_eq!(cli.verbose, 0);
        assert!(matches!(cli.command, Command::Interpreters { json: false }));
    }

    #[test]
    fn parse_global_flags_after_subcommand() {
        let cli = Cli::parse_from(["deployer", "interpreters", "--json", "-vv", "-c", "x.toml"]);
        assert_eq!(cli.config, PathBuf::from("x.toml"));
        assert_eq!(cli.verbose, 2);
        assert!(matches!(cli.command, Command::Interpreters { json: true }));
    }

    #[test]
    fn parse_venv_run_keeps_trailing_words() {
        let cli = Cli::parse_from([
            "deployer", "venv", "run", "--venv", "/srv/app/venv", "--", "python", "-c", "print(1)",
        ]);
        match cli.command {
            Command::Venv(VenvCommand::Run { env, command }) => {
                assert_eq!(env.path, "/srv/app/venv");
                assert_eq!(command, vec!["python", "-c", "print(1)"]);
            }
            _ => panic!("expected venv run"),
        }
    }

    #[test]
    fn parse_install_packages() {
        let cli = Cli::parse_from([
            "deployer", "install", "packages", "--venv", "/v", "--python", "3.11", "flask", "gunicorn",
        ]);
        match cli.command {
            Command::Install(InstallCommand::Packages { env, names }) => {
                assert_eq!(env.python, "3.11");
                assert_eq!(names, vec!["flask", "gunicorn"]);
            }
            _ => panic!("expected install packages"),
        }
    }

    #[test]
    fn parse_service_status_name_is_optional() {
        let cli = Cli::parse_from(["deployer", "service", "status"]);
        assert!(matches!(
            cli.command,
            Command::Service(ServiceCommand::Remote(ServiceAction::Status { name: None }))
        ));
        let cli = Cli::parse_from(["deployer", "service", "status", "worker"]);
        assert!(matches!(
            cli.command,
            Command::Service(ServiceCommand::Remote(ServiceAction::Status { name: Some(ref n) }))
                if n == "worker"
        ));
    }

    #[test]
    fn parse_service_render_and_actions_share_one_namespace() {
        let cli = Cli::parse_from(["deployer", "service", "render", "worker"]);
        assert!(matches!(
            cli.command,
            Command::Service(ServiceCommand::Render { ref name }) if name == "worker"
        ));
        let cli = Cli::parse_from(["deployer", "service", "deploy", "worker"]);
        assert!(matches!(
            cli.command,
            Command::Service(ServiceCommand::Remote(ServiceAction::Deploy { .. }))
        ));
    }

    #[test]
    fn venv_delete_needs_no_interpreters() {
        let session = FakeSession::new();
        let cli = Cli::parse_from(["deployer", "venv", "delete", "--venv", "/srv/app/venv"]);
        let Command::Venv(cmd) = cli.command else {
            panic!("expected venv command");
        };
        assert_eq!(cmd_venv(&session, cmd).expect("delete"), exit_codes::OK);
        assert_eq!(session.commands(), vec!["rm -rf /srv/app/venv"]);
    }

    #[test]
    fn venv_run_quotes_each_word() {
        let session = FakeSession::new();
        session.add_file("/srv/app/venv/bin/activate", b"");
        let cli = Cli::parse_from([
            "deployer", "venv", "run", "--venv", "/srv/app/venv", "--", "printf", "%s|", "a b",
            "(x)", ";",
        ]);
        let Command::Venv(cmd) = cli.command else {
            panic!("expected venv command");
        };
        assert_eq!(cmd_venv(&session, cmd).expect("run"), exit_codes::OK);
        assert_eq!(
            session.commands(),
            vec![". /srv/app/venv/bin/activate && printf '%s|' 'a b' '(x)' ';'"]
        );
    }

    #[test]
    fn invalid_definitions_map_to_invalid_exit_code() {
        let err = anyhow::Error::new(DeployError::InvalidServiceDefinition("bad".into()))
            .context("validate deploy.toml");
        assert_eq!(error_exit_code(&err), exit_codes::INVALID);

        let err = anyhow::Error::new(DeployError::RemoteCommandFailed {
            command: "supervisorctl update".into(),
            exit_code: 2,
            stderr: String::new(),
        });
        assert_eq!(error_exit_code(&err), exit_codes::FAILED);
        assert_eq!(error_exit_code(&anyhow!("boom")), exit_codes::FAILED);
    }
}
