//! Deployment configuration stored in `deploy.toml`.
//!
//! The file names the target host and the services to deploy. Secrets never
//! live in it: `password_env` and `key_passphrase_env` name environment
//! variables that are read when the session is opened.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::local::LocalSession;
use super::session::RemoteSession;
use super::ssh::SshSession;
use crate::core::auth::{AuthMethod, DEFAULT_SSH_PORT, SessionTarget};
use crate::core::host_key::{DEFAULT_KNOWN_HOSTS, HostKeyPolicy};
use crate::core::supervisor_config;
use crate::core::types::ServiceDefinition;

pub const DEFAULT_CONFIG_FILE: &str = "deploy.toml";

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    #[default]
    Ssh,
    /// Run against this machine with `sh -c`; no SSH server needed.
    Local,
}

/// Top-level `deploy.toml`. The `[host]` table is required.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeployConfig {
    pub host: HostConfig,
    #[serde(default)]
    pub service: Vec<ServiceDefinition>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct HostConfig {
    pub transport: Transport,
    pub address: String,
    pub user: String,
    pub port: u16,

    /// Environment variable holding the login (and sudo) password.
    pub password_env: Option<String>,

    /// Private key for key-file auth. A leading `~/` expands to `$HOME`.
    pub key_file: Option<PathBuf>,

    /// Environment variable holding the key passphrase.
    pub key_passphrase_env: Option<String>,

    /// Pinned `SHA256:` host key fingerprint. Takes precedence over
    /// `known_hosts_file`.
    pub host_key_fingerprint: Option<String>,

    /// OpenSSH known hosts file checked when no fingerprint is pinned.
    pub known_hosts_file: PathBuf,

    /// Skip host key verification entirely.
    pub insecure_accept_any_host_key: bool,

    pub connect_timeout_secs: u64,

    /// Per-command timeout for the local transport; 0 disables it.
    pub command_timeout_secs: u64,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            transport: Transport::Ssh,
            address: String::new(),
            user: String::new(),
            port: DEFAULT_SSH_PORT,
            password_env: None,
            key_file: None,
            key_passphrase_env: None,
            host_key_fingerprint: None,
            known_hosts_file: PathBuf::from(DEFAULT_KNOWN_HOSTS),
            insecure_accept_any_host_key: false,
            connect_timeout_secs: 30,
            command_timeout_secs: 0,
        }
    }
}

impl DeployConfig {
    pub fn validate(&self) -> Result<()> {
        self.host.validate()?;
        let mut seen = BTreeSet::new();
        for service in &self.service {
            supervisor_config::validate(service)?;
            if !seen.insert(service.name.as_str()) {
                bail!("duplicate service name '{}'", service.name);
            }
        }
        Ok(())
    }

    /// Look up a `[[service]]` entry by name.
    pub fn find_service(&self, name: &str) -> Result<&ServiceDefinition> {
        self.service
            .iter()
            .find(|service| service.name == name)
            .ok_or_else(|| anyhow!("no service named '{name}' in config"))
    }

    /// Open a session to the configured host, reading secrets from the
    /// process environment.
    pub fn open_session(&self) -> Result<Box<dyn RemoteSession>> {
        self.open_session_with(|name| std::env::var(name).ok())
    }

    pub fn open_session_with(
        &self,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Box<dyn RemoteSession>> {
        match self.host.transport {
            Transport::Local => {
                let mut session = LocalSession::new();
                if let Some(password) = self.host.read_password(&env)? {
                    session = session.with_sudo_password(password);
                }
                if self.host.command_timeout_secs > 0 {
                    session = session
                        .with_command_timeout(Duration::from_secs(self.host.command_timeout_secs));
                }
                info!("using local transport");
                Ok(Box::new(session))
            }
            Transport::Ssh => {
                let target = self.host.session_target(&env)?;
                let session = SshSession::connect(
                    target,
                    Duration::from_secs(self.host.connect_timeout_secs),
                )
                .with_context(|| format!("connect to {}", self.host.address))?;
                Ok(Box::new(session))
            }
        }
    }
}

impl HostConfig {
    pub fn validate(&self) -> Result<()> {
        if self.transport == Transport::Local {
            if self.key_file.is_some() {
                bail!("host.key_file is not used by the local transport");
            }
            return Ok(());
        }
        if self.address.trim().is_empty() {
            bail!("host.address must be set for the ssh transport");
        }
        if self.user.trim().is_empty() {
            bail!("host.user must be set for the ssh transport");
        }
        if self.port == 0 {
            bail!("host.port must be > 0");
        }
        if self.connect_timeout_secs == 0 {
            bail!("host.connect_timeout_secs must be > 0");
        }
        if self.insecure_accept_any_host_key && self.host_key_fingerprint.is_some() {
            bail!("host.host_key_fingerprint conflicts with host.insecure_accept_any_host_key");
        }
        match (&self.password_env, &self.key_file) {
            (Some(_), Some(_)) => bail!("set either host.password_env or host.key_file, not both"),
            (None, None) => bail!("one of host.password_env or host.key_file is required"),
            (Some(_), None) if self.key_passphrase_env.is_some() => {
                bail!("host.key_passphrase_env requires host.key_file")
            }
            _ => Ok(()),
        }
    }

    /// Resolve credentials and build the SSH session identity.
    pub fn session_target(&self, env: impl Fn(&str) -> Option<String>) -> Result<SessionTarget> {
        let password = self.read_password(&env)?;
        let passphrase = match &self.key_passphrase_env {
            Some(var) => Some(
                env(var.as_str())
                    .with_context(|| format!("environment variable {var} is not set"))?,
            ),
            None => None,
        };
        let key_file = self.key_file.as_deref().map(expand_home);
        let auth = AuthMethod::from_parts(password, key_file, passphrase)?;
        let target = SessionTarget::new(&self.address, &self.user, self.port, auth)?;
        Ok(target.with_host_key(self.host_key_policy()?))
    }

    pub fn host_key_policy(&self) -> Result<HostKeyPolicy> {
        if let Some(fingerprint) = &self.host_key_fingerprint {
            return Ok(HostKeyPolicy::fingerprint(fingerprint)?);
        }
        if self.insecure_accept_any_host_key {
            return Ok(HostKeyPolicy::AcceptAny);
        }
        Ok(HostKeyPolicy::KnownHosts(expand_home(&self.known_hosts_file)))
    }

    fn read_password(&self, env: impl Fn(&str) -> Option<String>) -> Result<Option<String>> {
        match &self.password_env {
            Some(var) => {
                let value = env(var.as_str())
                    .with_context(|| format!("environment variable {var} is not set"))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }
}

/// Expand a leading `~` to `$HOME`. Other paths are returned unchanged.
pub fn expand_home(path: &Path) -> PathBuf {
    match (path.strip_prefix("~"), std::env::var_os("HOME")) {
        (Ok(rest), Some(home)) => PathBuf::from(home).join(rest),
        _ => path.to_path_buf(),
    }
}

/// Load and validate `deploy.toml`. A missing file is an error: there is no
/// usable default host.
pub fn load_config(path: &Path) -> Result<DeployConfig> {
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: DeployConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("validate {}", path.display()))?;
    Ok(cfg)
}
