//! Session identity and authentication configuration.
//!
//! Credentials are validated once, when the target is built, so a bad
//! combination fails before any connection or command is attempted.

use std::fmt;
use std::path::PathBuf;

use super::host_key::HostKeyPolicy;
use crate::error::{DeployError, Result};

pub const DEFAULT_SSH_PORT: u16 = 22;

/// How a session authenticates. Exactly one method per session.
#[derive(Clone, PartialEq, Eq)]
pub enum AuthMethod {
    /// Login password. Also fed to `sudo -S` for elevated commands.
    Password(String),
    /// Private key file, with an optional passphrase.
    KeyFile {
        path: PathBuf,
        passphrase: Option<String>,
    },
}

impl AuthMethod {
    /// Build from optional parts, requiring exactly one of password or key file.
    pub fn from_parts(
        password: Option<String>,
        key_file: Option<PathBuf>,
        passphrase: Option<String>,
    ) -> Result<Self> {
        match (password, key_file) {
            (Some(_), Some(_)) => Err(DeployError::AuthenticationConfigInvalid(
                "set either a password or a key file, not both".to_string(),
            )),
            (None, None) => Err(DeployError::AuthenticationConfigInvalid(
                "a password or a key file is required".to_string(),
            )),
            (Some(password), None) => {
                if password.is_empty() {
                    return Err(DeployError::AuthenticationConfigInvalid(
                        "password must not be empty".to_string(),
                    ));
                }
                if passphrase.is_some() {
                    return Err(DeployError::AuthenticationConfigInvalid(
                        "a key passphrase only applies to key file authentication".to_string(),
                    ));
                }
                Ok(Self::Password(password))
            }
            (None, Some(path)) => Ok(Self::KeyFile { path, passphrase }),
        }
    }

    /// Password usable for `sudo -S`, if the session has one.
    pub fn sudo_password(&self) -> Option<&str> {
        match self {
            Self::Password(password) => Some(password),
            Self::KeyFile { .. } => None,
        }
    }
}

// Never print secrets.
impl fmt::Debug for AuthMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Password(_) => f.write_str("Password(<redacted>)"),
            Self::KeyFile { path, passphrase } => f
                .debug_struct("KeyFile")
                .field("path", path)
                .field("passphrase", &passphrase.as_ref().map(|_| "<redacted>"))
                .finish(),
        }
    }
}

/// Identity of a remote session: (host, user, port, auth), plus how the
/// server's host key is checked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionTarget {
    pub host: String,
    pub user: String,
    pub port: u16,
    pub auth: AuthMethod,
    pub host_key: HostKeyPolicy,
}

impl SessionTarget {
    pub fn new(
        host: impl Into<String>,
        user: impl Into<String>,
        port: u16,
        auth: AuthMethod,
    ) -> Result<Self> {
        let host = host.into();
        let user = user.into();
        if host.trim().is_empty() {
            return Err(DeployError::AuthenticationConfigInvalid(
                "host must not be empty".to_string(),
            ));
        }
        if user.trim().is_empty() {
            return Err(DeployError::AuthenticationConfigInvalid(
                "user must not be empty".to_string(),
            ));
        }
        if port == 0 {
            return Err(DeployError::AuthenticationConfigInvalid(
                "port must be > 0".to_string(),
            ));
        }
        Ok(Self {
            host,
            user,
            port,
            auth,
            host_key: HostKeyPolicy::default(),
        })
    }

    pub fn with_host_key(mut self, policy: HostKeyPolicy) -> Self {
        self.host_key = policy;
        self
    }

    /// `user@host:port`, for logs.
    pub fn display_name(&self) -> String {
        format!("{}@{}:{}", self.user, self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_only_is_accepted() {
        let auth = AuthMethod::from_parts(Some("s3cret".into()), None, None).expect("auth");
        assert_eq!(auth.sudo_password(), Some("s3cret"));
    }

    #[test]
    fn key_file_only_is_accepted() {
        let auth = AuthMethod::from_parts(None, Some("/keys/id_ed25519".into()), None)
            .expect("auth");
        assert_eq!(auth.sudo_password(), None);
        assert!(matches!(auth, AuthMethod::KeyFile { .. }));
    }

    #[test]
    fn both_credentials_are_rejected() {
        let err = AuthMethod::from_parts(Some("pw".into()), Some("/keys/id".into()), None)
            .unwrap_err();
        assert!(matches!(err, DeployError::AuthenticationConfigInvalid(_)));
        assert!(err.to_string().contains("not both"));
    }

    #[test]
    fn missing_credentials_are_rejected() {
        let err = AuthMethod::from_parts(None, None, None).unwrap_err();
        assert!(matches!(err, DeployError::AuthenticationConfigInvalid(_)));
    }

    #[test]
    fn passphrase_without_key_is_rejected() {
        let err = AuthMethod::from_parts(Some("pw".into()), None, Some("phrase".into()))
            .unwrap_err();
        assert!(err.to_string().contains("passphrase"));
    }

    #[test]
    fn debug_redacts_secrets() {
        let auth = AuthMethod::from_parts(Some("hunter2".into()), None, None).expect("auth");
        let target = SessionTarget::new("10.0.0.1", "deploy", 22, auth).expect("target");
        let rendered = format!("{target:?}");
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("<redacted>"));
        assert_eq!(target.display_name(), "deploy@10.0.0.1:22");
    }

    #[test]
    fn targets_check_known_hosts_unless_told_otherwise() {
        let auth = AuthMethod::from_parts(Some("pw".into()), None, None).expect("auth");
        let target = SessionTarget::new("10.0.0.1", "deploy", 22, auth).expect("target");
        assert_eq!(target.host_key, HostKeyPolicy::default());
        let pinned = HostKeyPolicy::fingerprint("SHA256:abc").expect("pin");
        assert_eq!(target.with_host_key(pinned.clone()).host_key, pinned);
    }

    #[test]
    fn empty_host_is_rejected() {
        let auth = AuthMethod::from_parts(Some("pw".into()), None, None).expect("auth");
        let err = SessionTarget::new(" ", "deploy", 22, auth).unwrap_err();
        assert!(err.to_string().contains("host"));
    }
}
