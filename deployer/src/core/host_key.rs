//! Server host key policy and OpenSSH-style SHA-256 fingerprints.

use std::path::PathBuf;

use base64::Engine;
use base64::engine::general_purpose::STANDARD_NO_PAD;

use crate::error::{DeployError, Result};

/// Location of the user's known hosts file, before `~` expansion.
pub const DEFAULT_KNOWN_HOSTS: &str = "~/.ssh/known_hosts";

const FINGERPRINT_PREFIX: &str = "SHA256:";

/// How the server's host key is verified after the handshake and before any
/// credentials are sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostKeyPolicy {
    /// The key must hash to this `SHA256:<base64>` fingerprint.
    Fingerprint(String),
    /// The key must be listed for the host in this OpenSSH known hosts file.
    KnownHosts(PathBuf),
    /// No verification.
    AcceptAny,
}

impl Default for HostKeyPolicy {
    fn default() -> Self {
        Self::KnownHosts(PathBuf::from(DEFAULT_KNOWN_HOSTS))
    }
}

impl HostKeyPolicy {
    /// Pin a fingerprint as printed by `ssh-keygen -lf` (`SHA256:` prefix and
    /// trailing `=` padding are optional).
    pub fn fingerprint(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        let body = match trimmed.get(..FINGERPRINT_PREFIX.len()) {
            Some(prefix) if prefix.eq_ignore_ascii_case(FINGERPRINT_PREFIX) => {
                &trimmed[FINGERPRINT_PREFIX.len()..]
            }
            _ => trimmed,
        };
        let body = body.trim().trim_end_matches('=');
        if body.is_empty() {
            return Err(DeployError::AuthenticationConfigInvalid(
                "host key fingerprint must not be empty".to_string(),
            ));
        }
        Ok(Self::Fingerprint(format!("{FINGERPRINT_PREFIX}{body}")))
    }
}

/// `SHA256:<unpadded base64>` of a raw host key hash.
pub fn fingerprint_sha256(hash: &[u8]) -> String {
    format!("{FINGERPRINT_PREFIX}{}", STANDARD_NO_PAD.encode(hash))
}

/// Compare a pinned fingerprint with the key hash the server presented.
pub fn verify_fingerprint(host: &str, expected: &str, hash: &[u8]) -> Result<()> {
    let actual = fingerprint_sha256(hash);
    if actual == expected {
        return Ok(());
    }
    Err(DeployError::HostKeyRejected {
        host: host.to_string(),
        reason: format!("fingerprint {actual} does not match pinned {expected}"),
    })
}
