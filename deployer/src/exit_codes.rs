//! Stable exit codes for deployer CLI commands.

/// Command succeeded.
pub const OK: i32 = 0;
/// A remote or local operation failed.
pub const FAILED: i32 = 1;
/// The config file or command-line arguments were invalid.
pub const INVALID: i32 = 2;
/// `deployer service check` found no supervisor on the host.
pub const NOT_INSTALLED: i32 = 3;
