//! Remote deployment toolkit for interpreter-based services.
//!
//! Everything here operates over a single [`io::session::RemoteSession`]: a
//! serial command channel to one host. The crate keeps the same split the
//! operations need to stay testable:
//!
//! - **[`core`]**: Pure, deterministic logic (value types, shell quoting,
//!   interpreter selection, supervisor config rendering). No I/O.
//! - **[`io`]**: Side-effecting operations (sessions, uploads, virtual
//!   environments, package installs, supervisor management).
//!
//! Each `io` operation performs one host-state transition and checks current
//! state before mutating where idempotence matters.

pub mod core;
pub mod error;
pub mod exit_codes;
pub mod io;
pub mod logging;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use error::{DeployError, Result};
