//! Side-effecting operations against a remote host.
//!
//! Every operation takes the session by reference and performs its remote
//! round-trips sequentially. Nothing here retries or times out on its own.

pub mod config;
pub mod discovery;
pub mod local;
pub mod packages;
pub mod process;
pub mod remote_fs;
pub mod session;
pub mod ssh;
pub mod supervisor;
pub mod transfer;
pub mod venv;
