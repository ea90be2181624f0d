//! Deterministic, pure logic shared by the deployer operations.
//!
//! Core modules must be free of I/O side effects. They build command strings,
//! parse listings and render config text, returning deterministic outputs
//! suitable for tests.

pub mod auth;
pub mod host_key;
pub mod interpreter;
pub mod paths;
pub mod shell;
pub mod supervisor_config;
pub mod types;
