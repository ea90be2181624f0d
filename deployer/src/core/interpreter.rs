//! Interpreter listing parsing and version-prefix selection.

use super::types::InterpreterInstance;

/// Glob matching installed interpreter binaries on the remote host.
pub const INTERPRETER_GLOB: &str = "/usr/bin/python3.*";

/// File-name prefix stripped to obtain the version string.
const BINARY_PREFIX: &str = "python";

/// Parse `ls` output (one path per line) into interpreter instances, keeping
/// the listing order.
pub fn parse_listing(stdout: &str) -> Vec<InterpreterInstance> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|path| {
            let file = path.rsplit('/').next().unwrap_or(path);
            let version = file.strip_prefix(BINARY_PREFIX).unwrap_or(file);
            InterpreterInstance {
                version: version.to_string(),
                executable_path: path.to_string(),
            }
        })
        .collect()
}

/// First instance whose version starts with `prefix`. No preference for exact
/// or longest matches: listing order decides.
pub fn select<'a>(
    instances: &'a [InterpreterInstance],
    prefix: &str,
) -> Option<&'a InterpreterInstance> {
    instances.iter().find(|i| i.version.starts_with(prefix))
}
