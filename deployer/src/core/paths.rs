//! Remote (POSIX) path helpers and fixed remote locations.

use std::path::Path;

/// Root under which uploads are staged before being installed or moved.
pub const STAGING_ROOT: &str = "/tmp";

/// Parent directory of a remote path. Returns `/` for top-level entries and
/// `.` for bare file names.
pub fn parent(remote: &str) -> &str {
    let trimmed = trim_trailing_slashes(remote);
    match trimmed.rfind('/') {
        Some(0) => "/",
        Some(idx) => &trimmed[..idx],
        None => ".",
    }
}

/// Final segment of a remote path, ignoring trailing slashes.
pub fn file_name(remote: &str) -> &str {
    let trimmed = trim_trailing_slashes(remote);
    match trimmed.rfind('/') {
        Some(idx) => &trimmed[idx + 1..],
        None => trimmed,
    }
}

/// Join a remote base with a relative local path, always using `/`.
pub fn join(base: &str, relative: &Path) -> String {
    let mut out = trim_trailing_slashes(base).to_string();
    for component in relative.components() {
        let part = component.as_os_str().to_string_lossy();
        if part == "." {
            continue;
        }
        out.push('/');
        out.push_str(&part);
    }
    out
}

/// Staging location for an artifact: `<STAGING_ROOT>/<name>`.
pub fn staging_path(artifact: &str) -> String {
    format!("{STAGING_ROOT}/{artifact}")
}

fn trim_trailing_slashes(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() && path.starts_with('/') {
        "/"
    } else {
        trimmed
    }
}
