//! POSIX shell quoting for values interpolated into remote commands.

/// Quote `word` for a POSIX shell.
///
/// Words made only of characters that are never special to `sh` pass through
/// unchanged, so ordinary paths and package names keep readable commands.
/// Anything else is wrapped in single quotes.
pub fn quote(word: &str) -> String {
    if !word.is_empty() && word.chars().all(is_safe) {
        return word.to_string();
    }
    format!("'{}'", word.replace('\'', r"'\''"))
}

/// Quote each word and join with single spaces.
pub fn join<S: AsRef<str>>(words: &[S]) -> String {
    words
        .iter()
        .map(|w| quote(w.as_ref()))
        .collect::<Vec<_>>()
        .join(" ")
}

fn is_safe(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '/' | ':' | '@' | '%' | '+' | '=' | ',' | '-')
}
