/// Clean a raw review comment for storage.
///
/// Collapses whitespace runs to one space, trims, drops double quotes and
/// lowercases. Total over any input; the empty string maps to itself.
///
/// Quotes are stripped first; a quote between two spaces must not leave a
/// double space behind.
pub fn normalize_comment(raw: &str) -> String {
    let unquoted = raw.replace('"', "");
    unquoted
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}
