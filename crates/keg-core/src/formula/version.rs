//! Version detection from source archive URLs.
//!
//! Handles the two common layouts: tag archives (`.../v0.5.0.tar.gz`) and
//! named tarballs (`.../hydrophone-0.5.0.tar.gz`).

const ARCHIVE_SUFFIXES: &[&str] = &[
    ".tar.gz", ".tgz", ".tar.bz2", ".tbz", ".tar.xz", ".txz", ".tar", ".zip",
];

/// Detects a version from the last path segment of `url`.
///
/// Returns `None` when no segment-local token starting with a digit exists.
pub fn version_from_url(url: &str) -> Option<String> {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let file = path.trim_end_matches('/').rsplit('/').next()?;
    let stem = ARCHIVE_SUFFIXES
        .iter()
        .find_map(|suffix| file.strip_suffix(suffix))
        .unwrap_or(file);

    if let Some(v) = strip_tag_prefix(stem) {
        return Some(v.to_string());
    }
    stem.match_indices('-')
        .map(|(i, _)| &stem[i + 1..])
        .find_map(strip_tag_prefix)
        .map(str::to_string)
}

/// `"v1.2"` and `"1.2"` both yield `"1.2"`; anything else yields `None`.
fn strip_tag_prefix(s: &str) -> Option<&str> {
    let s = s.strip_prefix('v').unwrap_or(s);
    if s.chars().next().is_some_and(|c| c.is_ascii_digit()) {
        Some(s)
    } else {
        None
    }
}
