//! Small string helpers shared by session naming and upload truncation.

use std::path::Path;

use crate::constants::TRUNCATION_MARKER;

/// Key under which per-directory state is stored.
pub fn path_key(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// Final component of `path`, or the whole path when it has none.
pub fn base_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path_key(path))
}

/// Normalize a fragment of a session name.
///
/// Lowercases, maps anything outside `[a-z0-9_-]` to `-`, collapses runs of
/// `-`, and trims `-` from both ends.
pub fn sanitize_name(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars().flat_map(char::to_lowercase) {
        let c = if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' {
            c
        } else {
            '-'
        };
        if c == '-' && out.ends_with('-') {
            continue;
        }
        out.push(c);
    }
    out.trim_matches('-').to_string()
}

/// Cut `text` to at most `max_chars` characters.
///
/// When cut, the result ends with [`TRUNCATION_MARKER`] and its total length
/// (marker included) stays within `max_chars`. Cuts always fall on a char
/// boundary.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let marker_len = TRUNCATION_MARKER.chars().count();
    if max_chars <= marker_len {
        return text.chars().take(max_chars).collect();
    }
    let mut out: String = text.chars().take(max_chars - marker_len).collect();
    out.push_str(TRUNCATION_MARKER);
    out
}
