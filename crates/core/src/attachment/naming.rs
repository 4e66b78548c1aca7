//! Storage key generation.
//!
//! Keys look like `{folder}/{stem}-{id}.{ext}` where `stem` is the
//! sanitized client file name and `id` is a fresh UUID v4 in simple form.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use uuid::Uuid;

/// Longest stem kept from a client file name, in characters.
const MAX_STEM_CHARS: usize = 100;

/// Longest extension kept, in characters.
const MAX_EXT_CHARS: usize = 16;

static RESERVED_NAMES: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    HashSet::from([
        "con", "prn", "aux", "nul", "com1", "com2", "com3", "com4", "com5", "com6", "com7",
        "com8", "com9", "lpt1", "lpt2", "lpt3", "lpt4", "lpt5", "lpt6", "lpt7", "lpt8", "lpt9",
    ])
});

/// Sanitize a file name for use inside a storage key.
///
/// Removes path separators, characters invalid on common filesystems and
/// control characters. Leading dots and trailing dots/spaces are trimmed.
/// Reserved device names sanitize to the empty string.
#[must_use]
pub fn sanitize(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .filter(|c| !matches!(c, '/' | '\\' | '?' | '<' | '>' | ':' | '*' | '|' | '"'))
        .filter(|c| !c.is_control())
        .collect();

    let trimmed = cleaned
        .trim_start_matches('.')
        .trim_end_matches(['.', ' '])
        .trim_start();

    if RESERVED_NAMES.contains(trimmed.to_ascii_lowercase().as_str()) {
        return String::new();
    }

    trimmed.chars().take(MAX_STEM_CHARS).collect()
}

/// Drop the last extension of a file name (`cat.tar.gz` -> `cat.tar`).
#[must_use]
pub fn strip_extension(name: &str) -> &str {
    match name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => name,
    }
}

/// Reduce an extension to lowercase ASCII alphanumerics.
#[must_use]
pub fn sanitize_extname(extname: &str) -> String {
    extname
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .take(MAX_EXT_CHARS)
        .collect::<String>()
        .to_ascii_lowercase()
}

/// Generate a fresh storage key.
#[must_use]
pub fn generate(client_name: Option<&str>, extname: &str, folder: Option<&str>) -> String {
    let id = Uuid::new_v4().simple().to_string();
    let stem = client_name
        .map(|name| sanitize(strip_extension(name)))
        .unwrap_or_default();

    let mut file_name = if stem.is_empty() {
        id
    } else {
        format!("{stem}-{id}")
    };
    let extname = sanitize_extname(extname);
    if !extname.is_empty() {
        file_name.push('.');
        file_name.push_str(&extname);
    }

    match folder.map(|f| f.trim_matches('/')).filter(|f| !f.is_empty()) {
        Some(folder) => format!("{folder}/{file_name}"),
        None => file_name,
    }
}
