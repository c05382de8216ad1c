//! Small formatting helpers shared by the analyzers and output modules.

use std::fmt::Write;

use ring::digest::{digest, SHA256};

/// Length of the identifiers shown to the user, in hex characters.
pub const SHORT_ID_LEN: usize = 6;

/// Formats a hardware address as colon-separated lowercase hex.
pub fn format_hw_addr(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(":")
}

/// Full lowercase hex SHA-256 of `data`.
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(digest(&SHA256, data).as_ref())
}

/// Short content-derived identifier, used for stored files and graph nodes.
pub fn short_hash(data: &[u8]) -> String {
    let mut id = sha256_hex(data);
    id.truncate(SHORT_ID_LEN);
    id
}

/// Appends `value` unless an equal element is already present.
/// Returns whether the list grew.
pub fn push_unique(list: &mut Vec<String>, value: &str) -> bool {
    if list.iter().any(|v| v == value) {
        return false;
    }
    list.push(value.to_string());
    true
}

/// Renders lines as a small ASCII tree:
///
/// ```text
/// |- first
/// |- second
/// '- last
/// ```
pub fn generate_tree<S: AsRef<str>>(lines: &[S]) -> String {
    let mut out = String::new();
    for (i, line) in lines.iter().enumerate() {
        let branch = if i + 1 < lines.len() { "|-" } else { "'-" };
        let _ = writeln!(out, "{} {}", branch, line.as_ref());
    }
    out
}
