//! Small formatting and path helpers shared by the commands.

use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};

/// Formats a byte count with binary units, like `1.500 MiB`.
pub fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        return format!("{bytes} B");
    }
    let mut value = bytes as f64 / 1024.0;
    let mut exp = 0usize;
    while value >= 1024.0 && exp < b"KMGTPE".len() - 1 {
        value /= 1024.0;
        exp += 1;
    }
    format!("{value:.3} {}iB", b"KMGTPE"[exp] as char)
}

/// Joins path segments with `/`, dropping empty parts.
pub fn join_remote_path(parts: &[&str]) -> String {
    parts
        .iter()
        .flat_map(|p| p.split('/'))
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

/// Builds the public link for an uploaded file, for remotes with a site
/// serving their drive content.
pub fn download_url(public_base_url: &str, remote_path: &str) -> String {
    let encoded = remote_path
        .split('/')
        .filter(|s| !s.is_empty())
        .map(|segment| utf8_percent_encode(segment, NON_ALPHANUMERIC).to_string())
        .collect::<Vec<_>>()
        .join("/");
    format!("{}/{}", public_base_url.trim_end_matches('/'), encoded)
}
