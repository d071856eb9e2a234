//! Wire grammar for one packed record.
//!
//! # Framing
//! A record is a header line, a base64 content body, and an end-marker line:
//!
//! ```text
//! --- FILE path_b64=<base64(relative/path)> mode=0644 ---
//! aGVsbG8K
//! --- END FILE ---
//! ```
//!
//! The path travels as a base64 token and the body as base64 text, so the
//! archive contains only base64 alphabet characters plus newlines between
//! the markers; file content can never collide with the framing.
//!
//! # Header strictness
//! The header grammar is a fixed regular expression: literal prefix, one
//! whitespace-free path token, ` mode=`, 3–4 octal digits, ` ---`, nothing
//! trailing.  A line that starts with the marker prefix but fails the
//! grammar is a fatal format error; any other line is plain content to be
//! skipped while scanning for the next record.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::PathBuf;
use thiserror::Error;

/// Prefix of every record header line.
pub const START_MARK: &str = "--- FILE";
/// Line that closes every record body.
pub const END_MARK: &str = "--- END FILE ---";
/// Permission bits applied when the recorded mode cannot be parsed.
pub const DEFAULT_MODE: u32 = 0o644;

static HEADER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^--- FILE path_b64=(\S+) mode=([0-7]{3,4}) ---$")
        .expect("header grammar is a valid regex")
});

#[derive(Error, Debug)]
pub enum FormatError {
    #[error("malformed header: {0:?}")]
    MalformedHeader(String),
    #[error("decode path base64: {0}")]
    PathToken(base64::DecodeError),
    #[error("archive path is not valid UTF-8")]
    PathNotUtf8,
    #[error("unsafe path in archive: {0:?}")]
    UnsafePath(String),
}

/// Parsed header of one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordHeader {
    /// Slash-separated path, relative to the archive root.
    pub path: String,
    /// POSIX permission bits.
    pub mode: u32,
}

/// Render the header line for `rel` with permission bits `mode`.
pub fn format_header(rel: &str, mode: u32) -> String {
    format!(
        "{} path_b64={} mode={:04o} ---",
        START_MARK,
        STANDARD.encode(rel.as_bytes()),
        mode & 0o7777,
    )
}

/// Parse a line already known to start with [`START_MARK`].
pub fn parse_header(line: &str) -> Result<RecordHeader, FormatError> {
    let caps = HEADER_RE
        .captures(line)
        .ok_or_else(|| FormatError::MalformedHeader(line.to_owned()))?;
    let raw = STANDARD
        .decode(&caps[1])
        .map_err(FormatError::PathToken)?;
    let path = String::from_utf8(raw).map_err(|_| FormatError::PathNotUtf8)?;
    // Mode is best-effort: the grammar already constrains it to octal
    // digits, but a parse failure never sinks the record.
    let mode = u32::from_str_radix(&caps[2], 8).unwrap_or(DEFAULT_MODE);
    Ok(RecordHeader { path, mode })
}

/// Lexically normalize a slash-separated relative path.
///
/// Returns `None` for anything that may not be written under a destination
/// root: absolute paths, the empty path, and any path whose `..` segments
/// climb above the root.  This runs on every record, whether or not `..`
/// appears in the raw string.
pub fn safe_relative(rel: &str) -> Option<PathBuf> {
    if rel.is_empty() || rel.starts_with('/') {
        return None;
    }
    let mut parts: Vec<&str> = Vec::new();
    for seg in rel.split('/') {
        match seg {
            "" | "." => continue,
            ".." => {
                parts.pop()?;
            }
            other => parts.push(other),
        }
    }
    if parts.is_empty() {
        return None;
    }
    Some(parts.iter().collect())
}
