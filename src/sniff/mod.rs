//! Text/binary classifier.
//!
//! The verdict is computed from at most [`SNIFF_LEN`] bytes at the start of
//! a file.  Rules, in order, first match wins:
//!
//! 1. Any NUL byte → binary.
//! 2. A recognised content signature (`infer`) in the executable, image,
//!    audio, video, or font classes → binary.
//! 3. Lossy UTF-8 decode; if no code point is printable, or more than 30%
//!    are non-printable, → binary.
//! 4. Otherwise → text.
//!
//! This is a best-effort heuristic: a wrong verdict on pathological input
//! is acceptable, a verdict is always produced.

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use infer::MatcherType;

/// Sample size read from the start of each candidate file.
pub const SNIFF_LEN: usize = 8192;
/// Verdict flips to binary strictly above this non-printable ratio.
pub const MAX_NON_PRINTABLE_RATIO: f64 = 0.30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Text,
    Binary,
}

impl FileKind {
    #[inline]
    pub fn is_binary(self) -> bool {
        matches!(self, FileKind::Binary)
    }
}

/// Classify a byte sample.  An empty sample is text.
pub fn classify(sample: &[u8]) -> FileKind {
    if sample.is_empty() {
        return FileKind::Text;
    }
    if sample.contains(&0x00) {
        return FileKind::Binary;
    }
    if let Some(sig) = infer::get(sample) {
        if binary_signature(&sig) {
            return FileKind::Binary;
        }
    }
    printable_verdict(sample)
}

/// Read the sniff sample of `path` and classify it.
pub fn sniff_file(path: &Path) -> io::Result<FileKind> {
    let f = File::open(path)?;
    let mut sample = Vec::with_capacity(SNIFF_LEN);
    f.take(SNIFF_LEN as u64).read_to_end(&mut sample)?;
    Ok(classify(&sample))
}

fn binary_signature(sig: &infer::Type) -> bool {
    matches!(
        sig.matcher_type(),
        MatcherType::App
            | MatcherType::Image
            | MatcherType::Audio
            | MatcherType::Video
            | MatcherType::Font
    ) || sig.mime_type() == "application/octet-stream"
}

fn printable_verdict(sample: &[u8]) -> FileKind {
    let text = String::from_utf8_lossy(sample);
    let mut printable = 0u32;
    let mut non_printable = 0u32;
    for ch in text.chars() {
        match ch {
            '\n' | '\r' | '\t' => printable += 1,
            '\u{FFFD}' => non_printable += 1,
            c if (c as u32) < 0x20 || (c.is_control() && !c.is_whitespace()) => {
                non_printable += 1
            }
            _ => printable += 1,
        }
    }
    if printable == 0 {
        return FileKind::Binary;
    }
    let ratio = f64::from(non_printable) / f64::from(printable + non_printable);
    if ratio > MAX_NON_PRINTABLE_RATIO {
        FileKind::Binary
    } else {
        FileKind::Text
    }
}
