//! Pack pipeline: walk, exclude, classify, encode.
//!
//! The walk is sequential and sorted per directory.  Excluded directories
//! are pruned, not merely filtered: the walker never descends into them,
//! so nothing beneath an excluded directory can leak into the archive.
//!
//! Error policy is deliberately asymmetric to unpacking: a file that cannot
//! be statted, opened, or sampled is skipped quietly (best-effort
//! inclusion), while a write error on the output stream aborts the whole
//! run.  A read error after a record's header has been written also aborts;
//! the record cannot be unwritten.

use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

use walkdir::WalkDir;

use crate::codec;
use crate::exclude::ExcludeSet;
use crate::sniff::{self, FileKind};

/// Counters reported after a pack run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PackSummary {
    /// Records written to the archive.
    pub packed: usize,
    /// Files skipped by the binary classifier.
    pub skipped_binary: usize,
    /// Files (or walk entries) skipped because they could not be read.
    pub skipped_unreadable: usize,
}

/// Pack every included regular file under `root` into `out`.
pub fn pack_tree<W: Write>(
    root: &Path,
    excludes: &ExcludeSet,
    out: &mut W,
) -> io::Result<PackSummary> {
    let mut summary = PackSummary::default();
    let walker = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| match rel_slash(root, entry.path()) {
            // The root itself is never excluded.
            None => true,
            Some(rel) => !excludes.is_excluded(&rel),
        });

    for entry in walker {
        let entry = match entry {
            Ok(e) => e,
            Err(_) => {
                summary.skipped_unreadable += 1;
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let rel = match rel_slash(root, entry.path()) {
            Some(rel) => rel,
            None => continue,
        };
        match sniff::sniff_file(entry.path()) {
            Ok(FileKind::Binary) => {
                summary.skipped_binary += 1;
                continue;
            }
            Ok(FileKind::Text) => {}
            Err(_) => {
                summary.skipped_unreadable += 1;
                continue;
            }
        }
        let mode = match entry.metadata() {
            Ok(meta) => mode_bits(&meta),
            Err(_) => {
                summary.skipped_unreadable += 1;
                continue;
            }
        };
        let mut content = match File::open(entry.path()) {
            Ok(f) => f,
            Err(_) => {
                summary.skipped_unreadable += 1;
                continue;
            }
        };
        codec::encode_record(&rel, mode, &mut content, out)?;
        summary.packed += 1;
    }
    Ok(summary)
}

/// Slash-separated path of `path` relative to `root`; `None` for the root
/// itself.
fn rel_slash(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    if rel.as_os_str().is_empty() {
        return None;
    }
    let segments: Vec<String> = rel
        .iter()
        .map(|seg| seg.to_string_lossy().into_owned())
        .collect();
    Some(segments.join("/"))
}

#[cfg(unix)]
fn mode_bits(meta: &std::fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode() & 0o7777
}

#[cfg(not(unix))]
fn mode_bits(_meta: &std::fs::Metadata) -> u32 {
    crate::record::DEFAULT_MODE
}
