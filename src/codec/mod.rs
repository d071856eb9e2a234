//! Record codec — encoder and decoder.
//!
//! # Encoder
//! [`encode_record`] writes one record to the output stream: the header
//! line, the content base64-encoded and wrapped at 76 columns, and the end
//! marker.  Content is streamed through in 57-byte groups, so every body
//! line except the last is padding-free and concatenating the lines yields
//! the base64 of the whole stream; nothing buffers the full file.
//!
//! # Decoder
//! [`decode_stream`] runs a three-state machine over the input lines:
//!
//! - `Scanning` — lines are ignored until one starts with the header
//!   marker; such a line must then satisfy the full header grammar.
//! - `HeaderParsed` — the record's path is checked against the destination
//!   root (every record, unconditionally) before anything touches disk.
//! - `ReadingContent` — body lines accumulate until the end marker; EOF
//!   first is a truncated archive and fatal.
//!
//! Each completed record is decoded into a temporary sibling file, given
//! its permission bits (best effort), and atomically renamed onto the
//! final path, so an interrupted unpack never leaves a partial file at a
//! final name.  All decoder errors are fatal for the whole run: a record
//! that breaks the grammar means a corrupt or adversarial archive, and
//! partial reconstruction is worse than none.

use std::fs::{self, File};
use std::io::{self, BufRead, Read, Write};
use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use thiserror::Error;

use crate::record::{self, FormatError, RecordHeader, END_MARK, START_MARK};

/// Raw bytes per base64 body line (76 encoded columns).
const LINE_GROUP: usize = 57;
/// Suffix of the temporary file a record is decoded into.
const TMP_SUFFIX: &str = ".tmp~ppk";

#[derive(Error, Debug)]
pub enum UnpackError {
    #[error(transparent)]
    Format(#[from] FormatError),
    #[error("decode content base64: {0}")]
    Payload(#[from] base64::DecodeError),
    #[error("archive ended inside record for {0:?}")]
    TruncatedRecord(String),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

// ── Encoder ──────────────────────────────────────────────────────────────────

/// Write one record for `rel` with permission bits `mode` and the bytes of
/// `content` to `out`.  Any error aborts the record mid-write; the caller
/// must treat the output stream as unusable afterwards.
pub fn encode_record<R, W>(rel: &str, mode: u32, content: &mut R, out: &mut W) -> io::Result<()>
where
    R: Read,
    W: Write,
{
    writeln!(out, "{}", record::format_header(rel, mode))?;
    let mut group = [0u8; LINE_GROUP];
    loop {
        let n = read_full(content, &mut group)?;
        if n == 0 {
            break;
        }
        out.write_all(STANDARD.encode(&group[..n]).as_bytes())?;
        out.write_all(b"\n")?;
        if n < LINE_GROUP {
            break;
        }
    }
    writeln!(out, "{END_MARK}")?;
    Ok(())
}

/// Fill `buf` as far as the reader allows; short only at EOF.
fn read_full<R: Read>(r: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match r.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

// ── Decoder ──────────────────────────────────────────────────────────────────

enum DecodeState {
    Scanning,
    HeaderParsed(RecordHeader),
    ReadingContent {
        header: RecordHeader,
        target: PathBuf,
        payload: String,
    },
}

/// Decode every record in `input`, recreating files under `dest`.
/// Returns the number of records written.
pub fn decode_stream<R: BufRead>(input: R, dest: &Path) -> Result<usize, UnpackError> {
    let mut lines = input.lines();
    let mut count = 0usize;
    let mut state = DecodeState::Scanning;
    loop {
        state = match state {
            DecodeState::Scanning => match lines.next().transpose()? {
                None => break,
                Some(line) if line.starts_with(START_MARK) => {
                    DecodeState::HeaderParsed(record::parse_header(&line)?)
                }
                Some(_) => DecodeState::Scanning,
            },
            DecodeState::HeaderParsed(header) => {
                let rel = record::safe_relative(&header.path)
                    .ok_or_else(|| FormatError::UnsafePath(header.path.clone()))?;
                DecodeState::ReadingContent {
                    target: dest.join(rel),
                    header,
                    payload: String::new(),
                }
            }
            DecodeState::ReadingContent {
                header,
                target,
                mut payload,
            } => match lines.next().transpose()? {
                None => return Err(UnpackError::TruncatedRecord(header.path)),
                Some(line) if line == END_MARK => {
                    write_record(&target, header.mode, &payload)?;
                    count += 1;
                    DecodeState::Scanning
                }
                Some(line) => {
                    payload.push_str(&line);
                    DecodeState::ReadingContent {
                        header,
                        target,
                        payload,
                    }
                }
            },
        };
    }
    Ok(count)
}

/// Temp-write, chmod, rename.  Nothing ever lands at `target` partially.
fn write_record(target: &Path, mode: u32, payload: &str) -> Result<(), UnpackError> {
    let content = STANDARD.decode(payload)?;
    if let Some(parent) = target.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let tmp = tmp_path(target);
    if let Err(e) = File::create(&tmp).and_then(|mut f| f.write_all(&content)) {
        let _ = fs::remove_file(&tmp);
        return Err(e.into());
    }
    apply_mode(&tmp, mode);
    if let Err(e) = fs::rename(&tmp, target) {
        let _ = fs::remove_file(&tmp);
        return Err(e.into());
    }
    Ok(())
}

fn tmp_path(target: &Path) -> PathBuf {
    let mut s = target.as_os_str().to_owned();
    s.push(TMP_SUFFIX);
    PathBuf::from(s)
}

/// Best effort: a mode that cannot be applied never sinks the record.
#[cfg(unix)]
fn apply_mode(path: &Path, mode: u32) {
    use std::os::unix::fs::PermissionsExt;
    let _ = fs::set_permissions(path, fs::Permissions::from_mode(mode & 0o7777));
}

#[cfg(not(unix))]
fn apply_mode(_path: &Path, _mode: u32) {}
