use packprompt::codec::{decode_stream, UnpackError};
use packprompt::exclude::ExcludeSet;
use packprompt::pack::pack_tree;
use packprompt::record::FormatError;
use std::collections::BTreeMap;
use std::fs;
use std::io::Cursor;
use std::path::Path;
use tempfile::TempDir;

fn write_tree(root: &Path, files: &[(&str, &[u8])]) {
    for (rel, content) in files {
        let full = root.join(rel);
        fs::create_dir_all(full.parent().unwrap()).unwrap();
        fs::write(&full, content).unwrap();
    }
}

fn pack_to_string(root: &Path, excludes: &ExcludeSet) -> String {
    let mut out = Vec::new();
    pack_tree(root, excludes, &mut out).unwrap();
    String::from_utf8(out).unwrap()
}

fn unpack_into(archive: &str, dest: &Path) -> Result<usize, UnpackError> {
    decode_stream(Cursor::new(archive.as_bytes()), dest)
}

fn record_count(archive: &str) -> usize {
    archive
        .lines()
        .filter(|l| l.starts_with("--- FILE"))
        .count()
}

/// Read back every file under `root` as (slash-relative path, bytes).
fn snapshot(root: &Path) -> BTreeMap<String, Vec<u8>> {
    let mut seen = BTreeMap::new();
    for entry in walkdir::WalkDir::new(root) {
        let entry = entry.unwrap();
        if !entry.file_type().is_file() {
            continue;
        }
        let rel = entry
            .path()
            .strip_prefix(root)
            .unwrap()
            .to_string_lossy()
            .replace('\\', "/");
        seen.insert(rel, fs::read(entry.path()).unwrap());
    }
    seen
}

#[test]
fn scenario_pack_skips_binary_and_roundtrips_text() {
    let src = TempDir::new().unwrap();
    write_tree(
        src.path(),
        &[("a.txt", b"hello\n" as &[u8]), ("bin.dat", &[0x00, 0x01, 0x02])],
    );
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(src.path().join("a.txt"), fs::Permissions::from_mode(0o644))
            .unwrap();
    }

    let archive = pack_to_string(src.path(), &ExcludeSet::defaults());
    assert_eq!(record_count(&archive), 1);

    let dest = TempDir::new().unwrap();
    let count = unpack_into(&archive, dest.path()).unwrap();
    assert_eq!(count, 1);
    assert_eq!(fs::read(dest.path().join("a.txt")).unwrap(), b"hello\n");
    assert!(!dest.path().join("bin.dat").exists());

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = fs::metadata(dest.path().join("a.txt"))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o7777, 0o644);
    }
}

#[test]
fn roundtrip_preserves_awkward_contents() {
    let src = TempDir::new().unwrap();
    write_tree(
        src.path(),
        &[
            ("empty.txt", b"" as &[u8]),
            ("no_newline.txt", b"no trailing newline"),
            ("trailing.txt", b"own newline\n"),
            ("marker.md", b"before\n--- END FILE ---\nafter\n"),
            ("header.md", b"--- FILE path_b64=x mode=0644 ---\nbody\n"),
            ("deep/nested/mod.rs", b"pub fn nested() {}\n"),
            ("unicode.txt", "grüße ✓ 中文\n".as_bytes()),
        ],
    );

    let archive = pack_to_string(src.path(), &ExcludeSet::defaults());
    let dest = TempDir::new().unwrap();
    let count = unpack_into(&archive, dest.path()).unwrap();

    assert_eq!(count, 7);
    assert_eq!(snapshot(dest.path()), snapshot(src.path()));
}

#[test]
fn packing_twice_is_byte_identical() {
    let src = TempDir::new().unwrap();
    write_tree(
        src.path(),
        &[
            ("b.txt", b"bbb\n" as &[u8]),
            ("a.txt", b"aaa\n"),
            ("sub/c.txt", b"ccc\n"),
        ],
    );
    let first = pack_to_string(src.path(), &ExcludeSet::defaults());
    let second = pack_to_string(src.path(), &ExcludeSet::defaults());
    assert_eq!(first, second);
}

#[test]
fn excluded_directory_contributes_nothing_at_any_depth() {
    let src = TempDir::new().unwrap();
    write_tree(
        src.path(),
        &[
            ("src/main.rs", b"fn main() {}\n" as &[u8]),
            ("node_modules/pkg/deep/index.js", b"module.exports = 1;\n"),
            (".git/config", b"[core]\n"),
        ],
    );

    let archive = pack_to_string(src.path(), &ExcludeSet::defaults());
    assert_eq!(record_count(&archive), 1);
    assert!(!archive.contains("index.js"));

    let dest = TempDir::new().unwrap();
    unpack_into(&archive, dest.path()).unwrap();
    assert!(dest.path().join("src/main.rs").exists());
    assert!(!dest.path().join("node_modules").exists());
}

#[test]
fn user_excludes_replace_defaults_entirely() {
    let src = TempDir::new().unwrap();
    write_tree(
        src.path(),
        &[
            (".git/config", b"[core]\n" as &[u8]),
            ("readme.md", b"# hi\n"),
        ],
    );

    // With `*.md` as the whole list, `.git` is no longer excluded.
    let archive = pack_to_string(src.path(), &ExcludeSet::from_csv("*.md"));
    assert_eq!(record_count(&archive), 1);

    let dest = TempDir::new().unwrap();
    unpack_into(&archive, dest.path()).unwrap();
    assert!(dest.path().join(".git/config").exists());
    assert!(!dest.path().join("readme.md").exists());
}

#[test]
fn mode_bits_survive_roundtrip() {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;

        let src = TempDir::new().unwrap();
        write_tree(src.path(), &[("run.sh", b"#!/bin/sh\n" as &[u8])]);
        fs::set_permissions(src.path().join("run.sh"), fs::Permissions::from_mode(0o755))
            .unwrap();

        let archive = pack_to_string(src.path(), &ExcludeSet::defaults());
        let dest = TempDir::new().unwrap();
        unpack_into(&archive, dest.path()).unwrap();

        let mode = fs::metadata(dest.path().join("run.sh"))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o7777, 0o755);
    }
}

#[test]
fn stray_lines_between_records_are_tolerated() {
    let src = TempDir::new().unwrap();
    write_tree(src.path(), &[("a.txt", b"aaa\n" as &[u8]), ("b.txt", b"bbb\n")]);
    let archive = pack_to_string(src.path(), &ExcludeSet::defaults());

    let records: Vec<&str> = archive.split_inclusive('\n').collect();
    let noisy = format!(
        "a prompt preamble\n\n{}\nchatter between records\n{}\ntrailing notes\n",
        records[..3].concat(),
        records[3..].concat(),
    );

    let dest = TempDir::new().unwrap();
    assert_eq!(unpack_into(&noisy, dest.path()).unwrap(), 2);
    assert_eq!(fs::read(dest.path().join("a.txt")).unwrap(), b"aaa\n");
    assert_eq!(fs::read(dest.path().join("b.txt")).unwrap(), b"bbb\n");
}

#[test]
fn traversal_path_is_fatal_and_writes_nothing() {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;

    let dest = TempDir::new().unwrap();
    let token = STANDARD.encode("../../etc/passwd");
    let archive = format!(
        "--- FILE path_b64={token} mode=0644 ---\naGFja2Vk\n--- END FILE ---\n"
    );

    let err = unpack_into(&archive, dest.path()).unwrap_err();
    assert!(matches!(
        err,
        UnpackError::Format(FormatError::UnsafePath(_))
    ));
    assert_eq!(snapshot(dest.path()).len(), 0);
}

#[test]
fn dotdot_inside_tree_is_normalized_not_rejected() {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;

    let dest = TempDir::new().unwrap();
    let token = STANDARD.encode("a/../b.txt");
    let archive = format!(
        "--- FILE path_b64={token} mode=0644 ---\naGk=\n--- END FILE ---\n"
    );

    assert_eq!(unpack_into(&archive, dest.path()).unwrap(), 1);
    assert_eq!(fs::read(dest.path().join("b.txt")).unwrap(), b"hi");
}

#[test]
fn malformed_header_is_fatal() {
    let dest = TempDir::new().unwrap();
    // Raw-path variant: starts with the marker but fails the grammar.
    let archive = "--- FILE path=a.txt mode=0644 ---\naGk=\n--- END FILE ---\n";
    let err = unpack_into(archive, dest.path()).unwrap_err();
    assert!(matches!(
        err,
        UnpackError::Format(FormatError::MalformedHeader(_))
    ));
}

#[test]
fn bad_payload_is_fatal() {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;

    let dest = TempDir::new().unwrap();
    let token = STANDARD.encode("a.txt");
    let archive =
        format!("--- FILE path_b64={token} mode=0644 ---\nnot!base64!\n--- END FILE ---\n");
    let err = unpack_into(&archive, dest.path()).unwrap_err();
    assert!(matches!(err, UnpackError::Payload(_)));
    assert!(!dest.path().join("a.txt").exists());
}

#[test]
fn missing_end_marker_is_fatal() {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;

    let dest = TempDir::new().unwrap();
    let token = STANDARD.encode("a.txt");
    let archive = format!("--- FILE path_b64={token} mode=0644 ---\naGk=\n");
    let err = unpack_into(&archive, dest.path()).unwrap_err();
    assert!(matches!(err, UnpackError::TruncatedRecord(p) if p == "a.txt"));
    assert!(!dest.path().join("a.txt").exists());
}

#[test]
fn duplicate_paths_last_write_wins() {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;

    let dest = TempDir::new().unwrap();
    let token = STANDARD.encode("dup.txt");
    let first = STANDARD.encode("first");
    let second = STANDARD.encode("second");
    let archive = format!(
        "--- FILE path_b64={token} mode=0644 ---\n{first}\n--- END FILE ---\n\
         --- FILE path_b64={token} mode=0644 ---\n{second}\n--- END FILE ---\n"
    );

    assert_eq!(unpack_into(&archive, dest.path()).unwrap(), 2);
    assert_eq!(fs::read(dest.path().join("dup.txt")).unwrap(), b"second");
}

#[test]
fn unpack_leaves_no_temp_files_behind() {
    let src = TempDir::new().unwrap();
    write_tree(src.path(), &[("a.txt", b"hello\n" as &[u8])]);
    let archive = pack_to_string(src.path(), &ExcludeSet::defaults());

    let dest = TempDir::new().unwrap();
    unpack_into(&archive, dest.path()).unwrap();
    let leftovers: Vec<String> = snapshot(dest.path())
        .into_keys()
        .filter(|p| p.contains(".tmp~"))
        .collect();
    assert!(leftovers.is_empty(), "temp files left: {leftovers:?}");
}
