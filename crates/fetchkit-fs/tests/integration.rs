use fetchkit_fs::{Error, exists, put, read, ready_directory, stream_extension};
use tempfile::tempdir;

#[test]
fn test_ready_then_put_sniffed_name() {
    let dir = tempdir().unwrap();
    let target = dir.path().join("downloads");
    assert!(!exists(&target));

    ready_directory(&target, 0o755).unwrap();
    assert!(exists(&target));

    let body = b"%PDF-1.4\n%\xe2\xe3\xcf\xd3\n";
    let path = target.join(format!("report.{}", stream_extension(body)));
    let written = put(&path, body, false).unwrap();

    assert_eq!(written, body.len() as u64);
    assert_eq!(path.extension().unwrap(), "pdf");
    assert_eq!(read(&path).unwrap(), body);
}

#[test]
fn test_ready_directory_is_idempotent() {
    let dir = tempdir().unwrap();
    let target = dir.path().join("x");
    ready_directory(&target, 0o755).unwrap();
    ready_directory(&target, 0o755).unwrap();
    assert!(target.is_dir());
}

#[test]
fn test_put_overwrites_existing_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("existing.txt");
    std::fs::write(&path, "original").unwrap();

    put(&path, b"new content", false).unwrap();
    assert_eq!(read(&path).unwrap(), b"new content");

    put(&path, b"locked", true).unwrap();
    assert_eq!(read(&path).unwrap(), b"locked");
}

#[test]
fn test_put_into_missing_directory_fails() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("missing/dir/file.txt");
    let err = put(&path, b"data", true).unwrap_err();
    assert!(matches!(err, Error::Write { .. }));
}
