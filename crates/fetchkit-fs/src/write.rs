use crate::{Error, Result};
use fs2::FileExt;
use std::fs;
use std::io::Write;
use std::path::Path;

/// Ensure `path` is a directory, creating it and any missing parents.
///
/// `mode` is applied on unix to the leaf directory only when this call
/// created it; an existing directory keeps its permissions.
pub fn ready_directory(path: impl AsRef<Path>, mode: u32) -> Result<()> {
    let path = path.as_ref();
    if path.is_dir() {
        return Ok(());
    }
    fs::create_dir_all(path).map_err(|e| Error::CreateDir {
        path: path.to_path_buf(),
        source: e,
    })?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(mode)).map_err(|e| {
            Error::CreateDir {
                path: path.to_path_buf(),
                source: e,
            }
        })?;
    }
    #[cfg(not(unix))]
    let _ = mode;

    Ok(())
}

/// Write `content` to `path`, returning the number of bytes written.
///
/// Without `lock` the content goes to a sibling temp file that is renamed
/// over the destination. With `lock` the destination itself is opened,
/// exclusively locked and truncated, so concurrent writers that also lock
/// are serialized.
pub fn put(path: impl AsRef<Path>, content: &[u8], lock: bool) -> Result<u64> {
    let path = path.as_ref();
    if lock {
        locked_write(path, content)?;
    } else {
        atomic_write(path, content)?;
    }
    tracing::trace!(path = %path.display(), bytes = content.len(), lock, "wrote file");
    Ok(content.len() as u64)
}

pub fn atomic_write(path: impl AsRef<Path>, content: &[u8]) -> Result<()> {
    let path = path.as_ref();
    let parent = path.parent().ok_or_else(|| Error::NoParent {
        path: path.to_path_buf(),
    })?;

    let tmp_path = parent.join(format!(".tmp.{}.fetchkit", uuid::Uuid::new_v4()));

    fs::write(&tmp_path, content).map_err(|e| Error::write(&tmp_path, e))?;

    fs::rename(&tmp_path, path).map_err(|e| {
        let _ = fs::remove_file(&tmp_path);
        Error::write(path, e)
    })
}

fn locked_write(path: &Path, content: &[u8]) -> Result<()> {
    let mut file = fs::File::options()
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)
        .map_err(|e| Error::write(path, e))?;

    file.lock_exclusive().map_err(|e| Error::Lock {
        path: path.to_path_buf(),
        source: e,
    })?;

    let result = file
        .set_len(0)
        .and_then(|_| file.write_all(content))
        .and_then(|_| file.sync_all())
        .map_err(|e| Error::write(path, e));

    let _ = fs2::FileExt::unlock(&file);
    result
}

pub fn read(path: impl AsRef<Path>) -> Result<Vec<u8>> {
    let path = path.as_ref();
    fs::read(path).map_err(|e| Error::read(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_put_unlocked() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.txt");
        assert_eq!(put(&path, b"hello world", false).unwrap(), 11);
        assert_eq!(fs::read(&path).unwrap(), b"hello world");
    }

    #[test]
    fn test_put_locked_truncates_previous_content() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.txt");
        fs::write(&path, "a much longer original body").unwrap();
        put(&path, b"short", true).unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"short");
    }

    #[test]
    fn test_atomic_write_leaves_no_temp_files() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.bin");
        atomic_write(&path, b"data").unwrap();
        let entries: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn test_read_missing_is_not_found() {
        let dir = tempdir().unwrap();
        let err = read(dir.path().join("missing")).unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn test_ready_directory_applies_mode() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempdir().unwrap();
        let nested = dir.path().join("a/b/c");
        ready_directory(&nested, 0o750).unwrap();
        let mode = fs::metadata(&nested).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o750);
    }

    #[cfg(unix)]
    #[test]
    fn test_ready_directory_keeps_existing_mode() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempdir().unwrap();
        let shared = dir.path().join("shared");
        fs::create_dir(&shared).unwrap();
        fs::set_permissions(&shared, fs::Permissions::from_mode(0o1777)).unwrap();

        ready_directory(&shared, 0o755).unwrap();
        let mode = fs::metadata(&shared).unwrap().permissions().mode();
        assert_eq!(mode & 0o7777, 0o1777);
    }
}
