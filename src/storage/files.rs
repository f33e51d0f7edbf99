//! File primitives: atomic replace, durable append, JSON documents.

use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tracing::warn;

use crate::error::StorageError;

/// Create the parent directory of `path` if needed.
async fn ensure_parent(path: &Path) -> Result<(), StorageError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StorageError::io(parent, &e))?;
        }
    }
    Ok(())
}

/// Write `bytes` to a synced temp file next to `path` and return its path.
async fn stage(path: &Path, bytes: &[u8]) -> Result<PathBuf, StorageError> {
    ensure_parent(path).await?;
    let file_name = path
        .file_name()
        .map_or_else(|| "file".into(), |n| n.to_string_lossy().into_owned());
    let tmp = path.with_file_name(format!(".{file_name}.{}.tmp", uuid::Uuid::new_v4()));

    let result = async {
        let mut file = tokio::fs::File::create(&tmp)
            .await
            .map_err(|e| StorageError::io(&tmp, &e))?;
        file.write_all(bytes)
            .await
            .map_err(|e| StorageError::io(&tmp, &e))?;
        file.sync_all()
            .await
            .map_err(|e| StorageError::io(&tmp, &e))
    }
    .await;

    match result {
        Ok(()) => Ok(tmp),
        Err(e) => {
            let _ = tokio::fs::remove_file(&tmp).await;
            Err(e)
        }
    }
}

/// Replace a file's contents atomically (temp file + rename).
///
/// Readers see either the old or the new contents, never a mix.
///
/// # Errors
///
/// Returns [`StorageError::Io`] if any filesystem step fails.
pub async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StorageError> {
    let tmp = stage(path, bytes).await?;
    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(StorageError::io(path, &e));
    }
    Ok(())
}

/// Replace several files as one unit.
///
/// All new contents are staged before anything is renamed into place. If a
/// step fails, files already replaced get their previous contents back (or
/// are removed when they did not exist) and staged files are deleted.
///
/// # Errors
///
/// Returns [`StorageError::Io`] for the first failing step.
pub async fn write_atomic_all(files: &[(PathBuf, Vec<u8>)]) -> Result<(), StorageError> {
    let mut previous = Vec::with_capacity(files.len());
    for (path, _) in files {
        previous.push(read_optional(path).await?);
    }

    let mut staged = Vec::with_capacity(files.len());
    for (path, bytes) in files {
        match stage(path, bytes).await {
            Ok(tmp) => staged.push(tmp),
            Err(e) => {
                discard(&staged).await;
                return Err(e);
            }
        }
    }

    for (index, ((path, _), tmp)) in files.iter().zip(&staged).enumerate() {
        if let Err(e) = tokio::fs::rename(tmp, path).await {
            discard(&staged[index..]).await;
            restore(&files[..index], &previous[..index]).await;
            return Err(StorageError::io(path, &e));
        }
    }
    Ok(())
}

async fn discard(staged: &[PathBuf]) {
    for tmp in staged {
        let _ = tokio::fs::remove_file(tmp).await;
    }
}

async fn restore(files: &[(PathBuf, Vec<u8>)], previous: &[Option<Vec<u8>>]) {
    for ((path, _), old) in files.iter().zip(previous) {
        let result = match old {
            Some(bytes) => write_atomic(path, bytes).await,
            None => tokio::fs::remove_file(path)
                .await
                .map_err(|e| StorageError::io(path, &e)),
        };
        if let Err(e) = result {
            warn!(path = %path.display(), error = %e, "Failed to restore document");
        }
    }
}

/// Read a file, returning `None` when it does not exist.
///
/// # Errors
///
/// Returns [`StorageError::Io`] for any failure other than "not found".
pub async fn read_optional(path: &Path) -> Result<Option<Vec<u8>>, StorageError> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(StorageError::io(path, &e)),
    }
}

/// Append one newline-terminated line and flush it to disk.
///
/// The caller must serialize appends to the same file.
///
/// # Errors
///
/// Returns [`StorageError::Io`] if the file cannot be opened, written or synced.
pub async fn append_line(path: &Path, line: &str) -> Result<(), StorageError> {
    ensure_parent(path).await?;
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
        .map_err(|e| StorageError::io(path, &e))?;

    let mut buf = Vec::with_capacity(line.len() + 1);
    buf.extend_from_slice(line.as_bytes());
    buf.push(b'\n');
    file.write_all(&buf)
        .await
        .map_err(|e| StorageError::io(path, &e))?;
    file.sync_data()
        .await
        .map_err(|e| StorageError::io(path, &e))
}

/// Newline-terminated lines of a buffer.
///
/// A trailing fragment without `\n` is an in-flight append and is skipped.
pub fn complete_lines(bytes: &[u8]) -> impl Iterator<Item = &[u8]> {
    let end = bytes.iter().rposition(|b| *b == b'\n').map_or(0, |i| i + 1);
    bytes[..end]
        .split(|b| *b == b'\n')
        .filter(|line| !line.iter().all(u8::is_ascii_whitespace))
}

/// Load a JSON document, or the default value when it does not exist.
///
/// # Errors
///
/// Returns [`StorageError`] if the file cannot be read or parsed.
pub async fn read_json_or_default<T>(path: &Path) -> Result<T, StorageError>
where
    T: DeserializeOwned + Default,
{
    match read_optional(path).await? {
        Some(bytes) if !bytes.iter().all(u8::is_ascii_whitespace) => {
            serde_json::from_slice(&bytes).map_err(|e| StorageError::serialization(path, e))
        }
        _ => Ok(T::default()),
    }
}

/// Encode a value as pretty JSON destined for `path`.
///
/// # Errors
///
/// Returns [`StorageError::Serialization`] if encoding fails.
pub fn encode_json<T>(path: &Path, value: &T) -> Result<Vec<u8>, StorageError>
where
    T: Serialize + ?Sized,
{
    serde_json::to_vec_pretty(value).map_err(|e| StorageError::serialization(path, e))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_write_atomic_creates_parents_and_replaces() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a/b/doc.json");
        write_atomic(&path, b"first").await.unwrap();
        write_atomic(&path, b"second").await.unwrap();
        assert_eq!(tokio::fs::read(&path).await.unwrap(), b"second");

        let leftovers: Vec<_> = std::fs::read_dir(path.parent().unwrap())
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn test_read_optional_missing() {
        let dir = TempDir::new().unwrap();
        assert!(read_optional(&dir.path().join("nope")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_append_line() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("log.jsonl");
        append_line(&path, "one").await.unwrap();
        append_line(&path, "two").await.unwrap();
        assert_eq!(tokio::fs::read_to_string(&path).await.unwrap(), "one\ntwo\n");
    }

    #[test]
    fn test_complete_lines_skips_partial_tail() {
        let lines: Vec<&[u8]> = complete_lines(b"a\nb\n\npartial").collect();
        assert_eq!(lines, vec![b"a".as_slice(), b"b".as_slice()]);
        assert_eq!(complete_lines(b"no newline").count(), 0);
        assert_eq!(complete_lines(b"").count(), 0);
    }

    #[tokio::test]
    async fn test_json_documents() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("doc.json");
        let missing: Vec<u32> = read_json_or_default(&path).await.unwrap();
        assert!(missing.is_empty());

        write_atomic(&path, &encode_json(&path, &vec![1_u32, 2, 3]).unwrap())
            .await
            .unwrap();
        let loaded: Vec<u32> = read_json_or_default(&path).await.unwrap();
        assert_eq!(loaded, vec![1, 2, 3]);

        tokio::fs::write(&path, b"{broken").await.unwrap();
        let err = read_json_or_default::<Vec<u32>>(&path).await.unwrap_err();
        assert!(matches!(err, StorageError::Serialization { .. }));
    }

    fn temp_files(dir: &Path) -> Vec<String> {
        std::fs::read_dir(dir)
            .unwrap()
            .filter_map(Result::ok)
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .filter(|n| n.ends_with(".tmp"))
            .collect()
    }

    #[tokio::test]
    async fn test_write_atomic_all_replaces_every_file() {
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("a.json");
        let b = dir.path().join("nested/b.json");
        write_atomic(&a, b"old").await.unwrap();

        write_atomic_all(&[(a.clone(), b"new-a".to_vec()), (b.clone(), b"new-b".to_vec())])
            .await
            .unwrap();

        assert_eq!(tokio::fs::read(&a).await.unwrap(), b"new-a");
        assert_eq!(tokio::fs::read(&b).await.unwrap(), b"new-b");
        assert!(temp_files(dir.path()).is_empty());
    }

    #[tokio::test]
    async fn test_write_atomic_all_failure_changes_nothing() {
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("a.json");
        let b = dir.path().join("b.json");
        let blocked = dir.path().join("blocked.json");
        write_atomic(&a, b"old").await.unwrap();
        tokio::fs::create_dir(&blocked).await.unwrap();

        let err = write_atomic_all(&[
            (a.clone(), b"new-a".to_vec()),
            (b.clone(), b"new-b".to_vec()),
            (blocked.clone(), b"new".to_vec()),
        ])
        .await
        .unwrap_err();

        assert!(matches!(err, StorageError::Io { .. }));
        assert_eq!(tokio::fs::read(&a).await.unwrap(), b"old");
        assert!(!b.exists());
        assert!(blocked.is_dir());
        assert!(temp_files(dir.path()).is_empty());
    }
}
