//! File operations constrained to the workspace.
//!
//! Paths arrive pre-resolved (see [`crate::path`]).  Writes are atomic:
//! content lands in a uniquely-named sibling temp file which is then
//! renamed into place, so a crash mid-write never leaves a torn file.

use std::path::Path;

use tokio::fs;
use tokio::io::AsyncWriteExt;

use axe_domain::operation::OperationResult;

/// Read a file as UTF-8 text.
pub async fn read(path: &Path) -> OperationResult {
    match fs::read_to_string(path).await {
        Ok(text) => OperationResult::ok_text(text),
        Err(e) => OperationResult::error(format!("failed to read '{}': {e}", path.display())),
    }
}

/// Write (create or replace) a file atomically, creating parents.
pub async fn write(path: &Path, content: &str) -> OperationResult {
    if let Some(parent) = path.parent() {
        if let Err(e) = fs::create_dir_all(parent).await {
            return OperationResult::error(format!("failed to create parent directory: {e}"));
        }
    }

    let tmp_name = format!(
        ".{}.{}.tmp",
        path.file_name().unwrap_or_default().to_string_lossy(),
        std::process::id(),
    );
    let tmp_path = path.with_file_name(tmp_name);

    let result = async {
        let mut file = fs::File::create(&tmp_path).await?;
        file.write_all(content.as_bytes()).await?;
        file.flush().await?;
        file.sync_data().await?;
        fs::rename(&tmp_path, path).await
    }
    .await;

    match result {
        Ok(()) => OperationResult::ok_write(content.len() as u64),
        Err(e) => {
            let _ = fs::remove_file(&tmp_path).await;
            OperationResult::error(format!("failed to write '{}': {e}", path.display()))
        }
    }
}

/// Append to a file, creating it (and parents) when missing.
pub async fn append(path: &Path, content: &str) -> OperationResult {
    if let Some(parent) = path.parent() {
        if let Err(e) = fs::create_dir_all(parent).await {
            return OperationResult::error(format!("failed to create parent directory: {e}"));
        }
    }

    let result = async {
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await?;
        file.write_all(content.as_bytes()).await?;
        file.flush().await
    }
    .await;

    match result {
        Ok(()) => OperationResult::ok_write(content.len() as u64),
        Err(e) => OperationResult::error(format!("failed to append to '{}': {e}", path.display())),
    }
}

/// List a directory: sorted names, directories marked with a trailing
/// slash.
pub async fn list_dir(path: &Path) -> OperationResult {
    let mut read_dir = match fs::read_dir(path).await {
        Ok(rd) => rd,
        Err(e) => {
            return OperationResult::error(format!(
                "failed to read directory '{}': {e}",
                path.display()
            ))
        }
    };

    let mut names: Vec<String> = Vec::new();
    loop {
        match read_dir.next_entry().await {
            Ok(Some(entry)) => {
                let mut name = entry.file_name().to_string_lossy().into_owned();
                if entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false) {
                    name.push('/');
                }
                names.push(name);
            }
            Ok(None) => break,
            Err(e) => return OperationResult::error(format!("failed to read entry: {e}")),
        }
    }
    names.sort();
    OperationResult::ok_text(names.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axe_domain::operation::OperationStatus;
    use tempfile::TempDir;

    #[tokio::test]
    async fn write_then_read_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/dir/file.txt");
        let w = write(&path, "hello\nworld\n").await;
        assert_eq!(w.status, OperationStatus::Ok);
        assert_eq!(w.bytes_written, Some(12));

        let r = read(&path).await;
        assert_eq!(r.text.as_deref(), Some("hello\nworld\n"));
    }

    #[tokio::test]
    async fn append_creates_then_extends() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("log.txt");
        append(&path, "one\n").await;
        append(&path, "two\n").await;
        let r = read(&path).await;
        assert_eq!(r.text.as_deref(), Some("one\ntwo\n"));
    }

    #[tokio::test]
    async fn read_missing_file_is_error() {
        let dir = TempDir::new().unwrap();
        let r = read(&dir.path().join("ghost.txt")).await;
        assert_eq!(r.status, OperationStatus::Error);
        assert!(r.error_message.unwrap().contains("ghost.txt"));
    }

    #[tokio::test]
    async fn list_dir_sorts_and_marks_directories() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("b.txt"), "").unwrap();
        std::fs::write(dir.path().join("a.txt"), "").unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();

        let r = list_dir(dir.path()).await;
        assert_eq!(r.text.as_deref(), Some("a.txt\nb.txt\nsub/"));
    }
}
