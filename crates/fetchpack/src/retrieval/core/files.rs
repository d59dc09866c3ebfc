//! Persistence collaborator for progressive mode
//!
//! Each successfully fetched object is handed to a [`FileSink`] immediately,
//! nothing is accumulated. [`DirectorySink`] writes under a root directory
//! so a file either exists completely or not at all.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use super::{normalize_display_name, FileOperation, Result, RetrievalError};

/// Trait for saving one retrieved object as a standalone file
#[async_trait]
pub trait FileSink: Send + Sync {
    /// Persist `bytes` under `file_name`, returning where it ended up
    async fn save(&self, file_name: &str, bytes: Vec<u8>) -> Result<PathBuf>;
}

/// Saves files under a root directory, creating any directories the name encodes
#[derive(Debug, Clone)]
pub struct DirectorySink {
    root: PathBuf,
}

impl DirectorySink {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a display name to its final path under the root
    pub fn destination(&self, file_name: &str) -> Result<PathBuf> {
        let relative: PathBuf = normalize_display_name(file_name)?.split('/').collect();
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl FileSink for DirectorySink {
    async fn save(&self, file_name: &str, bytes: Vec<u8>) -> Result<PathBuf> {
        let dest_path = self.destination(file_name)?;

        if let Some(parent) = dest_path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| RetrievalError::FileSystem {
                path: parent.to_path_buf(),
                operation: FileOperation::CreateDir,
                source: e,
            })?;
        }

        let temp_path = create_temp_path(&dest_path);
        if let Err(e) = write_temp_file(&temp_path, &bytes).await {
            remove_partial_file(&temp_path).await;
            return Err(e);
        }
        if let Err(e) = atomic_rename(&temp_path, &dest_path).await {
            remove_partial_file(&temp_path).await;
            return Err(e);
        }
        debug!("Saved {} bytes to {}", bytes.len(), dest_path.display());
        Ok(dest_path)
    }
}

async fn write_temp_file(temp_path: &Path, bytes: &[u8]) -> Result<()> {
    let mut file = fs::File::create(temp_path).await.map_err(|e| RetrievalError::FileSystem {
        path: temp_path.to_path_buf(),
        operation: FileOperation::Create,
        source: e,
    })?;
    file.write_all(bytes).await.map_err(|e| RetrievalError::FileSystem {
        path: temp_path.to_path_buf(),
        operation: FileOperation::Write,
        source: e,
    })?;
    file.flush().await.map_err(|e| RetrievalError::FileSystem {
        path: temp_path.to_path_buf(),
        operation: FileOperation::Write,
        source: e,
    })
}

/// Best-effort removal of a `.part` file left by a failed save
async fn remove_partial_file(temp_path: &Path) {
    match fs::remove_file(temp_path).await {
        Ok(()) => debug!("Removed partial file {}", temp_path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove partial file {}: {}", temp_path.display(), e),
    }
}

/// Temporary path for a file being written
///
/// Appends `.part` rather than replacing the extension so `a.jpg` and
/// `a.png` in one directory never share a temp file.
pub fn create_temp_path(dest_path: &Path) -> PathBuf {
    let mut name = dest_path.as_os_str().to_os_string();
    name.push(".part");
    PathBuf::from(name)
}

/// Atomically rename a temporary file to its final destination
pub async fn atomic_rename(temp_path: &Path, dest_path: &Path) -> Result<()> {
    fs::rename(temp_path, dest_path).await.map_err(|e| RetrievalError::FileSystem {
        path: dest_path.to_path_buf(),
        operation: FileOperation::Move,
        source: e,
    })?;
    debug!("Atomically renamed {} to {}", temp_path.display(), dest_path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn saves_nested_file_without_leaving_part_file() {
        let dir = tempdir().unwrap();
        let sink = DirectorySink::new(dir.path());

        let saved = sink.save("2024/summer/beach.jpg", b"pixels".to_vec()).await.unwrap();

        assert_eq!(saved, dir.path().join("2024").join("summer").join("beach.jpg"));
        assert_eq!(tokio::fs::read(&saved).await.unwrap(), b"pixels");
        assert!(!create_temp_path(&saved).exists());
    }

    #[tokio::test]
    async fn overwrites_existing_file() {
        let dir = tempdir().unwrap();
        let sink = DirectorySink::new(dir.path());
        sink.save("clip.mp4", b"old".to_vec()).await.unwrap();

        let saved = sink.save("clip.mp4", b"new".to_vec()).await.unwrap();
        assert_eq!(tokio::fs::read(saved).await.unwrap(), b"new");
    }

    #[tokio::test]
    async fn refuses_to_escape_root() {
        let dir = tempdir().unwrap();
        let sink = DirectorySink::new(dir.path().join("out"));

        let result = sink.save("../outside.jpg", b"x".to_vec()).await;
        assert!(matches!(result, Err(RetrievalError::InvalidDisplayName { .. })));
        assert!(!dir.path().join("outside.jpg").exists());
    }

    #[tokio::test]
    async fn aliased_names_resolve_to_one_destination() {
        let dir = tempdir().unwrap();
        let sink = DirectorySink::new(dir.path());

        assert_eq!(sink.destination("./a.jpg").unwrap(), sink.destination("a.jpg").unwrap());
        assert_eq!(sink.destination("x\\b.jpg").unwrap(), dir.path().join("x").join("b.jpg"));
        assert!(matches!(
            sink.destination("."),
            Err(RetrievalError::InvalidDisplayName { .. })
        ));
    }

    #[tokio::test]
    async fn failed_rename_removes_part_file() {
        let dir = tempdir().unwrap();
        let sink = DirectorySink::new(dir.path());
        // A non-empty directory at the destination makes the rename fail
        let blocker = dir.path().join("clip.mp4");
        tokio::fs::create_dir_all(blocker.join("inner")).await.unwrap();

        let result = sink.save("clip.mp4", b"frames".to_vec()).await;

        assert!(matches!(
            result,
            Err(RetrievalError::FileSystem { operation: FileOperation::Move, .. })
        ));
        assert!(!create_temp_path(&blocker).exists());
        assert!(blocker.is_dir());
    }

    #[test]
    fn temp_path_keeps_original_extension() {
        assert_eq!(create_temp_path(Path::new("a/b.jpg")), PathBuf::from("a/b.jpg.part"));
    }
}
