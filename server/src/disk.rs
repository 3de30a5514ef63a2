use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use async_trait::async_trait;
use tokio::fs::OpenOptions;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::domain::{validate_file_name, Storage, StoredFile};
use crate::error::StorageError;

/// URL path prefix stored files are served under.
pub const DOWNLOADS_PREFIX: &str = "/downloads";

/// Keeps compressed images as plain files in one directory.
#[derive(Debug, Clone)]
pub struct DiskStorage {
    root: PathBuf,
    base_url: String,
}

impl DiskStorage {
    pub fn new(root: impl Into<PathBuf>, base_url: &str) -> Self {
        Self {
            root: root.into(),
            base_url: base_url.trim_end_matches('/').to_owned(),
        }
    }
}

#[async_trait]
impl Storage for DiskStorage {
    async fn ensure_ready(&self) -> Result<(), StorageError> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(StorageError::Directory)
    }

    async fn save(&self, name: &str, data: &[u8]) -> Result<StoredFile, StorageError> {
        validate_file_name(name)?;
        let path = self.root.join(name);
        let file = match OpenOptions::new().write(true).create_new(true).open(&path).await {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                return Err(StorageError::Exists(name.to_owned()));
            }
            Err(e) => return Err(StorageError::from_write(e)),
        };
        write_or_discard(file, &path, data).await?;

        let meta = tokio::fs::metadata(&path)
            .await
            .map_err(StorageError::Write)?;
        tracing::debug!(file = name, size = meta.len(), "stored");
        Ok(StoredFile {
            name: name.to_owned(),
            path,
            modified: meta.modified().unwrap_or_else(|_| SystemTime::now()),
            size: meta.len(),
        })
    }

    fn download_url(&self, name: &str) -> String {
        format!("{}{DOWNLOADS_PREFIX}/{name}", self.base_url)
    }

    fn root(&self) -> &Path {
        &self.root
    }
}

/// Writes `data` to the freshly created file at `path`, removing it again
/// when the write does not complete.
async fn write_or_discard<W>(mut writer: W, path: &Path, data: &[u8]) -> Result<(), StorageError>
where
    W: AsyncWrite + Unpin,
{
    let written = match writer.write_all(data).await {
        Ok(()) => writer.flush().await,
        Err(e) => Err(e),
    };
    drop(writer);
    let Err(e) = written else {
        return Ok(());
    };
    if let Err(remove) = tokio::fs::remove_file(path).await {
        tracing::warn!(path = %path.display(), error = %remove, "partial file left behind");
    }
    Err(StorageError::from_write(e))
}
