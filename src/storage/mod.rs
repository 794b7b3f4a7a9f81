//! Storage for files attached to tasks.
//!
//! The task record keeps only the returned name and URL; the bytes live behind
//! a `FileStore`. `LocalFileStore` writes under a directory that the HTTP
//! server exposes at `/uploads`.

use std::path::PathBuf;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::debug;

use crate::error::{Error, Result};

/// A file accepted by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    pub name: String,
    pub url: String,
}

#[async_trait]
pub trait FileStore: Send + Sync {
    async fn put(&self, file_name: &str, data: Bytes) -> Result<StoredFile>;

    /// Drop a file previously returned by `put`. Unknown URLs are ignored.
    async fn delete(&self, url: &str) -> Result<()>;
}

pub struct LocalFileStore {
    root: PathBuf,
    public_prefix: String,
}

impl LocalFileStore {
    /// `public_prefix` is prepended to `/uploads/...` when building URLs; empty
    /// yields server-relative URLs.
    pub fn new(root: impl Into<PathBuf>, public_prefix: &str) -> Self {
        Self {
            root: root.into(),
            public_prefix: public_prefix.trim_end_matches('/').to_string(),
        }
    }

    /// Map a URL from `put` back to its `<id>/<name>` directory and file.
    fn locate(&self, url: &str) -> Option<(PathBuf, PathBuf)> {
        let relative = url
            .strip_prefix(&self.public_prefix)?
            .strip_prefix("/uploads/")?;
        let (id, name) = relative.split_once('/')?;
        uuid::Uuid::parse_str(id).ok()?;
        if name != sanitize_file_name(name) {
            return None;
        }
        let dir = self.root.join(id);
        let file = dir.join(name);
        Some((dir, file))
    }
}

#[async_trait]
impl FileStore for LocalFileStore {
    async fn put(&self, file_name: &str, data: Bytes) -> Result<StoredFile> {
        let name = sanitize_file_name(file_name);
        let id = uuid::Uuid::new_v4().to_string();
        let dir = self.root.join(&id);

        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| Error::dependency("storage", format!("failed to create {}: {}", dir.display(), e)))?;
        let path = dir.join(&name);
        tokio::fs::write(&path, &data)
            .await
            .map_err(|e| Error::dependency("storage", format!("failed to write {}: {}", path.display(), e)))?;

        debug!(path = %path.display(), size = data.len(), "Stored upload");

        Ok(StoredFile {
            url: format!("{}/uploads/{}/{}", self.public_prefix, id, name),
            name,
        })
    }

    async fn delete(&self, url: &str) -> Result<()> {
        let Some((dir, file)) = self.locate(url) else {
            debug!(url = %url, "Not a stored upload, nothing to delete");
            return Ok(());
        };

        match tokio::fs::remove_file(&file).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => {
                return Err(Error::dependency(
                    "storage",
                    format!("failed to remove {}: {}", file.display(), e),
                ))
            }
        }
        // Each upload owns its directory; it is empty now.
        let _ = tokio::fs::remove_dir(&dir).await;

        debug!(path = %file.display(), "Removed upload");
        Ok(())
    }
}

/// Reduce a client-supplied name to a single safe path component.
pub fn sanitize_file_name(raw: &str) -> String {
    let base = raw.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "file".to_string()
    } else {
        cleaned.chars().take(120).collect()
    }
}
