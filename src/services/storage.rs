//! Attachment byte storage.
//!
//! Enquiry attachments are stored under their row id. The local filesystem
//! store is the only implementation shipped; anything implementing
//! [`AttachmentStore`] can replace it in `AppState`.

use anyhow::{Context, Result};
use axum::async_trait;
use axum::body::Bytes;
use std::io::ErrorKind;
use std::path::PathBuf;
use tracing::{debug, info};
use uuid::Uuid;

#[async_trait]
pub trait AttachmentStore: Send + Sync {
    async fn save(&self, id: Uuid, contents: Bytes) -> Result<()>;

    /// `None` when nothing is stored under `id`
    async fn read(&self, id: Uuid) -> Result<Option<Bytes>>;

    /// Returns whether a file was removed
    async fn delete(&self, id: Uuid) -> Result<bool>;
}

/// Files in a single directory, named by attachment id
#[derive(Debug, Clone)]
pub struct LocalAttachmentStore {
    root: PathBuf,
}

impl LocalAttachmentStore {
    pub async fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        tokio::fs::create_dir_all(&root)
            .await
            .with_context(|| format!("Failed to create attachments directory {}", root.display()))?;

        info!(dir = %root.display(), "Local attachment store ready");
        Ok(Self { root })
    }

    fn path_for(&self, id: Uuid) -> PathBuf {
        self.root.join(id.to_string())
    }
}

#[async_trait]
impl AttachmentStore for LocalAttachmentStore {
    async fn save(&self, id: Uuid, contents: Bytes) -> Result<()> {
        let path = self.path_for(id);
        tokio::fs::write(&path, &contents)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;

        debug!(attachment_id = %id, size = contents.len(), "Attachment stored");
        Ok(())
    }

    async fn read(&self, id: Uuid) -> Result<Option<Bytes>> {
        match tokio::fs::read(self.path_for(id)).await {
            Ok(data) => Ok(Some(Bytes::from(data))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("Failed to read attachment {}", id)),
        }
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        match tokio::fs::remove_file(self.path_for(id)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e).with_context(|| format!("Failed to delete attachment {}", id)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn save_read_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalAttachmentStore::new(dir.path().join("enquiries")).await.unwrap();
        let id = Uuid::new_v4();

        assert_eq!(store.read(id).await.unwrap(), None);

        store.save(id, Bytes::from_static(b"brief")).await.unwrap();
        assert_eq!(store.read(id).await.unwrap().as_deref(), Some(&b"brief"[..]));

        assert!(store.delete(id).await.unwrap());
        assert!(!store.delete(id).await.unwrap());
        assert_eq!(store.read(id).await.unwrap(), None);
    }

    #[tokio::test]
    async fn works_behind_trait_object() {
        let dir = tempfile::tempdir().unwrap();
        let store: std::sync::Arc<dyn AttachmentStore> =
            std::sync::Arc::new(LocalAttachmentStore::new(dir.path()).await.unwrap());

        let id = Uuid::new_v4();
        store.save(id, Bytes::from(vec![1u8, 2, 3])).await.unwrap();
        assert_eq!(store.read(id).await.unwrap().unwrap().len(), 3);
    }
}
