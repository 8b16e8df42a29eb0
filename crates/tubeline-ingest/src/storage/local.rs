//! Filesystem artifact store

use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, instrument, warn};
use tubeline_common::types::ArtifactKey;

use super::ArtifactStore;
use crate::error::StoreError;

/// Artifact store over a directory tree.
///
/// Keys resolve below `root`; a leading `/` in a key is ignored, so
/// `/FileStore/TFL/staging/x.json` maps to `<root>/FileStore/TFL/staging/x.json`.
#[derive(Debug, Clone)]
pub struct LocalArtifactStore {
    root: PathBuf,
}

impl LocalArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Filesystem path of a key.
    pub fn path_of(&self, key: &ArtifactKey) -> PathBuf {
        self.resolve(key.as_str())
    }

    fn resolve(&self, key: &str) -> PathBuf {
        self.root.join(key.trim_start_matches('/'))
    }
}

fn io_error(key: &ArtifactKey, source: std::io::Error) -> StoreError {
    match source.kind() {
        ErrorKind::NotFound => StoreError::NotFound { key: key.clone() },
        ErrorKind::AlreadyExists => StoreError::AlreadyExists { key: key.clone() },
        _ => StoreError::Io {
            key: key.clone(),
            source,
        },
    }
}

async fn ensure_parent(path: &Path, key: &ArtifactKey) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await.map_err(|e| StoreError::Io {
            key: key.clone(),
            source: e,
        })?;
    }
    Ok(())
}

/// Copy `source` to `target`; on failure remove any partial `target`.
async fn copy_or_discard(source: &Path, target: &Path) -> std::io::Result<()> {
    let Err(copy_err) = fs::copy(source, target).await else {
        return Ok(());
    };

    match fs::remove_file(target).await {
        Ok(()) => debug!(path = %target.display(), "Removed partial copy"),
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => warn!(path = %target.display(), error = %e, "Partial copy left behind"),
    }
    Err(copy_err)
}

#[async_trait]
impl ArtifactStore for LocalArtifactStore {
    #[instrument(skip(self, data), fields(artifact = %key, bytes = data.len()))]
    async fn write(&self, key: &ArtifactKey, data: Vec<u8>) -> Result<(), StoreError> {
        let path = self.path_of(key);
        ensure_parent(&path, key).await?;

        let mut file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
            .map_err(|e| io_error(key, e))?;

        file.write_all(&data).await.map_err(|e| io_error(key, e))?;
        file.sync_all().await.map_err(|e| io_error(key, e))?;

        debug!(path = %path.display(), "Artifact written");
        Ok(())
    }

    async fn read(&self, key: &ArtifactKey) -> Result<Vec<u8>, StoreError> {
        fs::read(self.path_of(key)).await.map_err(|e| io_error(key, e))
    }

    #[instrument(skip(self), fields(from = %from, to = %to))]
    async fn relocate(&self, from: &ArtifactKey, to: &ArtifactKey) -> Result<(), StoreError> {
        let source = self.path_of(from);
        let target = self.path_of(to);

        if fs::try_exists(&target).await.map_err(|e| io_error(to, e))? {
            return Err(StoreError::AlreadyExists { key: to.clone() });
        }
        ensure_parent(&target, to).await?;

        match fs::rename(&source, &target).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(StoreError::NotFound { key: from.clone() })
            }
            // Rename cannot cross filesystems; copy then remove instead.
            Err(rename_err) => {
                if let Err(copy_err) = copy_or_discard(&source, &target).await {
                    debug!(error = %copy_err, "Copy fallback failed");
                    return Err(StoreError::Io {
                        key: from.clone(),
                        source: rename_err,
                    });
                }
                fs::remove_file(&source).await.map_err(|e| io_error(from, e))
            }
        }
    }

    async fn exists(&self, key: &ArtifactKey) -> Result<bool, StoreError> {
        fs::try_exists(self.path_of(key))
            .await
            .map_err(|e| io_error(key, e))
    }

    async fn list(&self, location: &str) -> Result<Vec<ArtifactKey>, StoreError> {
        let location = location.trim_end_matches('/');
        let dir = self.resolve(location);

        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                let key = ArtifactKey::new(location)?;
                return Err(StoreError::Io { key, source: e });
            }
        };

        let mut keys = Vec::new();
        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    let key = ArtifactKey::new(location)?;
                    return Err(StoreError::Io { key, source: e });
                }
            };

            let is_file = entry.file_type().await.map(|t| t.is_file()).unwrap_or(false);
            if let (true, Some(name)) = (is_file, entry.file_name().to_str()) {
                keys.push(ArtifactKey::join(location, name)?);
            }
        }

        keys.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        Ok(keys)
    }
}
