//! Filesystem store.
//!
//! Layout: `<root>/state/<cloud>/<cluster_type>/<name> <region>/state.json`.
//! Writes go to a temporary file in the same directory and are renamed into
//! place so a crash never leaves a truncated record behind.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use kubeforge_models::{Cloud, ClusterIdentity, ClusterType, StorageDocument};
use tokio::fs;
use tracing::debug;

use super::{ClusterFilter, StateStore};
use crate::error::{Error, Result};

const STATE_FILE: &str = "state.json";

pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn cluster_dir(&self, id: &ClusterIdentity) -> PathBuf {
        self.root
            .join("state")
            .join(id.cloud.as_str())
            .join(id.cluster_type.as_str())
            .join(format!("{} {}", id.name, id.region))
    }

    fn state_path(&self, id: &ClusterIdentity) -> PathBuf {
        self.cluster_dir(id).join(STATE_FILE)
    }

    async fn read_path(path: &Path) -> Result<StorageDocument> {
        let raw = fs::read(path).await.map_err(|e| {
            Error::storage(format!("failed to read {}: {}", path.display(), e))
        })?;
        serde_json::from_slice(&raw)
            .map_err(|e| Error::storage(format!("corrupt record {}: {}", path.display(), e)))
    }
}

#[async_trait]
impl StateStore for LocalStore {
    async fn read(&self, id: &ClusterIdentity) -> Result<StorageDocument> {
        let path = self.state_path(id);
        if !fs::try_exists(&path).await.unwrap_or(false) {
            return Err(Error::NotFound(format!("state record for {}", id)));
        }
        Self::read_path(&path).await
    }

    async fn write(&self, id: &ClusterIdentity, doc: &StorageDocument) -> Result<()> {
        let dir = self.cluster_dir(id);
        fs::create_dir_all(&dir)
            .await
            .map_err(|e| Error::storage(format!("failed to create {}: {}", dir.display(), e)))?;

        let raw = serde_json::to_vec_pretty(doc).map_err(Error::storage)?;
        let tmp = dir.join(format!("{}.tmp", STATE_FILE));
        let path = dir.join(STATE_FILE);
        fs::write(&tmp, raw)
            .await
            .map_err(|e| Error::storage(format!("failed to write {}: {}", tmp.display(), e)))?;
        fs::rename(&tmp, &path)
            .await
            .map_err(|e| Error::storage(format!("failed to replace {}: {}", path.display(), e)))?;

        debug!(path = %path.display(), "persisted state record");
        Ok(())
    }

    async fn delete_cluster(&self, id: &ClusterIdentity) -> Result<()> {
        let dir = self.cluster_dir(id);
        match fs::remove_dir_all(&dir).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::storage(format!(
                "failed to remove {}: {}",
                dir.display(),
                e
            ))),
        }
    }

    async fn list_clusters(&self, filter: &ClusterFilter) -> Result<Vec<StorageDocument>> {
        let clouds = filter
            .cloud
            .map(|c| vec![c])
            .unwrap_or_else(|| vec![Cloud::Civo, Cloud::Local]);
        let types = filter
            .cluster_type
            .map(|t| vec![t])
            .unwrap_or_else(|| vec![ClusterType::Ha, ClusterType::Managed]);

        let mut docs = Vec::new();
        for cloud in &clouds {
            for cluster_type in &types {
                let dir = self
                    .root
                    .join("state")
                    .join(cloud.as_str())
                    .join(cluster_type.as_str());
                let mut entries = match fs::read_dir(&dir).await {
                    Ok(entries) => entries,
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                    Err(e) => return Err(Error::storage(e)),
                };
                while let Some(entry) = entries.next_entry().await.map_err(Error::storage)? {
                    let path = entry.path().join(STATE_FILE);
                    if fs::try_exists(&path).await.unwrap_or(false) {
                        docs.push(Self::read_path(&path).await?);
                    }
                }
            }
        }
        docs.sort_by(|a, b| a.identity().cmp(&b.identity()));
        Ok(docs)
    }
}
