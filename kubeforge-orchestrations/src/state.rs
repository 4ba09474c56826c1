//! Shared, lock-protected cluster state for one operation.
//!
//! Every provider owns one [`ClusterState`]. Concurrent fleet tasks mutate it
//! through [`ClusterState::update`], which holds the lock only while the
//! closure runs and the record is written back to the store. Provider API
//! calls always happen outside the lock.

use chrono::Utc;
use kubeforge_models::{ClusterIdentity, StorageDocument};
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::{Error, Result};
use crate::storage::ScopedStore;

pub struct ClusterState {
    store: ScopedStore,
    doc: Mutex<Option<StorageDocument>>,
}

impl ClusterState {
    pub fn new(store: ScopedStore) -> Self {
        Self {
            store,
            doc: Mutex::new(None),
        }
    }

    pub fn identity(&self) -> &ClusterIdentity {
        self.store.identity()
    }

    pub fn store(&self) -> &ScopedStore {
        &self.store
    }

    /// Fetch the persisted record without installing it
    pub async fn load(&self) -> Result<Option<StorageDocument>> {
        match self.store.read().await {
            Ok(doc) => Ok(Some(doc)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Make `doc` the working record, optionally persisting it right away
    pub async fn install(&self, doc: StorageDocument, persist: bool) -> Result<()> {
        let mut guard = self.doc.lock().await;
        if persist {
            self.store.write(&doc).await?;
        }
        *guard = Some(doc);
        Ok(())
    }

    pub async fn snapshot(&self) -> Result<StorageDocument> {
        self.read(StorageDocument::clone).await
    }

    /// Inspect the working record under the lock
    pub async fn read<R, F>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&StorageDocument) -> R,
    {
        let guard = self.doc.lock().await;
        let doc = guard.as_ref().ok_or_else(not_initialized)?;
        Ok(f(doc))
    }

    /// Mutate the working record and persist it before releasing the lock.
    ///
    /// If `f` returns an error nothing is written, so `f` must validate
    /// before it mutates.
    pub async fn update<R, F>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&mut StorageDocument) -> Result<R> + Send,
        R: Send,
    {
        let mut guard = self.doc.lock().await;
        let doc = guard.as_mut().ok_or_else(not_initialized)?;
        let out = f(doc)?;
        doc.updated_at = Some(Utc::now());
        self.store.write(doc).await?;
        debug!(cluster = %self.identity(), "state record updated");
        Ok(out)
    }

    /// Delete the persisted record. The in-memory copy stays readable.
    pub async fn remove(&self) -> Result<()> {
        let _guard = self.doc.lock().await;
        self.store.delete_cluster().await
    }
}

fn not_initialized() -> Error {
    Error::InvalidOperation("cluster state has not been initialized".to_string())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::storage::{self, MemoryStore, StateStore};
    use kubeforge_models::{Cloud, ClusterType, ResourceRef};

    fn state() -> (Arc<MemoryStore>, ClusterState) {
        let mem = Arc::new(MemoryStore::new());
        let id = ClusterIdentity::new(Cloud::Civo, "LON1", "demo", ClusterType::Ha);
        let store: Arc<dyn StateStore> = mem.clone();
        (mem, ClusterState::new(storage::setup(store, id)))
    }

    #[tokio::test]
    async fn test_update_requires_initialization() {
        let (_, state) = state();
        let err = state.update(|_| Ok(())).await.unwrap_err();
        assert!(matches!(err, Error::InvalidOperation(_)));
    }

    #[tokio::test]
    async fn test_update_persists() {
        let (mem, state) = state();
        let doc = StorageDocument::new(state.identity());
        state.install(doc, false).await.unwrap();
        assert_eq!(mem.write_count(), 0);

        state
            .update(|doc| {
                doc.infra.network = ResourceRef::new("net-1", "demo-net");
                Ok(())
            })
            .await
            .unwrap();

        let stored = state.store().read().await.unwrap();
        assert_eq!(stored.infra.network.id, "net-1");
        assert_eq!(mem.write_count(), 1);
    }

    #[tokio::test]
    async fn test_failed_update_is_not_persisted() {
        let (mem, state) = state();
        state
            .install(StorageDocument::new(state.identity()), true)
            .await
            .unwrap();

        let res: Result<()> = state
            .update(|_| Err(Error::InvalidOperation("nope".into())))
            .await;
        assert!(res.is_err());
        assert_eq!(mem.write_count(), 1);
    }
}
