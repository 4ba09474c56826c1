//! In-process store used by tests and dry runs.
//!
//! Documents are kept serialized so every read goes through the same JSON
//! round trip as the persistent stores.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use kubeforge_models::{ClusterIdentity, StorageDocument};

use super::{ClusterFilter, StateStore};
use crate::error::{Error, Result};

#[derive(Default)]
pub struct MemoryStore {
    records: Mutex<BTreeMap<ClusterIdentity, String>>,
    writes: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful writes since creation
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.records.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<ClusterIdentity, String>>> {
        self.records
            .lock()
            .map_err(|_| Error::storage("memory store lock poisoned"))
    }
}

#[async_trait]
impl StateStore for MemoryStore {
    async fn read(&self, id: &ClusterIdentity) -> Result<StorageDocument> {
        let records = self.lock()?;
        let raw = records
            .get(id)
            .ok_or_else(|| Error::NotFound(format!("state record for {}", id)))?;
        serde_json::from_str(raw).map_err(Error::storage)
    }

    async fn write(&self, id: &ClusterIdentity, doc: &StorageDocument) -> Result<()> {
        let raw = serde_json::to_string(doc).map_err(Error::storage)?;
        self.lock()?.insert(id.clone(), raw);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn delete_cluster(&self, id: &ClusterIdentity) -> Result<()> {
        self.lock()?.remove(id);
        Ok(())
    }

    async fn list_clusters(&self, filter: &ClusterFilter) -> Result<Vec<StorageDocument>> {
        let records = self.lock()?;
        records
            .iter()
            .filter(|(id, _)| filter.matches(id))
            .map(|(_, raw)| serde_json::from_str(raw).map_err(Error::storage))
            .collect()
    }
}
