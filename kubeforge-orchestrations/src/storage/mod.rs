//! Persistence for cluster state records.
//!
//! A [`StateStore`] holds one [`StorageDocument`] per [`ClusterIdentity`].
//! Providers never talk to a store directly; they go through a
//! [`ScopedStore`] bound to the cluster they are working on.

use std::sync::Arc;

use async_trait::async_trait;
use kubeforge_models::{Cloud, ClusterIdentity, ClusterType, StorageDocument};

use crate::error::Result;

pub mod local;
pub mod memory;
pub mod postgres;

pub use local::LocalStore;
pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Restricts `list_clusters` to a cloud and/or cluster type
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClusterFilter {
    pub cloud: Option<Cloud>,
    pub cluster_type: Option<ClusterType>,
}

impl ClusterFilter {
    pub fn matches(&self, id: &ClusterIdentity) -> bool {
        self.cloud.map_or(true, |c| c == id.cloud)
            && self.cluster_type.map_or(true, |t| t == id.cluster_type)
    }
}

#[async_trait]
pub trait StateStore: Send + Sync {
    /// Load a record. Returns [`crate::Error::NotFound`] if there is none.
    async fn read(&self, id: &ClusterIdentity) -> Result<StorageDocument>;

    /// Create or overwrite a record
    async fn write(&self, id: &ClusterIdentity, doc: &StorageDocument) -> Result<()>;

    /// Remove a record. Removing a missing record is not an error.
    async fn delete_cluster(&self, id: &ClusterIdentity) -> Result<()>;

    async fn list_clusters(&self, filter: &ClusterFilter) -> Result<Vec<StorageDocument>>;

    async fn already_created(&self, id: &ClusterIdentity) -> Result<bool> {
        match self.read(id).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }
}

/// A store bound to a single cluster identity
#[derive(Clone)]
pub struct ScopedStore {
    store: Arc<dyn StateStore>,
    identity: ClusterIdentity,
}

impl ScopedStore {
    pub fn identity(&self) -> &ClusterIdentity {
        &self.identity
    }

    pub async fn read(&self) -> Result<StorageDocument> {
        self.store.read(&self.identity).await
    }

    pub async fn write(&self, doc: &StorageDocument) -> Result<()> {
        self.store.write(&self.identity, doc).await
    }

    pub async fn delete_cluster(&self) -> Result<()> {
        self.store.delete_cluster(&self.identity).await
    }

    pub async fn already_created(&self) -> Result<bool> {
        self.store.already_created(&self.identity).await
    }
}

/// Bind a store to one cluster
pub fn setup(store: Arc<dyn StateStore>, identity: ClusterIdentity) -> ScopedStore {
    ScopedStore { store, identity }
}
