//! Shared fixtures for the lifecycle tests
#![allow(dead_code)]

use std::sync::Arc;

use kubeforge_models::{Cloud, ClusterType, Metadata, StorageDocument};
use kubeforge_orchestrations::provider::civo::{CivoProvider, MockCivoApi};
use kubeforge_orchestrations::storage::MemoryStore;
use kubeforge_orchestrations::{ClusterManager, PollerSettings, StateStore};

pub const REGION: &str = "LON1";

pub fn ha_metadata(name: &str, cp: usize, wp: usize, ds: usize) -> Metadata {
    let mut meta = Metadata::new(Cloud::Civo, REGION, name, ClusterType::Ha);
    meta.no_cp = cp;
    meta.no_wp = wp;
    meta.no_ds = ds;
    meta.control_plane_node_type = "g3.small".to_string();
    meta.worker_plane_node_type = "g3.medium".to_string();
    meta.load_balancer_node_type = "g3.small".to_string();
    meta.data_store_node_type = "g3.small".to_string();
    meta
}

pub fn managed_metadata(name: &str, nodes: usize) -> Metadata {
    let mut meta = Metadata::new(Cloud::Civo, REGION, name, ClusterType::Managed);
    meta.no_mp = nodes;
    meta.managed_node_type = "g4s.kube.small".to_string();
    meta
}

/// A simulated Civo account plus the store that outlives individual managers
pub struct Harness {
    pub api: Arc<MockCivoApi>,
    pub store: Arc<MemoryStore>,
}

impl Harness {
    pub fn new() -> Self {
        Self {
            api: Arc::new(MockCivoApi::new()),
            store: Arc::new(MemoryStore::new()),
        }
    }

    /// A fresh provider and manager, as a new process would build them
    pub fn manager(&self, meta: &Metadata) -> ClusterManager {
        let provider = CivoProvider::new(meta, self.store.clone(), self.api.clone())
            .with_pollers(PollerSettings::immediate())
            .with_token("test-token");
        ClusterManager::new(Arc::new(provider), meta.clone())
    }

    pub async fn record(&self, meta: &Metadata) -> Option<StorageDocument> {
        match self.store.read(&meta.identity()).await {
            Ok(doc) => Some(doc),
            Err(e) if e.is_not_found() => None,
            Err(e) => panic!("store read failed: {e}"),
        }
    }
}
