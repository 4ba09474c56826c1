//! Kubeforge Orchestrations - resumable cluster provisioning across cloud back-ends
//!
//! This crate provides the provider contract, the Civo and local (kind)
//! back-ends, and the [`ClusterManager`] flows that create, scale and tear
//! down clusters. All progress is written to a [`StateStore`] as it happens,
//! so an interrupted run picks up where it stopped.
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use kubeforge_models::{Cloud, ClusterType, Metadata};
//! use kubeforge_orchestrations::provider::civo::{CivoClient, CivoProvider};
//! use kubeforge_orchestrations::storage::LocalStore;
//! use kubeforge_orchestrations::ClusterManager;
//!
//! # async fn example() -> kubeforge_orchestrations::Result<()> {
//! let mut meta = Metadata::new(Cloud::Civo, "LON1", "demo", ClusterType::Managed);
//! meta.no_mp = 3;
//! meta.managed_node_type = "g4s.kube.small".to_string();
//!
//! let store = Arc::new(LocalStore::new("/tmp/kubeforge"));
//! let api = Arc::new(CivoClient::new("token"));
//! let provider = CivoProvider::new(&meta, store, api);
//!
//! ClusterManager::new(Arc::new(provider), meta)
//!     .create_managed_cluster()
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod bootstrap;
pub mod error;
pub mod fleet;
pub mod manager;
pub mod names;
pub mod phase;
pub mod poller;
pub mod provider;
pub mod scaling;
pub mod state;
pub mod storage;

// Re-export key types for convenience
pub use bootstrap::Bootstrapper;
pub use error::{Error, ErrorContext, FleetFailure, Result};
pub use manager::{list_clusters, ClusterManager};
pub use phase::{HaPhase, ManagedPhase};
pub use poller::{PollerConfig, PollerSettings};
pub use provider::CloudProvider;
pub use scaling::Sizing;
pub use state::ClusterState;
pub use storage::{ClusterFilter, StateStore};
