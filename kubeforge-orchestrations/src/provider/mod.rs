//! The contract every cloud back-end implements.
//!
//! The orchestrator drives provisioning exclusively through
//! [`CloudProvider`]. Every operation is idempotent against the cluster's
//! state record: if the resource it would create is already recorded, it
//! logs a skip and returns success, and if the resource it would delete is
//! already gone, likewise.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use kubeforge_models::{Cloud, ClusterResourceState, Operation, Role};

use crate::error::Result;
use crate::scaling::Sizing;
use crate::state::ClusterState;

pub mod civo;
pub mod cloud_init;
pub mod firewall;
pub mod local;
pub mod ssh;
pub mod validation;

/// Input for creating VM `index` of `role`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VmRequest {
    pub name: String,
    pub role: Role,
    pub index: usize,
    pub vm_type: String,
    pub public: bool,
}

/// Input for creating a provider-managed cluster
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ManagedClusterRequest {
    pub name: String,
    pub vm_type: String,
    pub node_count: usize,
    /// Empty means provider default
    pub k8s_version: String,
    pub applications: Vec<String>,
    /// Empty means provider default
    pub cni: String,
}

/// What the caller must still do after a managed cluster comes up
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ManagedOutcome {
    /// The requested CNI is not provider-installed and must be deployed separately
    pub external_cni: bool,
}

#[async_trait]
pub trait CloudProvider: Send + Sync {
    fn cloud(&self) -> Cloud;

    /// Shared state record of the cluster this provider is bound to
    fn state(&self) -> &Arc<ClusterState>;

    /// Whether self-managed (HA) clusters can be built on this back-end
    fn supports_ha(&self) -> bool {
        true
    }

    /// Load or create the state record for `operation`.
    ///
    /// `Create` fails with a duplicate error if a completed record exists and
    /// resumes an incomplete one. `Get` and `Delete` require a record.
    async fn init_state(&self, operation: Operation) -> Result<()>;

    async fn new_network(&self, name: &str) -> Result<()>;

    /// Delete the network, then the cluster's state record
    async fn del_network(&self) -> Result<()>;

    async fn create_upload_ssh_key_pair(&self, name: &str) -> Result<()>;

    async fn del_ssh_key_pair(&self) -> Result<()>;

    async fn new_firewall(&self, role: Role, name: &str) -> Result<()>;

    async fn del_firewall(&self, role: Role) -> Result<()>;

    /// Create and wait for one VM. Safe to call concurrently for distinct
    /// `(role, index)` pairs.
    async fn new_vm(&self, request: &VmRequest) -> Result<()>;

    async fn del_vm(&self, role: Role, index: usize) -> Result<()>;

    async fn new_managed_cluster(&self, request: &ManagedClusterRequest) -> Result<ManagedOutcome>;

    async fn del_managed_cluster(&self) -> Result<()>;

    async fn no_of_control_plane(&self, sizing: Sizing) -> Result<usize>;

    async fn no_of_worker_plane(&self, sizing: Sizing) -> Result<usize>;

    async fn no_of_data_store(&self, sizing: Sizing) -> Result<usize>;

    /// Addresses and credentials needed to bootstrap Kubernetes on the VMs
    async fn get_state_for_cluster(&self) -> Result<ClusterResourceState>;

    /// Hostnames of every VM of `role`, in index order
    async fn hostnames(&self, role: Role) -> Result<Vec<String>>;

    /// Whether a state record exists for this cluster
    async fn is_present(&self) -> Result<bool> {
        self.state().store().already_created().await
    }

    /// Credentials the bootstrap layer needs to talk to the cloud
    async fn get_secret_tokens(&self) -> Result<BTreeMap<String, String>>;

    async fn get_kubeconfig(&self) -> Result<String>;
}

/// Dispatch a sizing request to the matching role accessor
pub async fn no_of_role(provider: &dyn CloudProvider, role: Role, sizing: Sizing) -> Result<usize> {
    match role {
        Role::ControlPlane => provider.no_of_control_plane(sizing).await,
        Role::WorkerPlane => provider.no_of_worker_plane(sizing).await,
        Role::DataStore => provider.no_of_data_store(sizing).await,
        Role::LoadBalancer => Ok(1),
    }
}
