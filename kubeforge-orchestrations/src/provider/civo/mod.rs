//! Civo back-end.
//!
//! Talks to Civo through [`CivoApi`] so the same provider logic runs against
//! the real REST API ([`CivoClient`]) or the in-memory [`MockCivoApi`].

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use kubeforge_models::{
    Cloud, ClusterResourceState, ClusterType, K8sDistro, Metadata, Operation, Role,
    StorageDocument,
};
use tracing::info;

use crate::error::{Error, ErrorContext, Result};
use crate::poller::PollerSettings;
use crate::provider::{validation, CloudProvider, ManagedClusterRequest, ManagedOutcome, VmRequest};
use crate::scaling::{self, Sizing};
use crate::state::ClusterState;
use crate::storage::{self, StateStore};

pub mod api;
pub mod client;
mod firewall;
mod managed;
pub mod mock;
mod network;
mod ssh;
mod vm;

pub use api::CivoApi;
pub use client::CivoClient;
pub use mock::MockCivoApi;

/// Login user baked into Civo images
const SSH_USER: &str = "root";
const DISK_IMAGE: &str = "ubuntu-focal";
pub const TOKEN_ENV: &str = "CIVO_TOKEN";

pub struct CivoProvider {
    api: Arc<dyn CivoApi>,
    state: Arc<ClusterState>,
    cluster_name: String,
    region: String,
    cluster_type: ClusterType,
    distro: K8sDistro,
    k8s_version: String,
    public: bool,
    pollers: PollerSettings,
    token: Option<String>,
}

impl CivoProvider {
    pub fn new(metadata: &Metadata, store: Arc<dyn StateStore>, api: Arc<dyn CivoApi>) -> Self {
        let scoped = storage::setup(store, metadata.identity());
        Self {
            api,
            state: Arc::new(ClusterState::new(scoped)),
            cluster_name: metadata.cluster_name.clone(),
            region: metadata.region.clone(),
            cluster_type: metadata.cluster_type,
            distro: metadata.k8s_distro,
            k8s_version: metadata.k8s_version.clone(),
            public: true,
            pollers: PollerSettings::default(),
            token: None,
        }
    }

    pub fn with_pollers(mut self, pollers: PollerSettings) -> Self {
        self.pollers = pollers;
        self
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    fn fresh_document(&self) -> StorageDocument {
        let mut doc = StorageDocument::new(self.state.identity());
        doc.bootstrap_provider = match self.cluster_type {
            ClusterType::Managed => K8sDistro::Managed,
            ClusterType::Ha => self.distro,
        };
        doc.infra.kubernetes_version = self.k8s_version.clone();
        doc
    }
}

#[async_trait]
impl CloudProvider for CivoProvider {
    fn cloud(&self) -> Cloud {
        Cloud::Civo
    }

    fn state(&self) -> &Arc<ClusterState> {
        &self.state
    }

    async fn init_state(&self, operation: Operation) -> Result<()> {
        validation::validate_cluster_name(&self.cluster_name)?;
        let regions = self
            .api
            .list_regions()
            .await
            .context("listing civo regions")?;
        validation::ensure_member("region", &self.region, &regions)?;

        let identity = self.state.identity().clone();
        match (operation, self.state.load().await?) {
            (Operation::Create, Some(doc)) if doc.infra.is_completed => {
                Err(Error::DuplicateRecord(identity))
            }
            (Operation::Create, Some(doc)) => {
                info!(cluster = %identity, "resuming incomplete cluster");
                self.state.install(doc, false).await
            }
            (Operation::Create, None) => {
                info!(cluster = %identity, "initialized new cluster state");
                self.state.install(self.fresh_document(), true).await
            }
            (_, Some(doc)) => self.state.install(doc, false).await,
            (operation, None) => Err(Error::NotFound(format!(
                "cluster {} (required for {})",
                identity, operation
            ))),
        }
    }

    async fn new_network(&self, name: &str) -> Result<()> {
        self.create_network(name)
            .await
            .with_context(|| format!("creating network {}", name))
    }

    async fn del_network(&self) -> Result<()> {
        self.delete_network().await.context("deleting network")
    }

    async fn create_upload_ssh_key_pair(&self, name: &str) -> Result<()> {
        self.create_ssh_key(name)
            .await
            .with_context(|| format!("creating ssh key {}", name))
    }

    async fn del_ssh_key_pair(&self) -> Result<()> {
        self.delete_ssh_key().await.context("deleting ssh key")
    }

    async fn new_firewall(&self, role: Role, name: &str) -> Result<()> {
        self.create_firewall(role, name)
            .await
            .with_context(|| format!("creating {} firewall {}", role, name))
    }

    async fn del_firewall(&self, role: Role) -> Result<()> {
        self.delete_firewall(role)
            .await
            .with_context(|| format!("deleting {} firewall", role))
    }

    async fn new_vm(&self, request: &VmRequest) -> Result<()> {
        self.create_vm(request)
            .await
            .with_context(|| format!("creating {} vm {}", request.role, request.name))
    }

    async fn del_vm(&self, role: Role, index: usize) -> Result<()> {
        self.delete_vm(role, index)
            .await
            .with_context(|| format!("deleting {} vm {}", role, index))
    }

    async fn new_managed_cluster(&self, request: &ManagedClusterRequest) -> Result<ManagedOutcome> {
        self.create_managed(request)
            .await
            .with_context(|| format!("creating managed cluster {}", request.name))
    }

    async fn del_managed_cluster(&self) -> Result<()> {
        self.delete_managed()
            .await
            .context("deleting managed cluster")
    }

    async fn no_of_control_plane(&self, sizing: Sizing) -> Result<usize> {
        scaling::apply(&self.state, Role::ControlPlane, sizing).await
    }

    async fn no_of_worker_plane(&self, sizing: Sizing) -> Result<usize> {
        scaling::apply(&self.state, Role::WorkerPlane, sizing).await
    }

    async fn no_of_data_store(&self, sizing: Sizing) -> Result<usize> {
        scaling::apply(&self.state, Role::DataStore, sizing).await
    }

    async fn get_state_for_cluster(&self) -> Result<ClusterResourceState> {
        let doc = self.state.snapshot().await?;
        if doc.cluster_type != ClusterType::Ha {
            return Err(Error::InvalidOperation(format!(
                "{} is not a self-managed cluster",
                doc.identity()
            )));
        }
        let infra = &doc.infra;
        let column = |role: Role, private: bool| -> Vec<String> {
            infra
                .role_set(role)
                .map(|set| {
                    if private {
                        set.private_ips().to_vec()
                    } else {
                        set.public_ips().to_vec()
                    }
                })
                .unwrap_or_default()
        };

        Ok(ClusterResourceState {
            ssh_user: infra.ssh_user.clone(),
            ssh_private_key: doc.ssh_key_pair.private_key.clone(),
            cluster_name: doc.cluster_name.clone(),
            region: doc.region.clone(),
            cloud: doc.cloud.to_string(),
            cluster_type: doc.cluster_type.to_string(),
            k8s_distro: doc.bootstrap_provider.to_string(),
            k8s_version: infra.kubernetes_version.clone(),
            ipv4_control_planes: column(Role::ControlPlane, false),
            ipv4_worker_planes: column(Role::WorkerPlane, false),
            ipv4_data_stores: column(Role::DataStore, false),
            ipv4_load_balancer: infra.load_balancer.public_ip.clone(),
            private_ipv4_control_planes: column(Role::ControlPlane, true),
            private_ipv4_data_stores: column(Role::DataStore, true),
            private_ipv4_load_balancer: infra.load_balancer.private_ip.clone(),
        })
    }

    async fn hostnames(&self, role: Role) -> Result<Vec<String>> {
        self.state
            .read(|doc| match role {
                Role::LoadBalancer => Ok(vec![doc.infra.load_balancer.hostname.clone()]),
                _ => doc
                    .infra
                    .role_set(role)
                    .map(|set| set.hostnames().to_vec())
                    .ok_or_else(|| Error::NotFound(format!("{} resources", role))),
            })
            .await?
    }

    async fn get_secret_tokens(&self) -> Result<BTreeMap<String, String>> {
        let token = self
            .token
            .as_ref()
            .ok_or_else(|| Error::NotFound(format!("{} credential", TOKEN_ENV)))?;
        Ok(BTreeMap::from([(TOKEN_ENV.to_string(), token.clone())]))
    }

    async fn get_kubeconfig(&self) -> Result<String> {
        let kubeconfig = self.state.read(|doc| doc.kubeconfig.clone()).await?;
        if kubeconfig.is_empty() {
            return Err(Error::NotFound(format!(
                "kubeconfig for {}",
                self.state.identity()
            )));
        }
        Ok(kubeconfig)
    }
}
