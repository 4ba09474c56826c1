//! Local back-end: managed clusters only, backed by kind

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use kubeforge_models::{
    Cloud, ClusterResourceState, K8sDistro, ManagedClusterState, Metadata, Operation, Role,
    StorageDocument,
};
use tracing::{info, warn};

use crate::error::{Error, ErrorContext, Result};
use crate::provider::{validation, CloudProvider, ManagedClusterRequest, ManagedOutcome, VmRequest};
use crate::scaling::Sizing;
use crate::state::ClusterState;
use crate::storage::{self, StateStore};

pub mod kind;

pub use kind::{KindApi, KindCli, MockKind};

pub const LOCAL_REGION: &str = "LOCAL";
const DEFAULT_K8S_VERSION: &str = "1.30.0";
const NODE_SIZE: &str = "local_machine";

pub struct LocalProvider {
    kind: Arc<dyn KindApi>,
    state: Arc<ClusterState>,
    cluster_name: String,
    k8s_version: String,
}

impl LocalProvider {
    /// Local clusters always live in the `LOCAL` region regardless of what
    /// the metadata says
    pub fn new(metadata: &Metadata, store: Arc<dyn StateStore>, kind: Arc<dyn KindApi>) -> Self {
        let mut identity = metadata.identity();
        identity.region = LOCAL_REGION.to_string();
        let k8s_version = if metadata.k8s_version.is_empty() {
            DEFAULT_K8S_VERSION.to_string()
        } else {
            metadata.k8s_version.trim_start_matches('v').to_string()
        };
        Self {
            kind,
            state: Arc::new(ClusterState::new(storage::setup(store, identity))),
            cluster_name: metadata.cluster_name.clone(),
            k8s_version,
        }
    }

    fn context_name(&self) -> String {
        format!("kind-{}", self.cluster_name)
    }

    fn unsupported(operation: &'static str) -> Error {
        Error::Unsupported {
            operation,
            cloud: Cloud::Local,
        }
    }

    async fn create_kind_cluster(&self, req: &ManagedClusterRequest) -> Result<ManagedOutcome> {
        let (cni, external_cni) = match req.cni.to_ascii_lowercase().as_str() {
            "" | "kind" => ("kind".to_string(), false),
            _ => ("none".to_string(), true),
        };
        if external_cni {
            warn!(cni = %req.cni, "default kind cni disabled, it must be installed separately");
        }
        let outcome = ManagedOutcome { external_cni };

        let (existing, completed) = self
            .state
            .read(|doc| (doc.infra.managed.clone(), doc.infra.is_completed))
            .await?;
        if existing.is_present() && completed {
            info!(cluster = %existing.name, "skipped kind cluster creation, already exists");
            return Ok(outcome);
        }

        let managed = ManagedClusterState {
            id: self.context_name(),
            name: self.cluster_name.clone(),
            node_count: req.node_count,
            node_size: NODE_SIZE.to_string(),
            applications: req.applications.clone(),
            cni,
        };
        let version = self.k8s_version.clone();
        self.state
            .update(move |doc| {
                doc.infra.managed = managed;
                doc.infra.kubernetes_version = version;
                doc.bootstrap_provider = K8sDistro::Kind;
                Ok(())
            })
            .await?;

        if self.kind.exists(&self.cluster_name).await? {
            info!(cluster = %self.cluster_name, "kind cluster already running, resuming");
        } else {
            let config = kind::render_config(req.node_count, external_cni)?;
            let image = format!("kindest/node:v{}", self.k8s_version);
            info!(cluster = %self.cluster_name, %image, nodes = req.node_count, "creating kind cluster");
            self.kind.create(&self.cluster_name, &config, &image).await?;
        }

        let kubeconfig = self.kind.kubeconfig(&self.cluster_name).await?;
        let context = self.context_name();
        self.state
            .update(move |doc| {
                doc.kubeconfig = kubeconfig;
                doc.kubeconfig_context = context;
                doc.infra.is_completed = true;
                Ok(())
            })
            .await?;
        info!(cluster = %self.cluster_name, "kind cluster is ready");
        Ok(outcome)
    }
}

#[async_trait]
impl CloudProvider for LocalProvider {
    fn cloud(&self) -> Cloud {
        Cloud::Local
    }

    fn state(&self) -> &Arc<ClusterState> {
        &self.state
    }

    fn supports_ha(&self) -> bool {
        false
    }

    async fn init_state(&self, operation: Operation) -> Result<()> {
        validation::validate_cluster_name(&self.cluster_name)?;
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
                let mut doc = StorageDocument::new(&identity);
                doc.bootstrap_provider = K8sDistro::Kind;
                self.state.install(doc, true).await
            }
            (_, Some(doc)) => self.state.install(doc, false).await,
            (operation, None) => Err(Error::NotFound(format!(
                "cluster {} (required for {})",
                identity, operation
            ))),
        }
    }

    async fn new_network(&self, _name: &str) -> Result<()> {
        info!("skipped network creation, kind uses the docker network");
        Ok(())
    }

    async fn del_network(&self) -> Result<()> {
        self.state.remove().await?;
        info!(cluster = %self.state.identity(), "removed cluster state record");
        Ok(())
    }

    async fn create_upload_ssh_key_pair(&self, _name: &str) -> Result<()> {
        Err(Self::unsupported("ssh key upload"))
    }

    async fn del_ssh_key_pair(&self) -> Result<()> {
        info!("skipped ssh key deletion, not used by kind");
        Ok(())
    }

    async fn new_firewall(&self, _role: Role, _name: &str) -> Result<()> {
        Err(Self::unsupported("firewall creation"))
    }

    async fn del_firewall(&self, role: Role) -> Result<()> {
        info!(%role, "skipped firewall deletion, not used by kind");
        Ok(())
    }

    async fn new_vm(&self, _request: &VmRequest) -> Result<()> {
        Err(Self::unsupported("vm creation"))
    }

    async fn del_vm(&self, role: Role, index: usize) -> Result<()> {
        info!(%role, index, "skipped vm deletion, not used by kind");
        Ok(())
    }

    async fn new_managed_cluster(&self, request: &ManagedClusterRequest) -> Result<ManagedOutcome> {
        self.create_kind_cluster(request)
            .await
            .with_context(|| format!("creating kind cluster {}", self.cluster_name))
    }

    async fn del_managed_cluster(&self) -> Result<()> {
        let existing = self.state.read(|doc| doc.infra.managed.clone()).await?;
        if !existing.is_present() {
            info!("skipped kind cluster deletion, already deleted");
            return Ok(());
        }

        self.kind
            .delete(&self.cluster_name)
            .await
            .with_context(|| format!("deleting kind cluster {}", self.cluster_name))?;
        self.state
            .update(|doc| {
                doc.infra.managed = ManagedClusterState::default();
                doc.infra.is_completed = false;
                doc.kubeconfig.clear();
                doc.kubeconfig_context.clear();
                Ok(())
            })
            .await?;
        info!(cluster = %self.cluster_name, "deleted kind cluster");
        Ok(())
    }

    async fn no_of_control_plane(&self, _sizing: Sizing) -> Result<usize> {
        Err(Self::unsupported("control plane sizing"))
    }

    async fn no_of_worker_plane(&self, _sizing: Sizing) -> Result<usize> {
        Err(Self::unsupported("worker plane sizing"))
    }

    async fn no_of_data_store(&self, _sizing: Sizing) -> Result<usize> {
        Err(Self::unsupported("data store sizing"))
    }

    async fn get_state_for_cluster(&self) -> Result<ClusterResourceState> {
        Err(Self::unsupported("vm state export"))
    }

    async fn hostnames(&self, _role: Role) -> Result<Vec<String>> {
        Err(Self::unsupported("vm hostnames"))
    }

    async fn get_secret_tokens(&self) -> Result<BTreeMap<String, String>> {
        Ok(BTreeMap::new())
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use kubeforge_models::ClusterType;

    fn provider() -> (Arc<MockKind>, Arc<MemoryStore>, LocalProvider) {
        let kind = Arc::new(MockKind::new());
        let store = Arc::new(MemoryStore::new());
        let mut meta = Metadata::new(Cloud::Local, "anywhere", "dev", ClusterType::Managed);
        meta.no_mp = 2;
        let p = LocalProvider::new(&meta, store.clone(), kind.clone());
        (kind, store, p)
    }

    fn request(nodes: usize) -> ManagedClusterRequest {
        ManagedClusterRequest {
            name: "dev".into(),
            node_count: nodes,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_region_forced_local() {
        let (_, _, p) = provider();
        assert_eq!(p.state().identity().region, LOCAL_REGION);
    }

    #[tokio::test]
    async fn test_create_and_delete_kind_cluster() {
        let (kind, store, p) = provider();
        p.init_state(Operation::Create).await.unwrap();
        p.new_network("ignored").await.unwrap();
        let outcome = p.new_managed_cluster(&request(2)).await.unwrap();
        assert!(!outcome.external_cni);
        assert_eq!(kind.creates(), vec![("dev".to_string(), "kindest/node:v1.30.0".to_string())]);
        assert!(p.get_kubeconfig().await.unwrap().contains("kind-dev"));

        let doc = p.state().snapshot().await.unwrap();
        assert!(doc.infra.is_completed);
        assert_eq!(doc.kubeconfig_context, "kind-dev");

        p.del_managed_cluster().await.unwrap();
        p.del_network().await.unwrap();
        assert_eq!(kind.running(), 0);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_repeat_create_is_noop() {
        let (kind, _, p) = provider();
        p.init_state(Operation::Create).await.unwrap();
        p.new_managed_cluster(&request(1)).await.unwrap();
        p.new_managed_cluster(&request(1)).await.unwrap();
        assert_eq!(kind.creates().len(), 1);
        assert!(p.init_state(Operation::Create).await.unwrap_err().is_duplicate());
    }

    #[tokio::test]
    async fn test_vm_operations_unsupported() {
        let (_, _, p) = provider();
        assert!(!p.supports_ha());
        let err = p.no_of_worker_plane(Sizing::Get).await.unwrap_err();
        assert!(matches!(err, Error::Unsupported { cloud: Cloud::Local, .. }));
    }

    #[tokio::test]
    async fn test_unused_deletes_succeed() {
        let (kind, _, p) = provider();
        p.init_state(Operation::Create).await.unwrap();
        p.new_managed_cluster(&request(1)).await.unwrap();

        p.del_ssh_key_pair().await.unwrap();
        for role in Role::ALL {
            p.del_firewall(role).await.unwrap();
        }
        p.del_vm(Role::WorkerPlane, 0).await.unwrap();
        p.del_vm(Role::ControlPlane, 2).await.unwrap();

        assert_eq!(kind.running(), 1);
        assert!(p.state().snapshot().await.unwrap().infra.is_completed);
    }

    #[tokio::test]
    async fn test_delete_twice_is_noop() {
        let (kind, _, p) = provider();
        p.init_state(Operation::Create).await.unwrap();
        p.new_managed_cluster(&request(1)).await.unwrap();

        p.del_managed_cluster().await.unwrap();
        p.del_managed_cluster().await.unwrap();
        assert_eq!(kind.running(), 0);
    }

    #[tokio::test]
    async fn test_external_cni_disables_default() {
        let (_, _, p) = provider();
        p.init_state(Operation::Create).await.unwrap();
        let req = ManagedClusterRequest {
            cni: "cilium".into(),
            ..request(1)
        };
        assert!(p.new_managed_cluster(&req).await.unwrap().external_cni);
    }
}
