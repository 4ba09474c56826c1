//! Cluster lifecycle orchestration.
//!
//! Each flow walks a fixed sequence of provider calls. Every call is
//! idempotent against the persisted state record, so re-running a flow after
//! a failure resumes from the first step whose resource is still missing.

use std::collections::BTreeMap;
use std::sync::Arc;

use kubeforge_models::{ClusterResourceState, ClusterSummary, ClusterType, Metadata, Operation, Role};
use tracing::{info, warn};

use crate::bootstrap::Bootstrapper;
use crate::error::{Error, ErrorContext, Result};
use crate::fleet::{self, FleetPlan};
use crate::names;
use crate::phase::{phase_name, summarize};
use crate::provider::{
    no_of_role, validation, CloudProvider, ManagedClusterRequest, ManagedOutcome,
};
use crate::scaling::{self, Sizing};
use crate::storage::{ClusterFilter, StateStore};

/// Firewalls are created in this order and deleted in [`FIREWALL_DELETE_ORDER`]
const FIREWALL_CREATE_ORDER: [Role; 4] = [
    Role::LoadBalancer,
    Role::DataStore,
    Role::ControlPlane,
    Role::WorkerPlane,
];
const FIREWALL_DELETE_ORDER: [Role; 4] = [
    Role::DataStore,
    Role::ControlPlane,
    Role::WorkerPlane,
    Role::LoadBalancer,
];

/// Drives one cluster through its lifecycle on one provider
pub struct ClusterManager {
    provider: Arc<dyn CloudProvider>,
    metadata: Metadata,
    bootstrapper: Option<Arc<dyn Bootstrapper>>,
}

impl ClusterManager {
    pub fn new(provider: Arc<dyn CloudProvider>, metadata: Metadata) -> Self {
        Self {
            provider,
            metadata,
            bootstrapper: None,
        }
    }

    pub fn with_bootstrapper(mut self, bootstrapper: Arc<dyn Bootstrapper>) -> Self {
        self.bootstrapper = Some(bootstrapper);
        self
    }

    pub fn provider(&self) -> &Arc<dyn CloudProvider> {
        &self.provider
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    fn cluster(&self) -> &str {
        &self.metadata.cluster_name
    }

    fn expect_type(&self, expected: ClusterType) -> Result<()> {
        if self.metadata.cluster_type != expected {
            return Err(Error::InvalidOperation(format!(
                "{} is a {} cluster, not {}",
                self.cluster(),
                self.metadata.cluster_type,
                expected
            )));
        }
        Ok(())
    }

    async fn log_phase(&self) {
        if let Ok(doc) = self.provider.state().snapshot().await {
            info!(cluster = %self.cluster(), phase = %phase_name(&doc), "phase reached");
        }
    }

    /// Counts are checked before any state is written so a bad request
    /// leaves nothing behind
    fn validate_ha_request(&self) -> Result<()> {
        validation::validate_cluster_name(self.cluster())?;
        if !self.provider.supports_ha() {
            return Err(Error::Unsupported {
                operation: "self-managed clusters",
                cloud: self.provider.cloud(),
            });
        }
        scaling::validate_count(Role::ControlPlane, self.metadata.no_cp)?;
        scaling::validate_count(Role::DataStore, self.metadata.no_ds)?;
        if self.metadata.no_ds > 1 {
            return Err(Error::constraint(
                Role::DataStore,
                format!(
                    "multiple data stores are not supported, got {}",
                    self.metadata.no_ds
                ),
            ));
        }
        Ok(())
    }

    /// Provision a self-managed cluster and hand its inventory to the
    /// bootstrapper
    pub async fn create_ha_cluster(&self) -> Result<ClusterResourceState> {
        self.expect_type(ClusterType::Ha)?;
        self.validate_ha_request()?;
        let provider = &self.provider;
        let cluster = self.cluster();

        info!(%cluster, cloud = %provider.cloud(), "creating self-managed cluster");
        provider.init_state(Operation::Create).await?;

        info!(%cluster, "step 1: network");
        provider.new_network(&names::network(cluster)).await?;

        for role in [Role::ControlPlane, Role::WorkerPlane, Role::DataStore] {
            no_of_role(provider.as_ref(), role, Sizing::Set(self.metadata.count_for(role)))
                .await
                .with_context(|| format!("sizing {} for {}", role, cluster))?;
        }
        self.log_phase().await;

        info!(%cluster, "step 2: ssh key");
        provider
            .create_upload_ssh_key_pair(&names::ssh_key(cluster))
            .await?;

        info!(%cluster, "step 3: firewalls");
        for role in FIREWALL_CREATE_ORDER {
            provider
                .new_firewall(role, &names::firewall(cluster, role))
                .await?;
        }
        self.log_phase().await;

        info!(%cluster, "step 4: virtual machines");
        let plan = |role: Role| FleetPlan {
            cluster_name: cluster.to_string(),
            role,
            vm_type: self.metadata.node_type_for(role).to_string(),
            indices: 0..self.metadata.count_for(role),
        };
        let (lb, ds, cp, wp) = tokio::join!(
            fleet::create_vms(provider.clone(), plan(Role::LoadBalancer)),
            fleet::create_vms(provider.clone(), plan(Role::DataStore)),
            fleet::create_vms(provider.clone(), plan(Role::ControlPlane)),
            fleet::create_vms(provider.clone(), plan(Role::WorkerPlane)),
        );
        let results = [lb, ds, cp, wp];
        log_failures(&results);
        let [lb, ds, cp, wp] = results;
        lb?;
        ds?;
        cp?;
        wp?;
        self.log_phase().await;

        let resources = provider.get_state_for_cluster().await?;
        if let Some(bootstrapper) = &self.bootstrapper {
            info!(%cluster, distro = %resources.k8s_distro, "step 5: bootstrap");
            bootstrapper
                .bootstrap(&resources)
                .await
                .with_context(|| format!("bootstrapping {}", cluster))?;
        }

        info!(%cluster, "self-managed cluster created");
        Ok(resources)
    }

    /// Tear down a self-managed cluster in the reverse order of creation
    pub async fn delete_ha_cluster(&self) -> Result<()> {
        self.expect_type(ClusterType::Ha)?;
        let provider = &self.provider;
        let cluster = self.cluster();

        info!(%cluster, cloud = %provider.cloud(), "deleting self-managed cluster");
        provider.init_state(Operation::Delete).await?;

        // The record is the source of truth here, the caller's flags may be empty
        let mut counts = [0usize; 4];
        for (slot, role) in counts.iter_mut().zip(Role::ALL) {
            *slot = match no_of_role(provider.as_ref(), role, Sizing::Get).await {
                Ok(n) => n,
                Err(e) if e.is_not_found() => 0,
                Err(e) => return Err(e),
            };
        }
        let [lb, ds, cp, wp] = counts;
        info!(%cluster, lb, ds, cp, wp, "step 1: virtual machines");

        let results = [
            fleet::delete_vms(provider.clone(), Role::LoadBalancer, 0..lb),
            fleet::delete_vms(provider.clone(), Role::DataStore, 0..ds),
            fleet::delete_vms(provider.clone(), Role::ControlPlane, 0..cp),
            fleet::delete_vms(provider.clone(), Role::WorkerPlane, 0..wp),
        ];
        let results: Vec<Result<()>> = futures::future::join_all(results).await;
        log_failures(&results);
        for result in results {
            result?;
        }

        info!(%cluster, "step 2: firewalls");
        for role in FIREWALL_DELETE_ORDER {
            provider.del_firewall(role).await?;
        }

        info!(%cluster, "step 3: ssh key");
        provider.del_ssh_key_pair().await?;

        info!(%cluster, "step 4: network");
        provider.del_network().await?;

        info!(%cluster, "self-managed cluster deleted");
        Ok(())
    }

    pub async fn create_managed_cluster(&self) -> Result<ManagedOutcome> {
        self.expect_type(ClusterType::Managed)?;
        validation::validate_cluster_name(self.cluster())?;
        if self.metadata.no_mp < 1 {
            return Err(Error::validation(
                "node count",
                "a managed cluster needs at least one node",
            ));
        }
        let provider = &self.provider;
        let cluster = self.cluster();

        info!(%cluster, cloud = %provider.cloud(), "creating managed cluster");
        provider.init_state(Operation::Create).await?;

        info!(%cluster, "step 1: network");
        provider
            .new_network(&names::managed_network(cluster))
            .await?;
        self.log_phase().await;

        info!(%cluster, nodes = self.metadata.no_mp, "step 2: managed cluster");
        let request = ManagedClusterRequest {
            name: names::managed_cluster(cluster),
            vm_type: self.metadata.managed_node_type.clone(),
            node_count: self.metadata.no_mp,
            k8s_version: self.metadata.k8s_version.clone(),
            applications: self.metadata.applications.clone(),
            cni: self.metadata.cni.clone(),
        };
        let outcome = provider.new_managed_cluster(&request).await?;
        if outcome.external_cni {
            warn!(%cluster, cni = %self.metadata.cni, "cni must be installed separately");
        }
        self.log_phase().await;

        info!(%cluster, "managed cluster created");
        Ok(outcome)
    }

    pub async fn delete_managed_cluster(&self) -> Result<()> {
        self.expect_type(ClusterType::Managed)?;
        let provider = &self.provider;
        let cluster = self.cluster();

        info!(%cluster, cloud = %provider.cloud(), "deleting managed cluster");
        provider.init_state(Operation::Delete).await?;

        info!(%cluster, "step 1: managed cluster");
        provider.del_managed_cluster().await?;

        info!(%cluster, "step 2: network");
        provider.del_network().await?;

        info!(%cluster, "managed cluster deleted");
        Ok(())
    }

    /// Grow the worker plane to `desired` VMs. Returns the previous count.
    ///
    /// Every index is visited, so slots left empty by an earlier failed
    /// scale-up are filled as well.
    pub async fn add_worker_nodes(&self, desired: usize) -> Result<usize> {
        self.expect_type(ClusterType::Ha)?;
        let provider = &self.provider;
        let cluster = self.cluster();
        provider.init_state(Operation::Get).await?;

        let current = provider.no_of_worker_plane(Sizing::Get).await?;
        if desired < current {
            return Err(Error::constraint(
                Role::WorkerPlane,
                format!(
                    "scale up to {} would remove VMs (have {}), scale down instead",
                    desired, current
                ),
            ));
        }

        info!(%cluster, from = current, to = desired, "scaling up worker plane");
        provider.no_of_worker_plane(Sizing::Set(desired)).await?;
        fleet::create_vms(
            provider.clone(),
            FleetPlan {
                cluster_name: cluster.to_string(),
                role: Role::WorkerPlane,
                vm_type: self.metadata.worker_plane_node_type.clone(),
                indices: 0..desired,
            },
        )
        .await?;
        Ok(current)
    }

    /// Shrink the worker plane to `desired` VMs, deleting the trailing ones
    /// first. Returns the hostnames of the removed VMs.
    pub async fn del_worker_nodes(&self, desired: usize) -> Result<Vec<String>> {
        self.expect_type(ClusterType::Ha)?;
        let provider = &self.provider;
        let cluster = self.cluster();
        provider.init_state(Operation::Get).await?;

        let hostnames = provider.hostnames(Role::WorkerPlane).await?;
        let current = hostnames.len();
        if desired > current {
            return Err(Error::constraint(
                Role::WorkerPlane,
                format!(
                    "scale down to {} would add VMs (have {}), scale up instead",
                    desired, current
                ),
            ));
        }
        if desired == current {
            info!(%cluster, count = current, "skipped scale down, count unchanged");
            return Ok(Vec::new());
        }

        info!(%cluster, from = current, to = desired, "scaling down worker plane");
        // slots sized but never created have nothing to drain
        let removed: Vec<String> = hostnames[desired..]
            .iter()
            .filter(|hostname| !hostname.is_empty())
            .cloned()
            .collect();
        fleet::delete_vms(provider.clone(), Role::WorkerPlane, desired..current).await?;
        provider.no_of_worker_plane(Sizing::Set(desired)).await?;
        Ok(removed)
    }

    /// Bootstrap payload of an existing self-managed cluster
    pub async fn get_cluster_state(&self) -> Result<ClusterResourceState> {
        self.provider.init_state(Operation::Get).await?;
        self.provider.get_state_for_cluster().await
    }

    pub async fn get_kubeconfig(&self) -> Result<String> {
        self.provider.init_state(Operation::Get).await?;
        self.provider.get_kubeconfig().await
    }

    /// Whether a state record exists for the cluster
    pub async fn exists(&self) -> Result<bool> {
        self.provider.is_present().await
    }

    /// Provider credentials for in-cluster cloud controllers
    pub async fn get_secret_tokens(&self) -> Result<BTreeMap<String, String>> {
        self.provider.init_state(Operation::Get).await?;
        self.provider.get_secret_tokens().await
    }
}

fn log_failures(results: &[Result<()>]) {
    for err in results.iter().filter_map(|r| r.as_ref().err()) {
        warn!(error = %err, "fleet step failed");
    }
}

/// Summaries of every stored cluster matching `filter`
pub async fn list_clusters(
    store: &dyn StateStore,
    filter: &ClusterFilter,
) -> Result<Vec<ClusterSummary>> {
    let docs = store.list_clusters(filter).await?;
    Ok(docs.iter().map(summarize).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::poller::PollerSettings;
    use crate::provider::civo::{CivoProvider, MockCivoApi};
    use crate::provider::local::{LocalProvider, MockKind};
    use crate::storage::MemoryStore;
    use kubeforge_models::Cloud;

    fn ha_metadata(cp: usize, wp: usize, ds: usize) -> Metadata {
        let mut meta = Metadata::new(Cloud::Civo, "LON1", "demo", ClusterType::Ha);
        meta.no_cp = cp;
        meta.no_wp = wp;
        meta.no_ds = ds;
        meta.control_plane_node_type = "g3.small".into();
        meta.worker_plane_node_type = "g3.medium".into();
        meta.load_balancer_node_type = "g3.small".into();
        meta.data_store_node_type = "g3.small".into();
        meta
    }

    fn civo_manager(meta: Metadata) -> (Arc<MockCivoApi>, Arc<MemoryStore>, ClusterManager) {
        let api = Arc::new(MockCivoApi::new());
        let store = Arc::new(MemoryStore::new());
        let provider = CivoProvider::new(&meta, store.clone(), api.clone())
            .with_pollers(PollerSettings::immediate());
        (api, store, ClusterManager::new(Arc::new(provider), meta))
    }

    #[tokio::test]
    async fn test_even_control_plane_rejected_before_state() {
        let (_, store, manager) = civo_manager(ha_metadata(2, 1, 1));
        let err = manager.create_ha_cluster().await.unwrap_err();
        assert!(matches!(
            err.root(),
            Error::ConstraintViolation {
                role: Role::ControlPlane,
                ..
            }
        ));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_multiple_data_stores_rejected() {
        let (_, _, manager) = civo_manager(ha_metadata(3, 1, 3));
        let err = manager.create_ha_cluster().await.unwrap_err();
        assert!(err.to_string().contains("multiple data stores"));
    }

    #[tokio::test]
    async fn test_wrong_cluster_type() {
        let (_, _, manager) = civo_manager(ha_metadata(3, 1, 1));
        let err = manager.create_managed_cluster().await.unwrap_err();
        assert!(matches!(err, Error::InvalidOperation(_)));
    }

    #[tokio::test]
    async fn test_ha_on_local_unsupported() {
        let mut meta = ha_metadata(3, 1, 1);
        meta.cloud = Cloud::Local;
        let provider = LocalProvider::new(&meta, Arc::new(MemoryStore::new()), Arc::new(MockKind::new()));
        let manager = ClusterManager::new(Arc::new(provider), meta);
        let err = manager.create_ha_cluster().await.unwrap_err();
        assert!(matches!(err, Error::Unsupported { cloud: Cloud::Local, .. }));
    }

    #[tokio::test]
    async fn test_delete_missing_cluster_not_found() {
        let (_, _, manager) = civo_manager(ha_metadata(3, 1, 1));
        assert!(manager.delete_ha_cluster().await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_list_clusters_summaries() {
        let (_, store, manager) = civo_manager(ha_metadata(3, 2, 1));
        manager.create_ha_cluster().await.unwrap();

        let summaries = list_clusters(store.as_ref(), &ClusterFilter::default())
            .await
            .unwrap();
        assert_eq!(summaries.len(), 1);
        let summary = &summaries[0];
        assert_eq!(summary.name, "demo");
        assert_eq!((summary.no_cp, summary.no_wp, summary.no_ds), (3, 2, 1));
        assert!(summary.is_completed);
        assert_eq!(summary.phase, "workerplanes-ready");
    }
}
