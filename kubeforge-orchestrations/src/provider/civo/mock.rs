//! In-memory Civo used by tests and `KUBEFORGE_CIVO_MOCK` dry runs.
//!
//! Instances and managed clusters report "pending" for a configurable number
//! of polls before turning active. Failures can be injected per hostname
//! (instance creation) or as a number of transient `get_instance` errors.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;

use async_trait::async_trait;

use super::api::{
    CivoApi, CivoInstance, CivoKubernetesCluster, CivoNetwork, FirewallConfig, InstanceConfig,
    KubernetesClusterConfig,
};
use crate::error::{Error, Result};

pub const MOCK_NETWORK_CIDR: &str = "192.168.1.0/24";

struct MockInstance {
    instance: CivoInstance,
    network_id: String,
    polls_left: u32,
    public_ip: String,
}

struct MockCluster {
    cluster: CivoKubernetesCluster,
    polls_left: u32,
}

#[derive(Default)]
struct Inner {
    next_id: u64,
    networks: BTreeMap<String, CivoNetwork>,
    firewalls: BTreeMap<String, FirewallConfig>,
    ssh_keys: BTreeMap<String, String>,
    instances: BTreeMap<String, MockInstance>,
    clusters: BTreeMap<String, MockCluster>,
    calls: BTreeMap<&'static str, usize>,
    failing_hostnames: BTreeSet<String>,
    transient_get_failures: u32,
}

impl Inner {
    fn next(&mut self, prefix: &str) -> (u64, String) {
        self.next_id += 1;
        (self.next_id, format!("{}-{:04}", prefix, self.next_id))
    }

    fn record(&mut self, call: &'static str) {
        *self.calls.entry(call).or_default() += 1;
    }
}

pub struct MockCivoApi {
    inner: Mutex<Inner>,
    pending_polls: u32,
    regions: Vec<String>,
    sizes: Vec<String>,
    versions: Vec<String>,
}

impl Default for MockCivoApi {
    fn default() -> Self {
        Self::new()
    }
}

impl MockCivoApi {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            pending_polls: 1,
            regions: ["LON1", "NYC1", "FRA1", "PHX1"].map(String::from).to_vec(),
            sizes: [
                "g3.xsmall",
                "g3.small",
                "g3.medium",
                "g3.large",
                "g4s.kube.small",
                "g4s.kube.medium",
            ]
            .map(String::from)
            .to_vec(),
            versions: ["1.28.2-k3s1", "1.27.1-k3s1", "1.26.4-k3s1"]
                .map(String::from)
                .to_vec(),
        }
    }

    /// Number of "pending" polls before instances and clusters become active
    pub fn with_pending_polls(mut self, polls: u32) -> Self {
        self.pending_polls = polls;
        self
    }

    /// Make `create_instance` fail for this hostname until cleared
    pub fn fail_instance(&self, hostname: &str) {
        self.lock().failing_hostnames.insert(hostname.to_string());
    }

    pub fn clear_failures(&self) {
        let mut inner = self.lock();
        inner.failing_hostnames.clear();
        inner.transient_get_failures = 0;
    }

    /// The next `count` `get_instance` calls fail with a retryable error
    pub fn inject_transient_get_failures(&self, count: u32) {
        self.lock().transient_get_failures = count;
    }

    /// How many times `call` was invoked
    pub fn calls(&self, call: &str) -> usize {
        self.lock().calls.get(call).copied().unwrap_or(0)
    }

    pub fn live_instances(&self) -> usize {
        self.lock().instances.len()
    }

    pub fn live_networks(&self) -> usize {
        self.lock().networks.len()
    }

    pub fn live_firewalls(&self) -> usize {
        self.lock().firewalls.len()
    }

    pub fn live_ssh_keys(&self) -> usize {
        self.lock().ssh_keys.len()
    }

    pub fn live_clusters(&self) -> usize {
        self.lock().clusters.len()
    }

    pub fn firewall(&self, id: &str) -> Option<FirewallConfig> {
        self.lock().firewalls.get(id).cloned()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[async_trait]
impl CivoApi for MockCivoApi {
    async fn list_regions(&self) -> Result<Vec<String>> {
        self.lock().record("list_regions");
        Ok(self.regions.clone())
    }

    async fn list_instance_sizes(&self) -> Result<Vec<String>> {
        self.lock().record("list_instance_sizes");
        Ok(self.sizes.clone())
    }

    async fn list_kubernetes_versions(&self) -> Result<Vec<String>> {
        self.lock().record("list_kubernetes_versions");
        Ok(self.versions.clone())
    }

    async fn disk_image_id(&self, _region: &str, name: &str) -> Result<String> {
        Ok(format!("img-{}", name))
    }

    async fn create_network(&self, _region: &str, label: &str) -> Result<CivoNetwork> {
        let mut inner = self.lock();
        inner.record("create_network");
        let (_, id) = inner.next("net");
        let network = CivoNetwork {
            id: id.clone(),
            label: label.to_string(),
            cidr: MOCK_NETWORK_CIDR.to_string(),
            status: "Active".to_string(),
        };
        inner.networks.insert(id, network.clone());
        Ok(CivoNetwork {
            status: String::new(),
            cidr: String::new(),
            ..network
        })
    }

    async fn get_network(&self, _region: &str, id: &str) -> Result<CivoNetwork> {
        self.lock()
            .networks
            .get(id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("network {}", id)))
    }

    async fn delete_network(&self, _region: &str, id: &str) -> Result<()> {
        let mut inner = self.lock();
        inner.record("delete_network");
        if inner.instances.values().any(|i| i.network_id == id) {
            return Err(Error::provider("delete_network", "network still has instances attached"));
        }
        inner.networks.remove(id);
        Ok(())
    }

    async fn create_firewall(&self, config: &FirewallConfig) -> Result<String> {
        let mut inner = self.lock();
        inner.record("create_firewall");
        if !inner.networks.contains_key(&config.network_id) {
            return Err(Error::provider("create_firewall", "unknown network"));
        }
        let (_, id) = inner.next("fw");
        inner.firewalls.insert(id.clone(), config.clone());
        Ok(id)
    }

    async fn delete_firewall(&self, _region: &str, id: &str) -> Result<()> {
        let mut inner = self.lock();
        inner.record("delete_firewall");
        inner.firewalls.remove(id);
        Ok(())
    }

    async fn create_ssh_key(&self, _region: &str, name: &str, public_key: &str) -> Result<String> {
        let mut inner = self.lock();
        inner.record("create_ssh_key");
        if public_key.is_empty() {
            return Err(Error::provider("create_ssh_key", "empty public key"));
        }
        let (_, id) = inner.next("ssh");
        inner.ssh_keys.insert(id.clone(), name.to_string());
        Ok(id)
    }

    async fn delete_ssh_key(&self, _region: &str, id: &str) -> Result<()> {
        let mut inner = self.lock();
        inner.record("delete_ssh_key");
        inner.ssh_keys.remove(id);
        Ok(())
    }

    async fn create_instance(&self, config: &InstanceConfig) -> Result<CivoInstance> {
        let mut inner = self.lock();
        inner.record("create_instance");
        if inner.failing_hostnames.contains(&config.hostname) {
            return Err(Error::provider(
                "create_instance",
                format!("quota exceeded creating {}", config.hostname),
            ));
        }
        let (n, id) = inner.next("vm");
        let instance = CivoInstance {
            id: id.clone(),
            hostname: config.hostname.clone(),
            status: "BUILDING".to_string(),
            public_ip: String::new(),
            private_ip: format!("192.168.1.{}", n % 250 + 2),
        };
        inner.instances.insert(
            id,
            MockInstance {
                instance: instance.clone(),
                network_id: config.network_id.clone(),
                polls_left: self.pending_polls,
                public_ip: format!("74.220.{}.{}", n / 250, n % 250 + 1),
            },
        );
        Ok(CivoInstance {
            private_ip: String::new(),
            ..instance
        })
    }

    async fn get_instance(&self, _region: &str, id: &str) -> Result<CivoInstance> {
        let mut inner = self.lock();
        inner.record("get_instance");
        if inner.transient_get_failures > 0 {
            inner.transient_get_failures -= 1;
            return Err(Error::provider("get_instance", "503 service unavailable"));
        }
        let vm = inner
            .instances
            .get_mut(id)
            .ok_or_else(|| Error::NotFound(format!("instance {}", id)))?;
        if vm.polls_left > 0 {
            vm.polls_left -= 1;
        } else {
            vm.instance.status = "ACTIVE".to_string();
            vm.instance.public_ip = vm.public_ip.clone();
        }
        Ok(vm.instance.clone())
    }

    async fn delete_instance(&self, _region: &str, id: &str) -> Result<()> {
        let mut inner = self.lock();
        inner.record("delete_instance");
        inner.instances.remove(id);
        Ok(())
    }

    async fn create_kubernetes_cluster(
        &self,
        config: &KubernetesClusterConfig,
    ) -> Result<CivoKubernetesCluster> {
        let mut inner = self.lock();
        inner.record("create_kubernetes_cluster");
        let (_, id) = inner.next("k8s");
        let cluster = CivoKubernetesCluster {
            id: id.clone(),
            name: config.name.clone(),
            status: "BUILDING".to_string(),
            ready: false,
            kubeconfig: None,
        };
        inner.clusters.insert(
            id,
            MockCluster {
                cluster: cluster.clone(),
                polls_left: self.pending_polls,
            },
        );
        Ok(cluster)
    }

    async fn get_kubernetes_cluster(&self, _region: &str, id: &str) -> Result<CivoKubernetesCluster> {
        let mut inner = self.lock();
        inner.record("get_kubernetes_cluster");
        let entry = inner
            .clusters
            .get_mut(id)
            .ok_or_else(|| Error::NotFound(format!("kubernetes cluster {}", id)))?;
        if entry.polls_left > 0 {
            entry.polls_left -= 1;
        } else {
            entry.cluster.status = "ACTIVE".to_string();
            entry.cluster.ready = true;
            entry.cluster.kubeconfig = Some(format!(
                "apiVersion: v1\nkind: Config\ncurrent-context: {}\n",
                entry.cluster.name
            ));
        }
        Ok(entry.cluster.clone())
    }

    async fn delete_kubernetes_cluster(&self, _region: &str, id: &str) -> Result<()> {
        let mut inner = self.lock();
        inner.record("delete_kubernetes_cluster");
        inner.clusters.remove(id);
        Ok(())
    }
}
