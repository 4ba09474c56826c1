//! The persisted per-cluster state record.
//!
//! A [`StorageDocument`] is written after every resource mutation and read
//! back on every invocation, so that an interrupted create or delete can be
//! resumed. Resource identifiers use the empty string as the "not created /
//! already deleted" sentinel.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Cloud, ClusterIdentity, ClusterType, K8sDistro, Role};

// ============================================================================
// Single resources
// ============================================================================

/// A cloud resource that has an identifier and a display name
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRef {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
}

impl ResourceRef {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }

    pub fn is_present(&self) -> bool {
        !self.id.is_empty()
    }

    pub fn clear(&mut self) {
        self.id.clear();
        self.name.clear();
    }
}

/// One virtual machine slot
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VmRecord {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub vm_id: String,
    #[serde(default)]
    pub hostname: String,
    #[serde(default)]
    pub public_ip: String,
    #[serde(default)]
    pub private_ip: String,
    #[serde(default)]
    pub vm_size: String,
}

impl VmRecord {
    pub fn is_created(&self) -> bool {
        !self.vm_id.is_empty()
    }

    /// Created and fully addressable
    pub fn is_ready(&self) -> bool {
        self.is_created() && !self.public_ip.is_empty() && !self.private_ip.is_empty()
    }
}

/// Generated SSH key material. `Debug` never prints the private half.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SshKeyPair {
    #[serde(default)]
    pub public_key: String,
    #[serde(default)]
    pub private_key: String,
}

impl SshKeyPair {
    pub fn is_generated(&self) -> bool {
        !self.public_key.is_empty() && !self.private_key.is_empty()
    }
}

impl fmt::Debug for SshKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SshKeyPair")
            .field("public_key", &self.public_key)
            .field(
                "private_key",
                &if self.private_key.is_empty() { "" } else { "<redacted>" },
            )
            .finish()
    }
}

/// Provider-managed Kubernetes cluster
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagedClusterState {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub node_count: usize,
    #[serde(default)]
    pub node_size: String,
    #[serde(default)]
    pub applications: Vec<String>,
    #[serde(default)]
    pub cni: String,
}

impl ManagedClusterState {
    pub fn is_present(&self) -> bool {
        !self.id.is_empty()
    }
}

// ============================================================================
// Per-role VM columns
// ============================================================================

/// Parallel per-index sequences describing every VM of one role.
///
/// All columns always have the same length; index `i` in every column
/// describes VM `i`. Fields are private so the only way to change the length
/// is [`RoleResourceSet::resize`], which touches every column.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RoleColumns")]
pub struct RoleResourceSet {
    names: Vec<String>,
    vm_ids: Vec<String>,
    hostnames: Vec<String>,
    public_ips: Vec<String>,
    private_ips: Vec<String>,
    vm_sizes: Vec<String>,
}

#[derive(Deserialize)]
struct RoleColumns {
    #[serde(default)]
    names: Vec<String>,
    #[serde(default)]
    vm_ids: Vec<String>,
    #[serde(default)]
    hostnames: Vec<String>,
    #[serde(default)]
    public_ips: Vec<String>,
    #[serde(default)]
    private_ips: Vec<String>,
    #[serde(default)]
    vm_sizes: Vec<String>,
}

impl TryFrom<RoleColumns> for RoleResourceSet {
    type Error = String;

    fn try_from(raw: RoleColumns) -> Result<Self, Self::Error> {
        let set = RoleResourceSet {
            names: raw.names,
            vm_ids: raw.vm_ids,
            hostnames: raw.hostnames,
            public_ips: raw.public_ips,
            private_ips: raw.private_ips,
            vm_sizes: raw.vm_sizes,
        };
        if set.is_uniform() {
            Ok(set)
        } else {
            Err("role resource columns have mismatched lengths".to_string())
        }
    }
}

impl RoleResourceSet {
    pub fn with_len(len: usize) -> Self {
        let mut set = Self::default();
        set.resize(len);
        set
    }

    pub fn len(&self) -> usize {
        self.vm_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vm_ids.is_empty()
    }

    pub fn is_uniform(&self) -> bool {
        let n = self.vm_ids.len();
        [
            self.names.len(),
            self.hostnames.len(),
            self.public_ips.len(),
            self.private_ips.len(),
            self.vm_sizes.len(),
        ]
        .iter()
        .all(|&len| len == n)
    }

    /// Grow with empty slots or truncate from the tail, every column at once
    pub fn resize(&mut self, len: usize) {
        for column in self.columns_mut() {
            column.resize(len, String::new());
        }
    }

    pub fn get(&self, index: usize) -> Option<VmRecord> {
        if index >= self.len() {
            return None;
        }
        Some(VmRecord {
            name: self.names[index].clone(),
            vm_id: self.vm_ids[index].clone(),
            hostname: self.hostnames[index].clone(),
            public_ip: self.public_ips[index].clone(),
            private_ip: self.private_ips[index].clone(),
            vm_size: self.vm_sizes[index].clone(),
        })
    }

    /// Overwrite slot `index`. Returns false if the slot does not exist.
    pub fn set(&mut self, index: usize, vm: VmRecord) -> bool {
        if index >= self.len() {
            return false;
        }
        self.names[index] = vm.name;
        self.vm_ids[index] = vm.vm_id;
        self.hostnames[index] = vm.hostname;
        self.public_ips[index] = vm.public_ip;
        self.private_ips[index] = vm.private_ip;
        self.vm_sizes[index] = vm.vm_size;
        true
    }

    pub fn vms(&self) -> impl Iterator<Item = VmRecord> + '_ {
        (0..self.len()).filter_map(|i| self.get(i))
    }

    pub fn vm_ids(&self) -> &[String] {
        &self.vm_ids
    }

    pub fn hostnames(&self) -> &[String] {
        &self.hostnames
    }

    pub fn public_ips(&self) -> &[String] {
        &self.public_ips
    }

    pub fn private_ips(&self) -> &[String] {
        &self.private_ips
    }

    pub fn all_ready(&self) -> bool {
        self.vms().all(|vm| vm.is_ready())
    }

    fn columns_mut(&mut self) -> [&mut Vec<String>; 6] {
        [
            &mut self.names,
            &mut self.vm_ids,
            &mut self.hostnames,
            &mut self.public_ips,
            &mut self.private_ips,
            &mut self.vm_sizes,
        ]
    }
}

// ============================================================================
// Infrastructure and document
// ============================================================================

/// Everything the provisioning sequence has created so far
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InfraState {
    /// Set once the last step of the create sequence has finished
    #[serde(default)]
    pub is_completed: bool,
    #[serde(default)]
    pub kubernetes_version: String,

    #[serde(default)]
    pub network: ResourceRef,
    #[serde(default)]
    pub network_cidr: String,

    #[serde(default)]
    pub ssh_key: ResourceRef,
    #[serde(default)]
    pub ssh_user: String,

    #[serde(default)]
    pub firewall_control_planes: ResourceRef,
    #[serde(default)]
    pub firewall_worker_planes: ResourceRef,
    #[serde(default)]
    pub firewall_load_balancer: ResourceRef,
    #[serde(default)]
    pub firewall_data_stores: ResourceRef,

    /// `None` until the role has been sized
    #[serde(default)]
    pub control_planes: Option<RoleResourceSet>,
    #[serde(default)]
    pub worker_planes: Option<RoleResourceSet>,
    #[serde(default)]
    pub data_stores: Option<RoleResourceSet>,
    #[serde(default)]
    pub load_balancer: VmRecord,

    #[serde(default)]
    pub managed: ManagedClusterState,
}

impl InfraState {
    pub fn firewall(&self, role: Role) -> &ResourceRef {
        match role {
            Role::ControlPlane => &self.firewall_control_planes,
            Role::WorkerPlane => &self.firewall_worker_planes,
            Role::LoadBalancer => &self.firewall_load_balancer,
            Role::DataStore => &self.firewall_data_stores,
        }
    }

    pub fn firewall_mut(&mut self, role: Role) -> &mut ResourceRef {
        match role {
            Role::ControlPlane => &mut self.firewall_control_planes,
            Role::WorkerPlane => &mut self.firewall_worker_planes,
            Role::LoadBalancer => &mut self.firewall_load_balancer,
            Role::DataStore => &mut self.firewall_data_stores,
        }
    }

    /// Column set for a multi-VM role. Always `None` for the load balancer.
    pub fn role_set(&self, role: Role) -> Option<&RoleResourceSet> {
        match role {
            Role::ControlPlane => self.control_planes.as_ref(),
            Role::WorkerPlane => self.worker_planes.as_ref(),
            Role::DataStore => self.data_stores.as_ref(),
            Role::LoadBalancer => None,
        }
    }

    /// Mutable slot for a multi-VM role. Always `None` for the load balancer.
    pub fn role_set_slot(&mut self, role: Role) -> Option<&mut Option<RoleResourceSet>> {
        match role {
            Role::ControlPlane => Some(&mut self.control_planes),
            Role::WorkerPlane => Some(&mut self.worker_planes),
            Role::DataStore => Some(&mut self.data_stores),
            Role::LoadBalancer => None,
        }
    }

    /// Read VM `index` of `role`; the load balancer only has index 0
    pub fn vm(&self, role: Role, index: usize) -> Option<VmRecord> {
        match role {
            Role::LoadBalancer => (index == 0).then(|| self.load_balancer.clone()),
            _ => self.role_set(role).and_then(|set| set.get(index)),
        }
    }

    /// Write VM `index` of `role`. Returns false if the slot does not exist.
    pub fn set_vm(&mut self, role: Role, index: usize, vm: VmRecord) -> bool {
        match role {
            Role::LoadBalancer if index == 0 => {
                self.load_balancer = vm;
                true
            }
            Role::LoadBalancer => false,
            _ => match self.role_set_slot(role) {
                Some(Some(set)) => set.set(index, vm),
                _ => false,
            },
        }
    }

    /// Every VM the create sequence asked for has been observed as ready
    pub fn all_vms_ready(&self) -> bool {
        let sets_ready = [&self.control_planes, &self.worker_planes, &self.data_stores]
            .iter()
            .all(|set| set.as_ref().map(RoleResourceSet::all_ready).unwrap_or(false));
        sets_ready && self.load_balancer.is_ready()
    }
}

/// The full state record of one cluster
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageDocument {
    pub cluster_name: String,
    pub region: String,
    pub cloud: Cloud,
    pub cluster_type: ClusterType,

    #[serde(default)]
    pub bootstrap_provider: K8sDistro,
    #[serde(default)]
    pub ssh_key_pair: SshKeyPair,
    #[serde(default)]
    pub infra: InfraState,

    #[serde(default)]
    pub kubeconfig: String,
    #[serde(default)]
    pub kubeconfig_context: String,

    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl StorageDocument {
    pub fn new(identity: &ClusterIdentity) -> Self {
        let now = Utc::now();
        Self {
            cluster_name: identity.name.clone(),
            region: identity.region.clone(),
            cloud: identity.cloud,
            cluster_type: identity.cluster_type,
            bootstrap_provider: K8sDistro::default(),
            ssh_key_pair: SshKeyPair::default(),
            infra: InfraState::default(),
            kubeconfig: String::new(),
            kubeconfig_context: String::new(),
            created_at: Some(now),
            updated_at: Some(now),
        }
    }

    pub fn identity(&self) -> ClusterIdentity {
        ClusterIdentity::new(
            self.cloud,
            self.region.clone(),
            self.cluster_name.clone(),
            self.cluster_type,
        )
    }
}

// ============================================================================
// Views
// ============================================================================

/// Snapshot handed to the bootstrap layer once VMs are ready
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterResourceState {
    pub ssh_user: String,
    pub ssh_private_key: String,
    pub cluster_name: String,
    pub region: String,
    pub cloud: String,
    pub cluster_type: String,
    pub k8s_distro: String,
    pub k8s_version: String,

    pub ipv4_control_planes: Vec<String>,
    pub ipv4_worker_planes: Vec<String>,
    pub ipv4_data_stores: Vec<String>,
    pub ipv4_load_balancer: String,

    pub private_ipv4_control_planes: Vec<String>,
    pub private_ipv4_data_stores: Vec<String>,
    pub private_ipv4_load_balancer: String,
}

impl fmt::Debug for ClusterResourceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClusterResourceState")
            .field("ssh_user", &self.ssh_user)
            .field("cluster_name", &self.cluster_name)
            .field("region", &self.region)
            .field("cloud", &self.cloud)
            .field("cluster_type", &self.cluster_type)
            .field("ipv4_control_planes", &self.ipv4_control_planes)
            .field("ipv4_worker_planes", &self.ipv4_worker_planes)
            .field("ipv4_data_stores", &self.ipv4_data_stores)
            .field("ipv4_load_balancer", &self.ipv4_load_balancer)
            .finish_non_exhaustive()
    }
}

/// One row of `list` output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterSummary {
    pub name: String,
    pub region: String,
    pub cloud: Cloud,
    pub cluster_type: ClusterType,
    pub phase: String,
    pub is_completed: bool,
    pub k8s_version: String,
    pub no_cp: usize,
    pub no_wp: usize,
    pub no_ds: usize,
    pub no_mp: usize,
    pub updated_at: Option<DateTime<Utc>>,
}
