//! Shared data types for kubeforge.
//!
//! Everything that crosses a crate boundary lives here: the cluster identity
//! tuple, the role and cloud enumerations, user supplied cluster metadata and
//! the persisted per-cluster state record (see [`state`]).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub mod state;

pub use state::{
    ClusterResourceState, ClusterSummary, InfraState, ManagedClusterState, ResourceRef,
    RoleResourceSet, SshKeyPair, StorageDocument, VmRecord,
};

/// Error returned when parsing one of the string-backed enums fails
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

impl fmt::Display for ParseEnumError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown {} '{}'", self.kind, self.value)
    }
}

impl std::error::Error for ParseEnumError {}

/// Cloud back-end a cluster is provisioned on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Cloud {
    Civo,
    Local,
}

impl Cloud {
    pub fn as_str(&self) -> &'static str {
        match self {
            Cloud::Civo => "civo",
            Cloud::Local => "local",
        }
    }
}

impl fmt::Display for Cloud {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Cloud {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "civo" => Ok(Cloud::Civo),
            "local" => Ok(Cloud::Local),
            _ => Err(ParseEnumError {
                kind: "cloud",
                value: s.to_string(),
            }),
        }
    }
}

/// Whether the provider runs the control plane or we do
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClusterType {
    Managed,
    Ha,
}

impl ClusterType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClusterType::Managed => "managed",
            ClusterType::Ha => "ha",
        }
    }
}

impl fmt::Display for ClusterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ClusterType {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "managed" => Ok(ClusterType::Managed),
            "ha" | "selfmanaged" => Ok(ClusterType::Ha),
            _ => Err(ParseEnumError {
                kind: "cluster type",
                value: s.to_string(),
            }),
        }
    }
}

/// Function a VM or firewall serves inside a self-managed cluster
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    ControlPlane,
    WorkerPlane,
    LoadBalancer,
    DataStore,
}

impl Role {
    /// All roles in provisioning order
    pub const ALL: [Role; 4] = [
        Role::LoadBalancer,
        Role::DataStore,
        Role::ControlPlane,
        Role::WorkerPlane,
    ];

    /// Short code used when naming cloud resources
    pub fn short(&self) -> &'static str {
        match self {
            Role::ControlPlane => "cp",
            Role::WorkerPlane => "wp",
            Role::LoadBalancer => "lb",
            Role::DataStore => "ds",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::ControlPlane => "controlplane",
            Role::WorkerPlane => "workerplane",
            Role::LoadBalancer => "loadbalancer",
            Role::DataStore => "datastore",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the caller intends to do with a cluster; drives state initialization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Create,
    Get,
    Delete,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Create => f.write_str("create"),
            Operation::Get => f.write_str("get"),
            Operation::Delete => f.write_str("delete"),
        }
    }
}

/// Kubernetes distribution that will be installed on the provisioned machines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum K8sDistro {
    #[default]
    K3s,
    Kubeadm,
    /// The cloud provider installs Kubernetes (managed clusters)
    Managed,
    /// Local kind cluster
    Kind,
}

impl fmt::Display for K8sDistro {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            K8sDistro::K3s => "k3s",
            K8sDistro::Kubeadm => "kubeadm",
            K8sDistro::Managed => "managed",
            K8sDistro::Kind => "kind",
        };
        f.write_str(s)
    }
}

impl FromStr for K8sDistro {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "k3s" => Ok(K8sDistro::K3s),
            "kubeadm" => Ok(K8sDistro::Kubeadm),
            "managed" => Ok(K8sDistro::Managed),
            "kind" => Ok(K8sDistro::Kind),
            _ => Err(ParseEnumError {
                kind: "kubernetes distribution",
                value: s.to_string(),
            }),
        }
    }
}

/// Uniquely identifies a cluster record: (cloud, region, name, cluster type)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClusterIdentity {
    pub cloud: Cloud,
    pub region: String,
    pub name: String,
    pub cluster_type: ClusterType,
}

impl ClusterIdentity {
    pub fn new(
        cloud: Cloud,
        region: impl Into<String>,
        name: impl Into<String>,
        cluster_type: ClusterType,
    ) -> Self {
        Self {
            cloud,
            region: region.into(),
            name: name.into(),
            cluster_type,
        }
    }
}

impl fmt::Display for ClusterIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}",
            self.cloud, self.cluster_type, self.region, self.name
        )
    }
}

/// User supplied description of the cluster to build
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metadata {
    pub cluster_name: String,
    pub region: String,
    pub cloud: Cloud,
    pub cluster_type: ClusterType,

    #[serde(default)]
    pub no_cp: usize,
    #[serde(default)]
    pub no_wp: usize,
    #[serde(default)]
    pub no_ds: usize,
    /// Node count for managed clusters
    #[serde(default)]
    pub no_mp: usize,

    #[serde(default)]
    pub control_plane_node_type: String,
    #[serde(default)]
    pub worker_plane_node_type: String,
    #[serde(default)]
    pub load_balancer_node_type: String,
    #[serde(default)]
    pub data_store_node_type: String,
    #[serde(default)]
    pub managed_node_type: String,

    #[serde(default)]
    pub k8s_distro: K8sDistro,
    /// Empty means "provider default"
    #[serde(default)]
    pub k8s_version: String,
    /// Empty means "provider default"
    #[serde(default)]
    pub cni: String,
    #[serde(default)]
    pub applications: Vec<String>,
}

impl Metadata {
    pub fn new(
        cloud: Cloud,
        region: impl Into<String>,
        cluster_name: impl Into<String>,
        cluster_type: ClusterType,
    ) -> Self {
        Self {
            cluster_name: cluster_name.into(),
            region: region.into(),
            cloud,
            cluster_type,
            no_cp: 0,
            no_wp: 0,
            no_ds: 0,
            no_mp: 0,
            control_plane_node_type: String::new(),
            worker_plane_node_type: String::new(),
            load_balancer_node_type: String::new(),
            data_store_node_type: String::new(),
            managed_node_type: String::new(),
            k8s_distro: K8sDistro::default(),
            k8s_version: String::new(),
            cni: String::new(),
            applications: Vec::new(),
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

    /// Requested VM count for a role (the load balancer is always a single VM)
    pub fn count_for(&self, role: Role) -> usize {
        match role {
            Role::ControlPlane => self.no_cp,
            Role::WorkerPlane => self.no_wp,
            Role::DataStore => self.no_ds,
            Role::LoadBalancer => 1,
        }
    }

    pub fn node_type_for(&self, role: Role) -> &str {
        match role {
            Role::ControlPlane => &self.control_plane_node_type,
            Role::WorkerPlane => &self.worker_plane_node_type,
            Role::DataStore => &self.data_store_node_type,
            Role::LoadBalancer => &self.load_balancer_node_type,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cloud_parse_and_display() {
        assert_eq!("CIVO".parse::<Cloud>().unwrap(), Cloud::Civo);
        assert_eq!(Cloud::Local.to_string(), "local");
        assert!("aws".parse::<Cloud>().is_err());
    }

    #[test]
    fn test_role_serialization() {
        let json = serde_json::to_string(&Role::ControlPlane).unwrap();
        assert_eq!(json, "\"controlplane\"");
        let role: Role = serde_json::from_str("\"datastore\"").unwrap();
        assert_eq!(role, Role::DataStore);
    }

    #[test]
    fn test_identity_display() {
        let id = ClusterIdentity::new(Cloud::Civo, "LON1", "demo", ClusterType::Ha);
        assert_eq!(id.to_string(), "civo/ha/LON1/demo");
    }

    #[test]
    fn test_metadata_counts() {
        let mut meta = Metadata::new(Cloud::Civo, "LON1", "demo", ClusterType::Ha);
        meta.no_cp = 3;
        meta.no_wp = 2;
        meta.no_ds = 1;
        meta.worker_plane_node_type = "g3.small".into();

        assert_eq!(meta.count_for(Role::ControlPlane), 3);
        assert_eq!(meta.count_for(Role::LoadBalancer), 1);
        assert_eq!(meta.node_type_for(Role::WorkerPlane), "g3.small");
        assert_eq!(meta.identity().name, "demo");
    }

    #[test]
    fn test_metadata_defaults_from_json() {
        let json = r#"{"cluster_name":"x","region":"LON1","cloud":"civo","cluster_type":"managed","no_mp":2}"#;
        let meta: Metadata = serde_json::from_str(json).unwrap();
        assert_eq!(meta.no_mp, 2);
        assert_eq!(meta.k8s_distro, K8sDistro::K3s);
        assert!(meta.applications.is_empty());
    }
}
