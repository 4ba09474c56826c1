//! Civo REST surface used by the provider, and its wire types

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::provider::firewall::FirewallRule;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CivoNetwork {
    pub id: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub cidr: String,
    #[serde(default)]
    pub status: String,
}

impl CivoNetwork {
    pub fn is_active(&self) -> bool {
        self.status.eq_ignore_ascii_case("active")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CivoFirewallRule {
    pub protocol: String,
    pub start_port: String,
    pub end_port: String,
    pub cidr: Vec<String>,
    pub direction: String,
    pub action: String,
    pub label: String,
}

impl From<&FirewallRule> for CivoFirewallRule {
    fn from(rule: &FirewallRule) -> Self {
        Self {
            protocol: rule.protocol.to_string(),
            start_port: rule.start_port.to_string(),
            end_port: rule.end_port.to_string(),
            cidr: vec![rule.cidr.clone()],
            direction: rule.direction.to_string(),
            action: rule.action.to_string(),
            label: rule.name.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FirewallConfig {
    pub name: String,
    pub region: String,
    pub network_id: String,
    pub create_rules: bool,
    pub rules: Vec<CivoFirewallRule>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceConfig {
    pub hostname: String,
    pub region: String,
    pub size: String,
    pub template_id: String,
    pub network_id: String,
    pub firewall_id: String,
    pub sshkey_id: String,
    pub initial_user: String,
    /// `"create"` or `"none"`
    pub public_ip: String,
    pub script: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CivoInstance {
    pub id: String,
    #[serde(default)]
    pub hostname: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub public_ip: String,
    #[serde(default)]
    pub private_ip: String,
}

impl CivoInstance {
    pub fn is_active(&self) -> bool {
        self.status.eq_ignore_ascii_case("active")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KubernetesClusterConfig {
    pub name: String,
    pub region: String,
    pub network_id: String,
    pub num_target_nodes: usize,
    pub target_nodes_size: String,
    pub kubernetes_version: String,
    pub applications: String,
    pub cni_plugin: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CivoKubernetesCluster {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub ready: bool,
    #[serde(default)]
    pub kubeconfig: Option<String>,
}

impl CivoKubernetesCluster {
    pub fn is_active(&self) -> bool {
        self.ready && self.status.eq_ignore_ascii_case("active")
    }
}

/// The subset of the Civo API the provider needs. Every call is scoped to
/// `region`.
#[async_trait]
pub trait CivoApi: Send + Sync {
    async fn list_regions(&self) -> Result<Vec<String>>;
    async fn list_instance_sizes(&self) -> Result<Vec<String>>;
    async fn list_kubernetes_versions(&self) -> Result<Vec<String>>;
    async fn disk_image_id(&self, region: &str, name: &str) -> Result<String>;

    async fn create_network(&self, region: &str, label: &str) -> Result<CivoNetwork>;
    async fn get_network(&self, region: &str, id: &str) -> Result<CivoNetwork>;
    async fn delete_network(&self, region: &str, id: &str) -> Result<()>;

    async fn create_firewall(&self, config: &FirewallConfig) -> Result<String>;
    async fn delete_firewall(&self, region: &str, id: &str) -> Result<()>;

    async fn create_ssh_key(&self, region: &str, name: &str, public_key: &str) -> Result<String>;
    async fn delete_ssh_key(&self, region: &str, id: &str) -> Result<()>;

    async fn create_instance(&self, config: &InstanceConfig) -> Result<CivoInstance>;
    async fn get_instance(&self, region: &str, id: &str) -> Result<CivoInstance>;
    async fn delete_instance(&self, region: &str, id: &str) -> Result<()>;

    async fn create_kubernetes_cluster(
        &self,
        config: &KubernetesClusterConfig,
    ) -> Result<CivoKubernetesCluster>;
    async fn get_kubernetes_cluster(&self, region: &str, id: &str) -> Result<CivoKubernetesCluster>;
    async fn delete_kubernetes_cluster(&self, region: &str, id: &str) -> Result<()>;
}
