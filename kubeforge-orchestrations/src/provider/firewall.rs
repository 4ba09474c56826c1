//! Provider-neutral firewall rule catalogue, one rule set per role

use std::fmt;

use kubeforge_models::{K8sDistro, Role};
use serde::{Deserialize, Serialize};

const ANYWHERE: &str = "0.0.0.0/0";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Tcp,
    Udp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Ingress,
    Egress,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Allow,
    Deny,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Protocol::Tcp => "tcp",
            Protocol::Udp => "udp",
        })
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Direction::Ingress => "ingress",
            Direction::Egress => "egress",
        })
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Action::Allow => "allow",
            Action::Deny => "deny",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FirewallRule {
    pub name: String,
    pub description: String,
    pub protocol: Protocol,
    pub direction: Direction,
    pub action: Action,
    pub cidr: String,
    pub start_port: u16,
    pub end_port: u16,
}

impl FirewallRule {
    fn allow(
        name: &str,
        description: &str,
        protocol: Protocol,
        direction: Direction,
        cidr: &str,
        ports: (u16, u16),
    ) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            protocol,
            direction,
            action: Action::Allow,
            cidr: cidr.to_string(),
            start_port: ports.0,
            end_port: ports.1,
        }
    }
}

fn ssh() -> FirewallRule {
    FirewallRule::allow("ssh", "SSH access", Protocol::Tcp, Direction::Ingress, ANYWHERE, (22, 22))
}

fn egress_tcp() -> FirewallRule {
    FirewallRule::allow(
        "all_tcp_outgoing",
        "All outgoing TCP traffic",
        Protocol::Tcp,
        Direction::Egress,
        ANYWHERE,
        (1, 65535),
    )
}

fn egress_udp() -> FirewallRule {
    FirewallRule::allow(
        "all_udp_outgoing",
        "All outgoing UDP traffic",
        Protocol::Udp,
        Direction::Egress,
        ANYWHERE,
        (1, 65535),
    )
}

fn api_server(cidr: &str) -> FirewallRule {
    FirewallRule::allow(
        "kubernetes_api_server",
        "Kubernetes API server",
        Protocol::Tcp,
        Direction::Ingress,
        cidr,
        (6443, 6443),
    )
}

fn kubelet(cidr: &str) -> FirewallRule {
    FirewallRule::allow("kubelet_api", "Kubelet API", Protocol::Tcp, Direction::Ingress, cidr, (10250, 10250))
}

fn flannel_vxlan(cidr: &str) -> FirewallRule {
    FirewallRule::allow(
        "cni_flannel_vxlan",
        "Flannel VXLAN overlay",
        Protocol::Udp,
        Direction::Ingress,
        cidr,
        (8472, 8472),
    )
}

fn kube_proxy(cidr: &str) -> FirewallRule {
    FirewallRule::allow("kube_proxy", "kube-proxy health", Protocol::Tcp, Direction::Ingress, cidr, (10256, 10256))
}

fn node_port() -> FirewallRule {
    FirewallRule::allow(
        "kubernetes_nodeport",
        "NodePort services",
        Protocol::Tcp,
        Direction::Ingress,
        ANYWHERE,
        (30000, 32767),
    )
}

fn etcd(cidr: &str) -> FirewallRule {
    FirewallRule::allow("etcd", "External etcd client and peer", Protocol::Tcp, Direction::Ingress, cidr, (2379, 2380))
}

/// Rules for the firewall guarding `role`. `network_cidr` scopes the
/// cluster-internal rules to the private network.
pub fn rules_for(role: Role, network_cidr: &str, distro: K8sDistro) -> Vec<FirewallRule> {
    match role {
        Role::ControlPlane => vec![
            api_server(network_cidr),
            kubelet(network_cidr),
            node_port(),
            ssh(),
            egress_udp(),
            egress_tcp(),
            flannel_vxlan(network_cidr),
        ],
        Role::WorkerPlane => {
            let mut rules = vec![
                kubelet(network_cidr),
                ssh(),
                node_port(),
                egress_udp(),
                egress_tcp(),
                flannel_vxlan(network_cidr),
            ];
            if distro == K8sDistro::Kubeadm {
                rules.push(kube_proxy(network_cidr));
            }
            rules
        }
        Role::LoadBalancer => vec![api_server(ANYWHERE), ssh(), egress_udp(), egress_tcp()],
        Role::DataStore => vec![etcd(network_cidr), ssh(), egress_udp(), egress_tcp()],
    }
}
