use clap::{Args as ClapArgs, Parser, Subcommand};
use kubeforge_models::{Cloud, ClusterIdentity, ClusterType, K8sDistro, Metadata};

/// Kubeforge - Kubernetes clusters on Civo and kind
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub mode: Mode,
}

/// Identifies an existing cluster
#[derive(ClapArgs, Debug, Clone)]
pub struct ClusterTarget {
    /// Cluster name
    pub name: String,

    /// Cloud provider (civo, local)
    #[arg(long, default_value = "civo")]
    pub cloud: Cloud,

    /// Region (ignored for local)
    #[arg(long, default_value = "LON1")]
    pub region: String,

    /// Cluster type (managed, ha)
    #[arg(long = "type", default_value = "managed")]
    pub cluster_type: ClusterType,
}

impl ClusterTarget {
    pub fn metadata(&self) -> Metadata {
        Metadata::new(self.cloud, &self.region, &self.name, self.cluster_type)
    }

    pub fn identity(&self) -> ClusterIdentity {
        self.metadata().identity()
    }
}

#[derive(Subcommand, Debug)]
pub enum Mode {
    /// Create a self-managed (HA) cluster from individual VMs
    CreateHa {
        /// Cluster name
        name: String,

        #[arg(long, default_value = "civo")]
        cloud: Cloud,

        #[arg(long, default_value = "LON1")]
        region: String,

        /// Control plane nodes (odd, at least 3)
        #[arg(long, default_value = "3")]
        control_planes: usize,

        /// Worker nodes
        #[arg(long, default_value = "1")]
        workers: usize,

        /// Data store nodes (only 1 is supported)
        #[arg(long, default_value = "1")]
        data_stores: usize,

        #[arg(long, default_value = "g3.small")]
        control_plane_size: String,

        #[arg(long, default_value = "g3.medium")]
        worker_size: String,

        #[arg(long, default_value = "g3.small")]
        load_balancer_size: String,

        #[arg(long, default_value = "g3.small")]
        data_store_size: String,

        /// Distribution installed by the bootstrapper (k3s, kubeadm)
        #[arg(long, default_value = "k3s")]
        distro: K8sDistro,

        #[arg(long, default_value = "")]
        version: String,
    },

    /// Create a provider-managed cluster
    CreateManaged {
        /// Cluster name
        name: String,

        #[arg(long, default_value = "civo")]
        cloud: Cloud,

        #[arg(long, default_value = "LON1")]
        region: String,

        /// Node count
        #[arg(long, default_value = "1")]
        nodes: usize,

        #[arg(long, default_value = "g4s.kube.small")]
        node_size: String,

        /// Kubernetes version (default: newest offered)
        #[arg(long, default_value = "")]
        version: String,

        /// CNI plugin (default: provider default)
        #[arg(long, default_value = "")]
        cni: String,

        /// Extra applications, comma separated
        #[arg(long, value_delimiter = ',')]
        apps: Vec<String>,
    },

    /// Delete a cluster and every resource it owns
    Delete {
        #[command(flatten)]
        target: ClusterTarget,
    },

    /// Add worker nodes to a self-managed cluster
    ScaleUp {
        #[command(flatten)]
        target: ClusterTarget,

        /// Desired total worker count
        #[arg(long)]
        workers: usize,

        #[arg(long, default_value = "g3.medium")]
        worker_size: String,
    },

    /// Remove worker nodes from a self-managed cluster
    ScaleDown {
        #[command(flatten)]
        target: ClusterTarget,

        /// Desired total worker count
        #[arg(long)]
        workers: usize,
    },

    /// Show one cluster
    Get {
        #[command(flatten)]
        target: ClusterTarget,

        /// Output format
        #[arg(short, long, default_value = "table")]
        output: String,
    },

    /// Print the kubeconfig of a cluster
    Kubeconfig {
        #[command(flatten)]
        target: ClusterTarget,
    },

    /// List clusters
    List {
        #[arg(long)]
        cloud: Option<Cloud>,

        #[arg(long = "type")]
        cluster_type: Option<ClusterType>,

        /// Output format
        #[arg(short, long, default_value = "table")]
        output: String,
    },

    /// Run the HTTP API
    Serve {
        /// API port (default: KUBEFORGE_API_PORT or 8080)
        #[arg(short, long)]
        port: Option<u16>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_create_ha() {
        let args = Args::parse_from([
            "kubeforge",
            "create-ha",
            "prod",
            "--region",
            "NYC1",
            "--control-planes",
            "5",
            "--workers",
            "4",
            "--distro",
            "kubeadm",
        ]);
        match args.mode {
            Mode::CreateHa {
                name,
                region,
                control_planes,
                workers,
                distro,
                ..
            } => {
                assert_eq!(name, "prod");
                assert_eq!(region, "NYC1");
                assert_eq!((control_planes, workers), (5, 4));
                assert_eq!(distro, K8sDistro::Kubeadm);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_parse_target() {
        let args = Args::parse_from(["kubeforge", "delete", "edge", "--cloud", "local", "--type", "managed"]);
        match args.mode {
            Mode::Delete { target } => {
                let id = target.identity();
                assert_eq!(id.cloud, Cloud::Local);
                assert_eq!(id.cluster_type, ClusterType::Managed);
                assert_eq!(id.name, "edge");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_apps_are_comma_separated() {
        let args = Args::parse_from(["kubeforge", "create-managed", "edge", "--apps", "a,b"]);
        match args.mode {
            Mode::CreateManaged { apps, .. } => assert_eq!(apps, vec!["a", "b"]),
            other => panic!("unexpected {other:?}"),
        }
    }
}
