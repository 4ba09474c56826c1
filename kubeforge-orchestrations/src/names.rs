//! Naming convention for cloud resources created for a cluster

use kubeforge_models::Role;

pub fn network(cluster: &str) -> String {
    format!("{}-net", cluster)
}

pub fn managed_network(cluster: &str) -> String {
    format!("{}-managed-net", cluster)
}

pub fn ssh_key(cluster: &str) -> String {
    format!("{}-ssh", cluster)
}

pub fn firewall(cluster: &str, role: Role) -> String {
    format!("{}-fw-{}", cluster, role.short())
}

/// VM names carry their index, except the single load balancer
pub fn vm(cluster: &str, role: Role, index: usize) -> String {
    match role {
        Role::LoadBalancer => format!("{}-vm-lb", cluster),
        _ => format!("{}-vm-{}-{}", cluster, role.short(), index),
    }
}

pub fn managed_cluster(cluster: &str) -> String {
    format!("{}-managed", cluster)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_names() {
        assert_eq!(network("demo"), "demo-net");
        assert_eq!(firewall("demo", Role::DataStore), "demo-fw-ds");
        assert_eq!(vm("demo", Role::WorkerPlane, 3), "demo-vm-wp-3");
        assert_eq!(vm("demo", Role::LoadBalancer, 0), "demo-vm-lb");
        assert_eq!(managed_cluster("demo"), "demo-managed");
    }
}
