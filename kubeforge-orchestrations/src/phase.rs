//! Provisioning phases, derived from what the state record contains

use std::fmt;

use kubeforge_models::{ClusterSummary, ClusterType, Role, RoleResourceSet, StorageDocument};

/// Self-managed cluster progress, in creation order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum HaPhase {
    Uninitialized,
    NetworkReady,
    SshReady,
    FirewallsReady,
    LoadBalancerReady,
    DataStoreReady,
    ControlPlanesReady,
    WorkerPlanesReady,
}

impl HaPhase {
    pub fn of(doc: &StorageDocument) -> Self {
        let infra = &doc.infra;
        let set_ready = |set: Option<&RoleResourceSet>| set.map_or(false, RoleResourceSet::all_ready);

        let steps = [
            (HaPhase::NetworkReady, infra.network.is_present() && !infra.network_cidr.is_empty()),
            (HaPhase::SshReady, infra.ssh_key.is_present()),
            (
                HaPhase::FirewallsReady,
                Role::ALL.iter().all(|r| infra.firewall(*r).is_present()),
            ),
            (HaPhase::LoadBalancerReady, infra.load_balancer.is_ready()),
            (HaPhase::DataStoreReady, set_ready(infra.data_stores.as_ref())),
            (HaPhase::ControlPlanesReady, set_ready(infra.control_planes.as_ref())),
            (HaPhase::WorkerPlanesReady, set_ready(infra.worker_planes.as_ref())),
        ];

        let mut phase = HaPhase::Uninitialized;
        for (next, done) in steps {
            if !done {
                break;
            }
            phase = next;
        }
        phase
    }
}

impl fmt::Display for HaPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HaPhase::Uninitialized => "uninitialized",
            HaPhase::NetworkReady => "network-ready",
            HaPhase::SshReady => "ssh-ready",
            HaPhase::FirewallsReady => "firewalls-ready",
            HaPhase::LoadBalancerReady => "loadbalancer-ready",
            HaPhase::DataStoreReady => "datastore-ready",
            HaPhase::ControlPlanesReady => "controlplanes-ready",
            HaPhase::WorkerPlanesReady => "workerplanes-ready",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ManagedPhase {
    Uninitialized,
    NetworkReady,
    ManagedClusterReady,
}

impl ManagedPhase {
    pub fn of(doc: &StorageDocument) -> Self {
        let infra = &doc.infra;
        if infra.managed.is_present() && infra.is_completed {
            ManagedPhase::ManagedClusterReady
        } else if infra.network.is_present() {
            ManagedPhase::NetworkReady
        } else {
            ManagedPhase::Uninitialized
        }
    }
}

impl fmt::Display for ManagedPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ManagedPhase::Uninitialized => "uninitialized",
            ManagedPhase::NetworkReady => "network-ready",
            ManagedPhase::ManagedClusterReady => "ready",
        };
        f.write_str(s)
    }
}

/// Phase name for either kind of cluster
pub fn phase_name(doc: &StorageDocument) -> String {
    match doc.cluster_type {
        ClusterType::Ha => HaPhase::of(doc).to_string(),
        ClusterType::Managed => ManagedPhase::of(doc).to_string(),
    }
}

pub fn summarize(doc: &StorageDocument) -> ClusterSummary {
    let len = |set: &Option<RoleResourceSet>| set.as_ref().map_or(0, RoleResourceSet::len);
    ClusterSummary {
        name: doc.cluster_name.clone(),
        region: doc.region.clone(),
        cloud: doc.cloud,
        cluster_type: doc.cluster_type,
        phase: phase_name(doc),
        is_completed: doc.infra.is_completed,
        k8s_version: doc.infra.kubernetes_version.clone(),
        no_cp: len(&doc.infra.control_planes),
        no_wp: len(&doc.infra.worker_planes),
        no_ds: len(&doc.infra.data_stores),
        no_mp: doc.infra.managed.node_count,
        updated_at: doc.updated_at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kubeforge_models::{Cloud, ClusterIdentity, ResourceRef, VmRecord};

    fn ready_vm(id: &str) -> VmRecord {
        VmRecord {
            name: id.into(),
            vm_id: id.into(),
            hostname: id.into(),
            public_ip: "1.2.3.4".into(),
            private_ip: "10.0.0.2".into(),
            vm_size: "g3.small".into(),
        }
    }

    #[test]
    fn test_ha_phase_progression() {
        let id = ClusterIdentity::new(Cloud::Civo, "LON1", "demo", ClusterType::Ha);
        let mut doc = StorageDocument::new(&id);
        assert_eq!(HaPhase::of(&doc), HaPhase::Uninitialized);

        doc.infra.network = ResourceRef::new("n", "demo-net");
        doc.infra.network_cidr = "10.0.0.0/24".into();
        assert_eq!(HaPhase::of(&doc), HaPhase::NetworkReady);

        doc.infra.ssh_key = ResourceRef::new("s", "demo-ssh");
        for role in Role::ALL {
            *doc.infra.firewall_mut(role) = ResourceRef::new("f", "fw");
        }
        assert_eq!(HaPhase::of(&doc), HaPhase::FirewallsReady);

        doc.infra.load_balancer = ready_vm("lb");
        doc.infra.data_stores = Some(RoleResourceSet::with_len(1));
        doc.infra.set_vm(Role::DataStore, 0, ready_vm("ds"));
        assert_eq!(HaPhase::of(&doc), HaPhase::DataStoreReady);
        assert_eq!(summarize(&doc).phase, "datastore-ready");
    }

    #[test]
    fn test_managed_phase() {
        let id = ClusterIdentity::new(Cloud::Civo, "LON1", "demo", ClusterType::Managed);
        let mut doc = StorageDocument::new(&id);
        doc.infra.network = ResourceRef::new("n", "demo-managed-net");
        assert_eq!(ManagedPhase::of(&doc), ManagedPhase::NetworkReady);
        doc.infra.managed.id = "k8s".into();
        doc.infra.is_completed = true;
        assert_eq!(phase_name(&doc), "ready");
    }
}
