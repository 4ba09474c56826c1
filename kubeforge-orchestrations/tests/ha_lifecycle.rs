mod common;

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use common::{ha_metadata, Harness};
use kubeforge_models::{ClusterResourceState, Operation, Role};
use kubeforge_orchestrations::provider::civo::{CivoProvider, MockCivoApi};
use kubeforge_orchestrations::storage::MemoryStore;
use kubeforge_orchestrations::{
    names, Bootstrapper, CloudProvider, Error, HaPhase, PollerSettings, Result, Sizing,
};

#[derive(Default)]
struct RecordingBootstrapper {
    seen: Mutex<Vec<ClusterResourceState>>,
}

#[async_trait]
impl Bootstrapper for RecordingBootstrapper {
    async fn bootstrap(&self, state: &ClusterResourceState) -> Result<()> {
        self.seen.lock().unwrap().push(state.clone());
        Ok(())
    }
}

#[tokio::test]
async fn test_create_then_delete_ha_cluster() {
    let h = Harness::new();
    let meta = ha_metadata("prod", 3, 2, 1);
    let bootstrapper = Arc::new(RecordingBootstrapper::default());
    let manager = h.manager(&meta).with_bootstrapper(bootstrapper.clone());

    let resources = manager.create_ha_cluster().await.unwrap();
    assert_eq!(resources.ipv4_control_planes.len(), 3);
    assert_eq!(resources.ipv4_worker_planes.len(), 2);
    assert_eq!(resources.ipv4_data_stores.len(), 1);
    assert!(!resources.ipv4_load_balancer.is_empty());
    assert!(!resources.ssh_private_key.is_empty());
    assert_eq!(bootstrapper.seen.lock().unwrap().len(), 1);

    let doc = h.record(&meta).await.unwrap();
    let infra = &doc.infra;
    assert!(infra.is_completed);
    assert_eq!(HaPhase::of(&doc), HaPhase::WorkerPlanesReady);
    assert!(infra.network.is_present());
    assert!(infra.ssh_key.is_present());
    for role in Role::ALL {
        assert!(infra.firewall(role).is_present(), "{role} firewall missing");
    }
    assert_eq!(infra.control_planes.as_ref().unwrap().len(), 3);
    assert_eq!(infra.worker_planes.as_ref().unwrap().len(), 2);
    assert_eq!(infra.data_stores.as_ref().unwrap().len(), 1);
    assert!(infra.load_balancer.is_ready());
    assert_eq!(h.api.live_instances(), 7);
    assert_eq!(h.api.live_firewalls(), 4);

    // a later process only knows the identity, not the counts
    let teardown = h.manager(&ha_metadata("prod", 0, 0, 0));
    teardown.delete_ha_cluster().await.unwrap();

    assert!(h.record(&meta).await.is_none());
    assert_eq!(h.api.live_instances(), 0);
    assert_eq!(h.api.live_firewalls(), 0);
    assert_eq!(h.api.live_ssh_keys(), 0);
    assert_eq!(h.api.live_networks(), 0);
}

#[tokio::test]
async fn test_repeat_create_is_duplicate() {
    let h = Harness::new();
    let meta = ha_metadata("twice", 3, 1, 1);
    h.manager(&meta).create_ha_cluster().await.unwrap();

    let err = h.manager(&meta).create_ha_cluster().await.unwrap_err();
    assert!(err.is_duplicate());
    assert_eq!(h.api.calls("create_network"), 1);
    assert_eq!(h.api.live_instances(), 6);
}

#[tokio::test]
async fn test_resume_creates_only_missing_vm() {
    let h = Harness::new();
    let meta = ha_metadata("resume", 3, 2, 1);
    h.api
        .fail_instance(&names::vm("resume", Role::WorkerPlane, 1));

    let err = h.manager(&meta).create_ha_cluster().await.unwrap_err();
    match err.root() {
        Error::Fleet(failure) => {
            assert_eq!(failure.role, Role::WorkerPlane);
            assert_eq!(failure.total, 2);
            assert_eq!(failure.failed_indices(), vec![1]);
        }
        other => panic!("expected fleet failure, got {other}"),
    }

    let doc = h.record(&meta).await.unwrap();
    assert!(!doc.infra.is_completed);
    let workers = doc.infra.worker_planes.clone().unwrap();
    assert!(workers.get(0).unwrap().is_ready());
    assert!(workers.get(1).unwrap().vm_id.is_empty());
    let before: Vec<String> = doc
        .infra
        .control_planes
        .as_ref()
        .unwrap()
        .vm_ids()
        .to_vec();
    assert_eq!(h.api.calls("create_instance"), 7);

    h.api.clear_failures();
    h.manager(&meta).create_ha_cluster().await.unwrap();

    assert_eq!(h.api.calls("create_instance"), 8);
    assert_eq!(h.api.calls("create_network"), 1);
    assert_eq!(h.api.calls("create_firewall"), 4);
    assert_eq!(h.api.calls("create_ssh_key"), 1);

    let doc = h.record(&meta).await.unwrap();
    assert!(doc.infra.is_completed);
    assert_eq!(doc.infra.control_planes.as_ref().unwrap().vm_ids(), &before[..]);
    assert!(doc.infra.worker_planes.as_ref().unwrap().all_ready());
}

#[tokio::test]
async fn test_ten_workers_fill_distinct_slots() {
    let h = Harness::new();
    let meta = ha_metadata("wide", 3, 10, 1);
    h.manager(&meta).create_ha_cluster().await.unwrap();

    let doc = h.record(&meta).await.unwrap();
    let workers = doc.infra.worker_planes.unwrap();
    assert_eq!(workers.len(), 10);
    let ids: BTreeSet<&String> = workers.vm_ids().iter().collect();
    assert_eq!(ids.len(), 10);
    assert!(workers.vm_ids().iter().all(|id| !id.is_empty()));
    for (i, hostname) in workers.hostnames().iter().enumerate() {
        assert_eq!(hostname, &names::vm("wide", Role::WorkerPlane, i));
    }
}

#[tokio::test]
async fn test_transient_poll_failures_are_absorbed() {
    let h = Harness::new();
    let meta = ha_metadata("flaky", 3, 0, 1);
    h.api.inject_transient_get_failures(3);
    h.manager(&meta).create_ha_cluster().await.unwrap();
    assert!(h.record(&meta).await.unwrap().infra.is_completed);
}

#[tokio::test]
async fn test_poll_failures_exhaust_budget() {
    let h = Harness::new();
    let meta = ha_metadata("down", 3, 0, 1);
    h.api.inject_transient_get_failures(1000);

    let err = h.manager(&meta).create_ha_cluster().await.unwrap_err();
    assert!(matches!(err.root(), Error::Fleet(_)));
    assert!(err.to_string().contains("timed out"), "{err}");

    // vm ids were recorded before the watch gave up
    let doc = h.record(&meta).await.unwrap();
    assert!(doc.infra.load_balancer.is_created());
    assert!(!doc.infra.is_completed);
}

#[tokio::test]
async fn test_control_plane_quorum() {
    let api = Arc::new(MockCivoApi::new());
    let store = Arc::new(MemoryStore::new());
    for n in [1usize, 2, 3, 4, 5, 7] {
        let meta = ha_metadata(&format!("quorum-{n}"), 0, 0, 0);
        let provider = CivoProvider::new(&meta, store.clone(), api.clone())
            .with_pollers(PollerSettings::immediate());
        provider.init_state(Operation::Create).await.unwrap();

        let res = provider.no_of_control_plane(Sizing::Set(n)).await;
        if n % 2 == 1 && n >= 3 {
            assert_eq!(res.unwrap(), n);
            assert_eq!(provider.no_of_control_plane(Sizing::Get).await.unwrap(), n);
        } else {
            assert!(matches!(
                res.unwrap_err().root(),
                Error::ConstraintViolation { role: Role::ControlPlane, .. }
            ));
            assert!(provider
                .no_of_control_plane(Sizing::Get)
                .await
                .unwrap_err()
                .is_not_found());
        }
    }
}

#[tokio::test]
async fn test_scale_workers_up_and_down() {
    let h = Harness::new();
    let meta = ha_metadata("elastic", 3, 1, 1);
    let manager = h.manager(&meta);
    manager.create_ha_cluster().await.unwrap();
    assert_eq!(h.api.live_instances(), 6);

    assert_eq!(manager.add_worker_nodes(3).await.unwrap(), 1);
    let doc = h.record(&meta).await.unwrap();
    let workers = doc.infra.worker_planes.unwrap();
    assert_eq!(workers.len(), 3);
    assert!(workers.all_ready());
    assert_eq!(h.api.live_instances(), 8);

    let removed = manager.del_worker_nodes(1).await.unwrap();
    assert_eq!(
        removed,
        vec![
            names::vm("elastic", Role::WorkerPlane, 1),
            names::vm("elastic", Role::WorkerPlane, 2),
        ]
    );
    let doc = h.record(&meta).await.unwrap();
    let workers = doc.infra.worker_planes.unwrap();
    assert_eq!(workers.len(), 1);
    assert_eq!(workers.public_ips().len(), 1);
    assert_eq!(workers.private_ips().len(), 1);
    assert_eq!(h.api.live_instances(), 6);

    let err = manager.add_worker_nodes(0).await.unwrap_err();
    assert!(matches!(err, Error::ConstraintViolation { .. }));
    assert!(manager.del_worker_nodes(1).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_scale_down_skips_never_created_slots() {
    let h = Harness::new();
    let meta = ha_metadata("drain", 3, 1, 1);
    let manager = h.manager(&meta);
    manager.create_ha_cluster().await.unwrap();

    h.api.fail_instance(&names::vm("drain", Role::WorkerPlane, 2));
    assert!(manager.add_worker_nodes(3).await.is_err());
    h.api.clear_failures();
    assert_eq!(h.api.live_instances(), 7);

    let removed = manager.del_worker_nodes(1).await.unwrap();
    assert_eq!(removed, vec![names::vm("drain", Role::WorkerPlane, 1)]);
    assert_eq!(h.api.live_instances(), 6);
    let workers = h.record(&meta).await.unwrap().infra.worker_planes.unwrap();
    assert_eq!(workers.len(), 1);
}

#[tokio::test]
async fn test_ssh_key_delete_twice_is_noop() {
    let h = Harness::new();
    let meta = ha_metadata("keys", 3, 1, 1);
    let provider = h.manager(&meta).provider().clone();
    provider.init_state(Operation::Create).await.unwrap();
    provider.new_network(&names::network("keys")).await.unwrap();
    provider
        .create_upload_ssh_key_pair(&names::ssh_key("keys"))
        .await
        .unwrap();
    assert_eq!(h.api.live_ssh_keys(), 1);

    provider.del_ssh_key_pair().await.unwrap();
    provider.del_ssh_key_pair().await.unwrap();
    assert_eq!(h.api.calls("delete_ssh_key"), 1);
    assert_eq!(h.api.live_ssh_keys(), 0);
    let doc = h.record(&meta).await.unwrap();
    assert!(doc.infra.ssh_key.id.is_empty());
}

#[tokio::test]
async fn test_truncate_refused_while_workers_live() {
    let h = Harness::new();
    let meta = ha_metadata("guarded", 3, 2, 1);
    let manager = h.manager(&meta);
    manager.create_ha_cluster().await.unwrap();

    let err = manager
        .provider()
        .no_of_worker_plane(Sizing::Set(0))
        .await
        .unwrap_err();
    assert!(matches!(err.root(), Error::ConstraintViolation { .. }));
    assert_eq!(
        manager
            .provider()
            .no_of_worker_plane(Sizing::Get)
            .await
            .unwrap(),
        2
    );
}

#[tokio::test]
async fn test_delete_is_idempotent_after_partial_teardown() {
    let h = Harness::new();
    let meta = ha_metadata("partial", 3, 1, 1);
    let manager = h.manager(&meta);
    manager.create_ha_cluster().await.unwrap();

    // workers gone already, as if a previous delete stopped midway
    let provider = manager.provider();
    provider.del_vm(Role::WorkerPlane, 0).await.unwrap();
    provider.del_vm(Role::WorkerPlane, 0).await.unwrap();
    provider.del_firewall(Role::WorkerPlane).await.unwrap();

    h.manager(&meta).delete_ha_cluster().await.unwrap();
    assert!(h.record(&meta).await.is_none());
    assert_eq!(h.api.live_instances(), 0);
    assert_eq!(h.api.calls("delete_firewall"), 4);
}

#[tokio::test]
async fn test_cluster_state_requires_record() {
    let h = Harness::new();
    let err = h
        .manager(&ha_metadata("ghost", 3, 1, 1))
        .get_cluster_state()
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}
