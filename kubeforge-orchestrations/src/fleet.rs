//! Parallel per-index VM creation and deletion for one role.
//!
//! Each index gets its own tokio task. All tasks are awaited before
//! returning, even when some fail, and every failure is kept in the
//! resulting [`FleetFailure`].

use std::future::Future;
use std::ops::Range;
use std::sync::Arc;

use futures::future::join_all;
use kubeforge_models::Role;
use tracing::{debug, info};

use crate::error::{Error, FleetFailure, Result};
use crate::names;
use crate::provider::{CloudProvider, VmRequest};

/// VMs to create for one role
#[derive(Debug, Clone)]
pub struct FleetPlan {
    pub cluster_name: String,
    pub role: Role,
    pub vm_type: String,
    pub indices: Range<usize>,
}

async fn fan_out<F, Fut>(role: Role, indices: Range<usize>, task: F) -> Result<()>
where
    F: Fn(usize) -> Fut,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    let total = indices.len();
    if total == 0 {
        debug!(%role, "no vms to process");
        return Ok(());
    }

    let handles: Vec<_> = indices
        .map(|index| {
            let handle = tokio::spawn(task(index));
            async move { (index, handle.await) }
        })
        .collect();

    let mut failures = Vec::new();
    for (index, joined) in join_all(handles).await {
        match joined {
            Ok(Ok(())) => {}
            Ok(Err(e)) => failures.push((index, e)),
            Err(e) => failures.push((index, Error::Internal(format!("task panicked: {}", e)))),
        }
    }

    if failures.is_empty() {
        Ok(())
    } else {
        Err(Error::Fleet(FleetFailure {
            role,
            total,
            failures,
        }))
    }
}

/// Create every VM in `plan` concurrently
pub async fn create_vms(provider: Arc<dyn CloudProvider>, plan: FleetPlan) -> Result<()> {
    info!(role = %plan.role, count = plan.indices.len(), vm_type = %plan.vm_type, "creating vms");
    let FleetPlan {
        cluster_name,
        role,
        vm_type,
        indices,
    } = plan;

    fan_out(role, indices, |index| {
        let provider = provider.clone();
        let request = VmRequest {
            name: names::vm(&cluster_name, role, index),
            role,
            index,
            vm_type: vm_type.clone(),
            public: true,
        };
        async move { provider.new_vm(&request).await }
    })
    .await
}

/// Delete the VMs at `indices` of `role` concurrently
pub async fn delete_vms(
    provider: Arc<dyn CloudProvider>,
    role: Role,
    indices: Range<usize>,
) -> Result<()> {
    info!(%role, count = indices.len(), "deleting vms");
    fan_out(role, indices, |index| {
        let provider = provider.clone();
        async move { provider.del_vm(role, index).await }
    })
    .await
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[tokio::test]
    async fn test_all_tasks_run_despite_failures() {
        let ran = Arc::new(AtomicUsize::new(0));
        let res = fan_out(Role::WorkerPlane, 0..6, |index| {
            let ran = ran.clone();
            async move {
                ran.fetch_add(1, Ordering::SeqCst);
                if index % 2 == 1 {
                    Err(Error::provider("create_instance", format!("boom {}", index)))
                } else {
                    Ok(())
                }
            }
        })
        .await;

        assert_eq!(ran.load(Ordering::SeqCst), 6);
        match res.unwrap_err() {
            Error::Fleet(failure) => {
                assert_eq!(failure.total, 6);
                assert_eq!(failure.failed_indices(), vec![1, 3, 5]);
                assert!(failure.first().unwrap().to_string().contains("boom 1"));
            }
            other => panic!("unexpected error {other}"),
        }
    }

    #[tokio::test]
    async fn test_empty_range_is_ok() {
        let res = fan_out(Role::WorkerPlane, 0..0, |_| async { Ok(()) }).await;
        assert!(res.is_ok());
    }
}
