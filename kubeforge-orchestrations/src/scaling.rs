//! Per-role VM counts.
//!
//! The count of a role is the shared length of its parallel columns in the
//! state record. Quorum rules:
//! - control plane: odd and at least 3
//! - data store: odd and at least 1
//! - worker plane: any count, and the only role that can be resized after creation

use kubeforge_models::{InfraState, Role, RoleResourceSet};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::state::ClusterState;

/// Read or set a role count, mirroring the provider getter/setter pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sizing {
    Get,
    Set(usize),
}

pub fn validate_count(role: Role, count: usize) -> Result<()> {
    match role {
        Role::ControlPlane if count < 3 || count % 2 == 0 => Err(Error::constraint(
            role,
            format!("needs an odd count of at least 3, got {}", count),
        )),
        Role::DataStore if count < 1 || count % 2 == 0 => Err(Error::constraint(
            role,
            format!("needs an odd count of at least 1, got {}", count),
        )),
        Role::LoadBalancer if count != 1 => Err(Error::constraint(
            role,
            format!("exactly one load balancer is supported, got {}", count),
        )),
        _ => Ok(()),
    }
}

/// Current length of a role's columns
pub fn count(infra: &InfraState, role: Role) -> Result<usize> {
    if role == Role::LoadBalancer {
        return Ok(1);
    }
    infra
        .role_set(role)
        .map(RoleResourceSet::len)
        .ok_or_else(|| Error::NotFound(format!("{} resources", role)))
}

/// Allocate, extend or truncate a role's columns to `desired` entries.
///
/// Truncation is refused while any trailing slot still holds a VM id; the
/// caller must delete those VMs first.
pub fn resize(infra: &mut InfraState, role: Role, desired: usize) -> Result<usize> {
    validate_count(role, desired)?;
    let Some(slot) = infra.role_set_slot(role) else {
        return Ok(1);
    };

    if slot.is_none() {
        info!(%role, count = desired, "allocated role resources");
        *slot = Some(RoleResourceSet::with_len(desired));
        return Ok(desired);
    }
    let set = slot.get_or_insert_with(RoleResourceSet::default);

    let current = set.len();
    if current == desired {
        debug!(%role, count = desired, "skipped resize, count unchanged");
        return Ok(desired);
    }
    if role != Role::WorkerPlane {
        return Err(Error::constraint(
            role,
            format!(
                "cannot resize after creation (have {}, requested {})",
                current, desired
            ),
        ));
    }
    if desired < current {
        let live: Vec<usize> = (desired..current)
            .filter(|&i| !set.vm_ids()[i].is_empty())
            .collect();
        if !live.is_empty() {
            return Err(Error::constraint(
                role,
                format!(
                    "indices {:?} still hold VMs, delete them before scaling down",
                    live
                ),
            ));
        }
    }

    set.resize(desired);
    info!(%role, from = current, to = desired, "resized role resources");
    Ok(desired)
}

/// Serve a getter/setter request against a cluster's shared state.
/// Setters persist the resized record; getters never write.
pub async fn apply(state: &ClusterState, role: Role, sizing: Sizing) -> Result<usize> {
    match sizing {
        Sizing::Get => state.read(|doc| count(&doc.infra, role)).await?,
        Sizing::Set(n) => state.update(move |doc| resize(&mut doc.infra, role, n)).await,
    }
}
