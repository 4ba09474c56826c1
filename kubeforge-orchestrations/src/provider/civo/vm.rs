use kubeforge_models::{Role, StorageDocument, VmRecord};
use tracing::info;

use super::api::{CivoInstance, InstanceConfig};
use super::{CivoProvider, DISK_IMAGE};
use crate::error::{Error, Result};
use crate::poller::Readiness;
use crate::provider::{cloud_init, validation, VmRequest};

impl CivoProvider {
    pub(super) async fn create_vm(&self, req: &VmRequest) -> Result<()> {
        let slot = self
            .state
            .read(|doc| doc.infra.vm(req.role, req.index))
            .await?
            .ok_or_else(|| {
                Error::InvalidOperation(format!(
                    "{} index {} has not been sized",
                    req.role, req.index
                ))
            })?;

        if slot.is_ready() {
            info!(vm = %slot.name, id = %slot.vm_id, "skipped vm creation, already exists");
            return Ok(());
        }
        if slot.is_created() {
            info!(vm = %slot.name, id = %slot.vm_id, "resuming wait for vm");
            return self.watch_instance(&slot.vm_id, req).await;
        }

        let sizes = self.api.list_instance_sizes().await?;
        validation::ensure_member("vm size", &req.vm_type, &sizes)?;

        let (firewall_id, network_id, ssh_key_id, ssh_user) = self
            .state
            .read(|doc| {
                (
                    doc.infra.firewall(req.role).id.clone(),
                    doc.infra.network.id.clone(),
                    doc.infra.ssh_key.id.clone(),
                    doc.infra.ssh_user.clone(),
                )
            })
            .await?;
        if firewall_id.is_empty() || network_id.is_empty() || ssh_key_id.is_empty() {
            return Err(Error::InvalidOperation(format!(
                "network, ssh key and {} firewall must exist before creating vms",
                req.role
            )));
        }

        let template_id = self.api.disk_image_id(&self.region, DISK_IMAGE).await?;
        let script = cloud_init::render(&req.name, &ssh_user)?;
        let config = InstanceConfig {
            hostname: req.name.clone(),
            region: self.region.clone(),
            size: req.vm_type.clone(),
            template_id,
            network_id,
            firewall_id,
            sshkey_id: ssh_key_id,
            initial_user: ssh_user,
            public_ip: (if req.public && self.public { "create" } else { "none" }).to_string(),
            script,
        };

        let instance = self.api.create_instance(&config).await?;

        let (role, index) = (req.role, req.index);
        let record = VmRecord {
            name: req.name.clone(),
            vm_id: instance.id.clone(),
            vm_size: req.vm_type.clone(),
            ..Default::default()
        };
        self.state
            .update(move |doc| {
                if doc.infra.set_vm(role, index, record) {
                    Ok(())
                } else {
                    Err(Error::InvalidOperation(format!(
                        "{} index {} disappeared from the state record",
                        role, index
                    )))
                }
            })
            .await?;
        info!(vm = %req.name, id = %instance.id, "created vm, waiting for it to become active");

        self.watch_instance(&instance.id, req).await
    }

    /// Poll an instance until it is active and addressable. Every
    /// observation is written to the record as it arrives, and the poll that
    /// completes the last outstanding VM marks provisioning complete.
    async fn watch_instance(&self, vm_id: &str, req: &VmRequest) -> Result<()> {
        let api = &self.api;
        let state = &self.state;
        let region = self.region.as_str();
        let (role, index) = (req.role, req.index);
        let what = format!("{} vm {}", role, req.name);

        self.pollers
            .vm
            .wait_for(&what, move || async move {
                let instance = api.get_instance(region, vm_id).await?;
                let ready = state
                    .update(move |doc| record_observation(doc, role, index, instance))
                    .await?;
                Ok(if ready {
                    Readiness::Ready(())
                } else {
                    Readiness::Pending
                })
            })
            .await?;

        info!(vm = %req.name, %role, index, "vm is active");
        Ok(())
    }

    pub(super) async fn delete_vm(&self, role: Role, index: usize) -> Result<()> {
        let Some(slot) = self.state.read(|doc| doc.infra.vm(role, index)).await? else {
            info!(%role, index, "skipped vm deletion, role was never sized");
            return Ok(());
        };
        if !slot.is_created() {
            info!(%role, index, "skipped vm deletion, already deleted");
            return Ok(());
        }

        self.api.delete_instance(&self.region, &slot.vm_id).await?;
        self.state
            .update(move |doc| {
                doc.infra.set_vm(role, index, VmRecord::default());
                Ok(())
            })
            .await?;
        info!(vm = %slot.name, id = %slot.vm_id, "deleted vm");
        Ok(())
    }
}

/// Copy what the provider reported into the VM slot. Returns whether the VM
/// is ready.
fn record_observation(
    doc: &mut StorageDocument,
    role: Role,
    index: usize,
    instance: CivoInstance,
) -> Result<bool> {
    let mut vm = doc.infra.vm(role, index).ok_or_else(|| {
        Error::InvalidOperation(format!(
            "{} index {} disappeared from the state record",
            role, index
        ))
    })?;

    if !instance.hostname.is_empty() {
        vm.hostname = instance.hostname;
    }
    if !instance.public_ip.is_empty() {
        vm.public_ip = instance.public_ip;
    }
    if !instance.private_ip.is_empty() {
        vm.private_ip = instance.private_ip;
    }
    let ready = instance.status.eq_ignore_ascii_case("active") && vm.is_ready();
    doc.infra.set_vm(role, index, vm);

    if ready && !doc.infra.is_completed && doc.infra.all_vms_ready() {
        doc.infra.is_completed = true;
        info!(cluster = %doc.cluster_name, "all vms ready, infrastructure provisioning complete");
    }
    Ok(ready)
}
