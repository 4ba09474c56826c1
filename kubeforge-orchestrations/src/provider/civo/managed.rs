use kubeforge_models::{K8sDistro, ManagedClusterState};
use tracing::{info, warn};

use super::api::KubernetesClusterConfig;
use super::CivoProvider;
use crate::error::{Error, Result};
use crate::poller::Readiness;
use crate::provider::{validation, ManagedClusterRequest, ManagedOutcome};

const K3S_SUFFIX: &str = "-k3s1";
const DEFAULT_APPS: [&str; 2] = ["traefik2-nodeport", "metrics-server"];

/// Map a requested CNI to what Civo installs. Anything other than the
/// built-in plugins is left for the caller to deploy.
fn resolve_cni(requested: &str) -> (String, bool) {
    match requested.to_ascii_lowercase().as_str() {
        "" | "flannel" => ("flannel".to_string(), false),
        "cilium" => ("cilium".to_string(), false),
        _ => ("none".to_string(), true),
    }
}

fn resolve_apps(requested: &[String]) -> Vec<String> {
    let mut apps: Vec<String> = DEFAULT_APPS.iter().map(|a| a.to_string()).collect();
    for app in requested {
        if !apps.contains(app) {
            apps.push(app.clone());
        }
    }
    apps
}

/// Empty picks the newest offered version; bare versions get the k3s suffix
fn resolve_version(requested: &str, available: &[String]) -> Result<String> {
    if requested.is_empty() {
        return available
            .first()
            .cloned()
            .ok_or_else(|| Error::validation("kubernetes version", "provider offers no versions"));
    }
    let wanted = if requested.ends_with(K3S_SUFFIX) {
        requested.to_string()
    } else {
        format!("{}{}", requested, K3S_SUFFIX)
    };
    validation::ensure_member("kubernetes version", &wanted, available)?;
    Ok(wanted)
}

impl CivoProvider {
    pub(super) async fn create_managed(&self, req: &ManagedClusterRequest) -> Result<ManagedOutcome> {
        let (cni, external_cni) = resolve_cni(&req.cni);
        if external_cni {
            warn!(cni = %req.cni, "cni is not provider managed, it must be installed separately");
        }
        let outcome = ManagedOutcome { external_cni };

        let (existing, network_id, completed) = self
            .state
            .read(|doc| {
                (
                    doc.infra.managed.clone(),
                    doc.infra.network.id.clone(),
                    doc.infra.is_completed,
                )
            })
            .await?;

        if existing.is_present() {
            if completed {
                info!(cluster = %existing.name, id = %existing.id, "skipped managed cluster creation, already exists");
                return Ok(outcome);
            }
            info!(cluster = %existing.name, id = %existing.id, "resuming wait for managed cluster");
            self.watch_managed(&existing.id).await?;
            return Ok(outcome);
        }
        if network_id.is_empty() {
            return Err(Error::InvalidOperation(
                "network must exist before creating a managed cluster".to_string(),
            ));
        }

        let sizes = self.api.list_instance_sizes().await?;
        validation::ensure_member("vm size", &req.vm_type, &sizes)?;
        let versions = self.api.list_kubernetes_versions().await?;
        let version = resolve_version(&req.k8s_version, &versions)?;
        let apps = resolve_apps(&req.applications);

        let config = KubernetesClusterConfig {
            name: req.name.clone(),
            region: self.region.clone(),
            network_id,
            num_target_nodes: req.node_count,
            target_nodes_size: req.vm_type.clone(),
            kubernetes_version: version.clone(),
            applications: apps.join(","),
            cni_plugin: cni.clone(),
        };
        let cluster = self.api.create_kubernetes_cluster(&config).await?;

        let managed = ManagedClusterState {
            id: cluster.id.clone(),
            name: req.name.clone(),
            node_count: req.node_count,
            node_size: req.vm_type.clone(),
            applications: apps,
            cni,
        };
        self.state
            .update(move |doc| {
                doc.infra.managed = managed;
                doc.infra.kubernetes_version = version;
                doc.bootstrap_provider = K8sDistro::Managed;
                Ok(())
            })
            .await?;
        info!(cluster = %req.name, id = %cluster.id, "created managed cluster, waiting for it to become ready");

        self.watch_managed(&cluster.id).await?;
        Ok(outcome)
    }

    async fn watch_managed(&self, id: &str) -> Result<()> {
        let api = &self.api;
        let state = &self.state;
        let region = self.region.as_str();
        let what = format!("managed cluster {}", id);

        self.pollers
            .managed
            .wait_for(&what, move || async move {
                let cluster = api.get_kubernetes_cluster(region, id).await?;
                if !cluster.is_active() {
                    return Ok(Readiness::Pending);
                }
                let kubeconfig = cluster.kubeconfig.unwrap_or_default();
                let context = cluster.name;
                state
                    .update(move |doc| {
                        doc.kubeconfig = kubeconfig;
                        doc.kubeconfig_context = context;
                        doc.infra.is_completed = true;
                        Ok(())
                    })
                    .await?;
                Ok(Readiness::Ready(()))
            })
            .await?;

        info!(id, "managed cluster is ready");
        Ok(())
    }

    pub(super) async fn delete_managed(&self) -> Result<()> {
        let existing = self.state.read(|doc| doc.infra.managed.clone()).await?;
        if !existing.is_present() {
            info!("skipped managed cluster deletion, already deleted");
            return Ok(());
        }

        self.api
            .delete_kubernetes_cluster(&self.region, &existing.id)
            .await?;
        self.state
            .update(|doc| {
                doc.infra.managed = ManagedClusterState::default();
                doc.infra.is_completed = false;
                doc.kubeconfig.clear();
                doc.kubeconfig_context.clear();
                Ok(())
            })
            .await?;
        info!(cluster = %existing.name, id = %existing.id, "deleted managed cluster");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_cni() {
        assert_eq!(resolve_cni(""), ("flannel".to_string(), false));
        assert_eq!(resolve_cni("Cilium"), ("cilium".to_string(), false));
        assert_eq!(resolve_cni("calico"), ("none".to_string(), true));
    }

    #[test]
    fn test_resolve_apps_keeps_defaults_and_dedups() {
        let apps = resolve_apps(&["metrics-server".to_string(), "argo-cd".to_string()]);
        assert_eq!(apps, vec!["traefik2-nodeport", "metrics-server", "argo-cd"]);
    }

    #[test]
    fn test_resolve_version() {
        let available = vec!["1.28.2-k3s1".to_string(), "1.27.1-k3s1".to_string()];
        assert_eq!(resolve_version("", &available).unwrap(), "1.28.2-k3s1");
        assert_eq!(resolve_version("1.27.1", &available).unwrap(), "1.27.1-k3s1");
        assert!(resolve_version("1.20.0", &available).is_err());
    }
}
