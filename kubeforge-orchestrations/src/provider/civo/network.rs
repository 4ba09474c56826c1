use kubeforge_models::ResourceRef;
use tracing::info;

use super::CivoProvider;
use crate::error::Result;
use crate::poller::Readiness;

impl CivoProvider {
    pub(super) async fn create_network(&self, name: &str) -> Result<()> {
        let (existing, cidr) = self
            .state
            .read(|doc| (doc.infra.network.clone(), doc.infra.network_cidr.clone()))
            .await?;

        let id = if existing.is_present() {
            if !cidr.is_empty() {
                info!(network = %existing.name, id = %existing.id, "skipped network creation, already exists");
                return Ok(());
            }
            info!(network = %existing.name, "resuming wait for network");
            existing.id
        } else {
            let network = self.api.create_network(&self.region, name).await?;
            let created = ResourceRef::new(network.id.clone(), name);
            self.state
                .update(move |doc| {
                    doc.infra.network = created;
                    Ok(())
                })
                .await?;
            info!(network = name, id = %network.id, "created network");
            network.id
        };

        self.wait_for_network(&id).await
    }

    /// Poll until the network is active, recording its CIDR once known
    async fn wait_for_network(&self, id: &str) -> Result<()> {
        let api = &self.api;
        let state = &self.state;
        let region = self.region.as_str();
        let what = format!("network {}", id);

        self.pollers
            .network
            .wait_for(&what, move || async move {
                let network = api.get_network(region, id).await?;
                if !network.cidr.is_empty() {
                    let cidr = network.cidr.clone();
                    state
                        .update(move |doc| {
                            doc.infra.network_cidr = cidr;
                            Ok(())
                        })
                        .await?;
                }
                if network.is_active() && !network.cidr.is_empty() {
                    Ok(Readiness::Ready(()))
                } else {
                    Ok(Readiness::Pending)
                }
            })
            .await?;

        info!(id, "network is active");
        Ok(())
    }

    pub(super) async fn delete_network(&self) -> Result<()> {
        let existing = self.state.read(|doc| doc.infra.network.clone()).await?;

        if existing.is_present() {
            let api = &self.api;
            let region = self.region.as_str();
            let id = existing.id.as_str();
            // Fails while deleted instances are still detaching
            self.pollers
                .network
                .wait_for("network deletion", move || async move {
                    api.delete_network(region, id).await?;
                    Ok(Readiness::Ready(()))
                })
                .await?;

            self.state
                .update(|doc| {
                    doc.infra.network.clear();
                    doc.infra.network_cidr.clear();
                    Ok(())
                })
                .await?;
            info!(network = %existing.name, id = %existing.id, "deleted network");
        } else {
            info!("skipped network deletion, already deleted");
        }

        self.state.remove().await?;
        info!(cluster = %self.state.identity(), "removed cluster state record");
        Ok(())
    }
}
