use kubeforge_models::{ResourceRef, Role};
use tracing::{debug, info};

use super::api::{CivoFirewallRule, FirewallConfig};
use super::CivoProvider;
use crate::error::{Error, Result};
use crate::provider::firewall::rules_for;

impl CivoProvider {
    pub(super) async fn create_firewall(&self, role: Role, name: &str) -> Result<()> {
        let (existing, network_id, cidr) = self
            .state
            .read(|doc| {
                (
                    doc.infra.firewall(role).clone(),
                    doc.infra.network.id.clone(),
                    doc.infra.network_cidr.clone(),
                )
            })
            .await?;

        if existing.is_present() {
            info!(%role, firewall = %existing.name, id = %existing.id, "skipped firewall creation, already exists");
            return Ok(());
        }
        if network_id.is_empty() || cidr.is_empty() {
            return Err(Error::InvalidOperation(
                "network must be active before creating firewalls".to_string(),
            ));
        }

        let rules: Vec<CivoFirewallRule> = rules_for(role, &cidr, self.distro)
            .iter()
            .map(CivoFirewallRule::from)
            .collect();
        debug!(%role, rules = rules.len(), "firewall rules");

        let config = FirewallConfig {
            name: name.to_string(),
            region: self.region.clone(),
            network_id,
            create_rules: false,
            rules,
        };
        let id = self.api.create_firewall(&config).await?;

        let created = ResourceRef::new(id.clone(), name);
        self.state
            .update(move |doc| {
                *doc.infra.firewall_mut(role) = created;
                Ok(())
            })
            .await?;
        info!(%role, firewall = name, %id, "created firewall");
        Ok(())
    }

    pub(super) async fn delete_firewall(&self, role: Role) -> Result<()> {
        let existing = self
            .state
            .read(|doc| doc.infra.firewall(role).clone())
            .await?;
        if !existing.is_present() {
            info!(%role, "skipped firewall deletion, already deleted");
            return Ok(());
        }

        self.api.delete_firewall(&self.region, &existing.id).await?;
        self.state
            .update(move |doc| {
                doc.infra.firewall_mut(role).clear();
                Ok(())
            })
            .await?;
        info!(%role, firewall = %existing.name, id = %existing.id, "deleted firewall");
        Ok(())
    }
}
