use kubeforge_models::{ResourceRef, SshKeyPair};
use tracing::info;

use super::{CivoProvider, SSH_USER};
use crate::error::Result;
use crate::provider::ssh::generate_key_pair;

impl CivoProvider {
    pub(super) async fn create_ssh_key(&self, name: &str) -> Result<()> {
        let (existing, pair) = self
            .state
            .read(|doc| (doc.infra.ssh_key.clone(), doc.ssh_key_pair.clone()))
            .await?;
        if existing.is_present() {
            info!(key = %existing.name, id = %existing.id, "skipped ssh key upload, already exists");
            return Ok(());
        }

        // Persist the generated pair before uploading so a resumed run
        // uploads the same public key.
        let pair = if pair.is_generated() {
            pair
        } else {
            let generated = generate_key_pair()?;
            let stored = generated.clone();
            self.state
                .update(move |doc| {
                    doc.ssh_key_pair = stored;
                    Ok(())
                })
                .await?;
            generated
        };

        let id = self
            .api
            .create_ssh_key(&self.region, name, &pair.public_key)
            .await?;
        let created = ResourceRef::new(id.clone(), name);
        self.state
            .update(move |doc| {
                doc.infra.ssh_key = created;
                doc.infra.ssh_user = SSH_USER.to_string();
                Ok(())
            })
            .await?;
        info!(key = name, %id, "uploaded ssh key");
        Ok(())
    }

    pub(super) async fn delete_ssh_key(&self) -> Result<()> {
        let existing = self.state.read(|doc| doc.infra.ssh_key.clone()).await?;
        if !existing.is_present() {
            info!("skipped ssh key deletion, already deleted");
            return Ok(());
        }

        self.api.delete_ssh_key(&self.region, &existing.id).await?;
        self.state
            .update(|doc| {
                doc.infra.ssh_key.clear();
                doc.infra.ssh_user.clear();
                doc.ssh_key_pair = SshKeyPair::default();
                Ok(())
            })
            .await?;
        info!(key = %existing.name, id = %existing.id, "deleted ssh key");
        Ok(())
    }
}
