//! Bootstrap hand-off that writes the VM inventory to disk
//!
//! The distro bootstrapper runs as a separate tool and picks up
//! `<dir>/<cluster>-<region>.json`.

use std::path::PathBuf;

use async_trait::async_trait;
use kubeforge_models::ClusterResourceState;
use kubeforge_orchestrations::{Bootstrapper, Error, Result};

pub struct StateFileBootstrapper {
    dir: PathBuf,
}

impl StateFileBootstrapper {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, state: &ClusterResourceState) -> PathBuf {
        self.dir
            .join(format!("{}-{}.json", state.cluster_name, state.region.to_lowercase()))
    }
}

#[async_trait]
impl Bootstrapper for StateFileBootstrapper {
    async fn bootstrap(&self, state: &ClusterResourceState) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| Error::storage(format!("creating {}: {}", self.dir.display(), e)))?;

        let path = self.path_for(state);
        let body = serde_json::to_vec_pretty(state)
            .map_err(|e| Error::Internal(format!("encoding bootstrap payload: {}", e)))?;
        tokio::fs::write(&path, body)
            .await
            .map_err(|e| Error::storage(format!("writing {}: {}", path.display(), e)))?;

        tracing::info!(
            cluster = %state.cluster_name,
            path = %path.display(),
            control_planes = state.ipv4_control_planes.len(),
            workers = state.ipv4_worker_planes.len(),
            "wrote bootstrap inventory"
        );
        Ok(())
    }
}
