//! Hand-off point to the Kubernetes bootstrap layer

use async_trait::async_trait;
use kubeforge_models::ClusterResourceState;

use crate::error::Result;

/// Receives the VM inventory once infrastructure provisioning finishes.
/// Installing Kubernetes on the machines happens behind this trait.
#[async_trait]
pub trait Bootstrapper: Send + Sync {
    async fn bootstrap(&self, state: &ClusterResourceState) -> Result<()>;
}
