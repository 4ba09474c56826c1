//! Wiring between configuration, the state store and the cloud back-ends

use std::sync::Arc;

use anyhow::{Context, Result};
use kubeforge_models::{Cloud, Metadata};
use kubeforge_orchestrations::provider::civo::{CivoApi, CivoClient, CivoProvider, MockCivoApi};
use kubeforge_orchestrations::provider::local::{KindCli, LocalProvider};
use kubeforge_orchestrations::storage::{LocalStore, PgStore};
use kubeforge_orchestrations::{ClusterManager, CloudProvider, StateStore};

use crate::bootstrap::StateFileBootstrapper;
use crate::config::{Config, StoreKind};

pub struct AppContext {
    pub config: Config,
    pub store: Arc<dyn StateStore>,
    /// Shared simulated account when `civo_mock` is on, so every request
    /// sees the same resources
    civo_mock: Option<Arc<MockCivoApi>>,
}

impl AppContext {
    pub async fn new(config: Config) -> Result<Self> {
        let store: Arc<dyn StateStore> = match config.store {
            StoreKind::Local => {
                tracing::debug!(dir = %config.state_dir.display(), "using local state store");
                Arc::new(LocalStore::new(&config.state_dir))
            }
            StoreKind::Postgres => {
                let url = config
                    .database_url
                    .as_deref()
                    .context("DATABASE_URL must be set")?;
                let store = PgStore::connect(url)
                    .await
                    .context("Failed to connect to state database")?;
                store
                    .initialize_schema()
                    .await
                    .context("Failed to initialize state schema")?;
                tracing::debug!("using postgres state store");
                Arc::new(store)
            }
        };
        Ok(Self::with_store(config, store))
    }

    pub fn with_store(config: Config, store: Arc<dyn StateStore>) -> Self {
        let civo_mock = config.civo_mock.then(|| Arc::new(MockCivoApi::new()));
        Self {
            config,
            store,
            civo_mock,
        }
    }

    /// Share `mock` as the simulated Civo account
    #[cfg(test)]
    pub fn with_civo_mock(mut self, mock: Arc<MockCivoApi>) -> Self {
        self.civo_mock = Some(mock);
        self
    }

    fn civo_api(&self) -> Result<Arc<dyn CivoApi>> {
        if let Some(mock) = &self.civo_mock {
            tracing::warn!("using simulated civo api, no real resources are created");
            return Ok(mock.clone());
        }
        let token = self
            .config
            .civo_token
            .as_deref()
            .context("CIVO_TOKEN must be set for the civo provider")?;
        Ok(Arc::new(CivoClient::new(token)))
    }

    pub fn provider_for(&self, metadata: &Metadata) -> Result<Arc<dyn CloudProvider>> {
        let provider: Arc<dyn CloudProvider> = match metadata.cloud {
            Cloud::Civo => {
                let mut provider = CivoProvider::new(metadata, self.store.clone(), self.civo_api()?)
                    .with_pollers(self.config.pollers());
                if let Some(token) = &self.config.civo_token {
                    provider = provider.with_token(token.clone());
                }
                Arc::new(provider)
            }
            Cloud::Local => Arc::new(LocalProvider::new(
                metadata,
                self.store.clone(),
                Arc::new(KindCli::new(&self.config.kind_binary)),
            )),
        };
        Ok(provider)
    }

    pub fn manager_for(&self, metadata: &Metadata) -> Result<ClusterManager> {
        let provider = self.provider_for(metadata)?;
        let bootstrapper = StateFileBootstrapper::new(self.config.state_dir.join("bootstrap"));
        Ok(ClusterManager::new(provider, metadata.clone()).with_bootstrapper(Arc::new(bootstrapper)))
    }
}
