use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use kubeforge_orchestrations::PollerSettings;

/// Where cluster state records are kept
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    Local,
    Postgres,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub store: StoreKind,
    pub state_dir: PathBuf,
    pub database_url: Option<String>,
    pub civo_token: Option<String>,
    /// Use the in-memory Civo simulation instead of the real API
    pub civo_mock: bool,
    /// Path of the `kind` binary for the local provider
    pub kind_binary: PathBuf,
    pub poll_interval: Duration,
    pub poll_max_retries: u32,
    pub api_port: u16,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key/value source, `lookup` returning `None` for unset keys
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let store = match lookup("KUBEFORGE_STORE").as_deref() {
            None | Some("local") => StoreKind::Local,
            Some("postgres") => StoreKind::Postgres,
            Some(other) => bail!("KUBEFORGE_STORE must be 'local' or 'postgres', got '{}'", other),
        };

        let state_dir = match lookup("KUBEFORGE_STATE_DIR") {
            Some(dir) => PathBuf::from(dir),
            None => {
                let home = lookup("HOME").unwrap_or_else(|| ".".to_string());
                PathBuf::from(home).join(".kubeforge")
            }
        };

        let database_url = lookup("DATABASE_URL");
        if store == StoreKind::Postgres && database_url.is_none() {
            bail!("DATABASE_URL must be set when KUBEFORGE_STORE=postgres");
        }

        let civo_mock = matches!(
            lookup("KUBEFORGE_CIVO_MOCK").as_deref(),
            Some("1") | Some("true")
        );

        let poll_interval = lookup("KUBEFORGE_POLL_INTERVAL_SECS")
            .unwrap_or_else(|| "10".to_string())
            .parse()
            .map(Duration::from_secs)
            .context("KUBEFORGE_POLL_INTERVAL_SECS must be a number of seconds")?;
        let poll_max_retries = lookup("KUBEFORGE_POLL_MAX_RETRIES")
            .unwrap_or_else(|| "6".to_string())
            .parse()
            .context("KUBEFORGE_POLL_MAX_RETRIES must be a non-negative integer")?;
        let api_port = lookup("KUBEFORGE_API_PORT")
            .unwrap_or_else(|| "8080".to_string())
            .parse()
            .context("KUBEFORGE_API_PORT must be a valid port number")?;

        Ok(Self {
            store,
            state_dir,
            database_url,
            civo_token: lookup("CIVO_TOKEN"),
            civo_mock,
            kind_binary: lookup("KUBEFORGE_KIND_BINARY")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("kind")),
            poll_interval,
            poll_max_retries,
            api_port,
        })
    }

    pub fn pollers(&self) -> PollerSettings {
        PollerSettings::with_budget(self.poll_interval, self.poll_max_retries)
    }

    pub fn log_dir(&self) -> PathBuf {
        self.state_dir.clone()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config(pairs: &[(&str, &str)]) -> Result<Config> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let cfg = config(&[("HOME", "/home/dev")]).unwrap();
        assert_eq!(cfg.store, StoreKind::Local);
        assert_eq!(cfg.state_dir, PathBuf::from("/home/dev/.kubeforge"));
        assert_eq!(cfg.poll_interval, Duration::from_secs(10));
        assert_eq!(cfg.api_port, 8080);
        assert!(!cfg.civo_mock);
        assert_eq!(cfg.kind_binary, PathBuf::from("kind"));
        assert_eq!(cfg.pollers(), PollerSettings::default());
    }

    #[test]
    fn test_postgres_requires_url() {
        assert!(config(&[("KUBEFORGE_STORE", "postgres")]).is_err());
        let cfg = config(&[
            ("KUBEFORGE_STORE", "postgres"),
            ("DATABASE_URL", "postgres://localhost/kubeforge"),
        ])
        .unwrap();
        assert_eq!(cfg.store, StoreKind::Postgres);
    }

    #[test]
    fn test_invalid_values() {
        assert!(config(&[("KUBEFORGE_STORE", "s3")]).is_err());
        assert!(config(&[("KUBEFORGE_API_PORT", "http")]).is_err());
        assert!(config(&[("KUBEFORGE_POLL_INTERVAL_SECS", "-1")]).is_err());
    }

    #[test]
    fn test_overrides() {
        let cfg = config(&[
            ("KUBEFORGE_STATE_DIR", "/var/lib/kubeforge"),
            ("KUBEFORGE_CIVO_MOCK", "true"),
            ("KUBEFORGE_POLL_INTERVAL_SECS", "2"),
            ("CIVO_TOKEN", "abc"),
        ])
        .unwrap();
        assert_eq!(cfg.state_dir, PathBuf::from("/var/lib/kubeforge"));
        assert!(cfg.civo_mock);
        assert_eq!(cfg.civo_token.as_deref(), Some("abc"));
        assert_eq!(cfg.pollers().network.interval, Duration::from_secs(1));
    }
}
