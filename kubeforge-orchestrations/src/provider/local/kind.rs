//! kind (Kubernetes in Docker) driver

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct KindConfig {
    kind: String,
    api_version: String,
    nodes: Vec<KindNode>,
    networking: KindNetworking,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct KindNode {
    role: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct KindNetworking {
    #[serde(rename = "disableDefaultCNI")]
    disable_default_cni: bool,
}

/// Cluster config with one control-plane node and `node_count - 1` workers
pub fn render_config(node_count: usize, disable_default_cni: bool) -> Result<String> {
    if node_count < 1 {
        return Err(Error::validation(
            "node count",
            "a kind cluster needs at least one node",
        ));
    }
    let mut nodes = vec![KindNode {
        role: "control-plane".to_string(),
    }];
    nodes.extend((1..node_count).map(|_| KindNode {
        role: "worker".to_string(),
    }));

    let config = KindConfig {
        kind: "Cluster".to_string(),
        api_version: "kind.x-k8s.io/v1alpha4".to_string(),
        nodes,
        networking: KindNetworking {
            disable_default_cni,
        },
    };
    serde_yaml::to_string(&config)
        .map_err(|e| Error::Internal(format!("failed to render kind config: {}", e)))
}

#[async_trait]
pub trait KindApi: Send + Sync {
    async fn exists(&self, name: &str) -> Result<bool>;
    async fn create(&self, name: &str, config: &str, image: &str) -> Result<()>;
    async fn delete(&self, name: &str) -> Result<()>;
    async fn kubeconfig(&self, name: &str) -> Result<String>;
}

/// Drives the `kind` binary
pub struct KindCli {
    binary: PathBuf,
    wait: Duration,
}

impl Default for KindCli {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("kind"),
            wait: Duration::from_secs(50),
        }
    }
}

impl KindCli {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            ..Self::default()
        }
    }

    async fn run(&self, args: &[&str], stdin: Option<&str>) -> Result<String> {
        let call = format!("kind {}", args.iter().take(2).copied().collect::<Vec<_>>().join(" "));
        debug!(binary = %self.binary.display(), ?args, "running kind");

        let mut child = Command::new(&self.binary)
            .args(args)
            .stdin(if stdin.is_some() { Stdio::piped() } else { Stdio::null() })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| Error::provider(&call, format!("failed to spawn: {}", e)))?;

        if let Some(input) = stdin {
            let mut pipe = child
                .stdin
                .take()
                .ok_or_else(|| Error::Internal("kind stdin unavailable".to_string()))?;
            pipe.write_all(input.as_bytes())
                .await
                .map_err(|e| Error::provider(&call, e))?;
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| Error::provider(&call, e))?;
        if !output.status.success() {
            return Err(Error::provider(
                &call,
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl KindApi for KindCli {
    async fn exists(&self, name: &str) -> Result<bool> {
        let out = self.run(&["get", "clusters"], None).await?;
        Ok(out.lines().any(|line| line.trim() == name))
    }

    async fn create(&self, name: &str, config: &str, image: &str) -> Result<()> {
        let wait = format!("{}s", self.wait.as_secs());
        self.run(
            &[
                "create", "cluster", "--name", name, "--image", image, "--wait", &wait,
                "--config=-",
            ],
            Some(config),
        )
        .await
        .map(|_| ())
    }

    async fn delete(&self, name: &str) -> Result<()> {
        self.run(&["delete", "cluster", "--name", name], None)
            .await
            .map(|_| ())
    }

    async fn kubeconfig(&self, name: &str) -> Result<String> {
        self.run(&["get", "kubeconfig", "--name", name], None).await
    }
}

/// Records kind clusters in memory
#[derive(Default)]
pub struct MockKind {
    clusters: Mutex<BTreeSet<String>>,
    creates: Mutex<Vec<(String, String)>>,
}

impl MockKind {
    pub fn new() -> Self {
        Self::default()
    }

    /// `(name, image)` of every create call
    pub fn creates(&self) -> Vec<(String, String)> {
        self.creates.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn running(&self) -> usize {
        self.clusters.lock().map(|c| c.len()).unwrap_or(0)
    }

    fn clusters(&self) -> Result<std::sync::MutexGuard<'_, BTreeSet<String>>> {
        self.clusters
            .lock()
            .map_err(|_| Error::Internal("mock kind lock poisoned".to_string()))
    }
}

#[async_trait]
impl KindApi for MockKind {
    async fn exists(&self, name: &str) -> Result<bool> {
        Ok(self.clusters()?.contains(name))
    }

    async fn create(&self, name: &str, config: &str, image: &str) -> Result<()> {
        serde_yaml::from_str::<KindConfig>(config)
            .map_err(|e| Error::provider("kind create", format!("bad config: {}", e)))?;
        if !self.clusters()?.insert(name.to_string()) {
            return Err(Error::provider("kind create", format!("cluster {} exists", name)));
        }
        if let Ok(mut creates) = self.creates.lock() {
            creates.push((name.to_string(), image.to_string()));
        }
        Ok(())
    }

    async fn delete(&self, name: &str) -> Result<()> {
        self.clusters()?.remove(name);
        Ok(())
    }

    async fn kubeconfig(&self, name: &str) -> Result<String> {
        if !self.clusters()?.contains(name) {
            return Err(Error::NotFound(format!("kind cluster {}", name)));
        }
        Ok(format!(
            "apiVersion: v1\nkind: Config\ncurrent-context: kind-{}\n",
            name
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_node_config() {
        let yaml = render_config(1, false).unwrap();
        let config: KindConfig = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(config.nodes.len(), 1);
        assert_eq!(config.nodes[0].role, "control-plane");
        assert!(yaml.contains("apiVersion: kind.x-k8s.io/v1alpha4"));
        assert!(yaml.contains("disableDefaultCNI: false"));
    }

    #[test]
    fn test_workers_follow_control_plane() {
        let yaml = render_config(3, true).unwrap();
        let config: KindConfig = serde_yaml::from_str(&yaml).unwrap();
        let roles: Vec<_> = config.nodes.iter().map(|n| n.role.as_str()).collect();
        assert_eq!(roles, vec!["control-plane", "worker", "worker"]);
        assert!(config.networking.disable_default_cni);
    }

    #[test]
    fn test_zero_nodes_rejected() {
        assert!(render_config(0, false).is_err());
    }
}
