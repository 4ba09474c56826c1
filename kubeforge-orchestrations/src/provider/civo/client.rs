//! reqwest client for the Civo v2 REST API

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use super::api::{
    CivoApi, CivoInstance, CivoKubernetesCluster, CivoNetwork, FirewallConfig, InstanceConfig,
    KubernetesClusterConfig,
};
use crate::error::{Error, Result};

pub const DEFAULT_BASE_URL: &str = "https://api.civo.com/v2";

#[derive(Deserialize)]
struct IdResponse {
    id: String,
}

#[derive(Deserialize)]
struct Region {
    code: String,
}

#[derive(Deserialize)]
struct Named {
    name: String,
}

#[derive(Deserialize)]
struct DiskImage {
    id: String,
    name: String,
}

#[derive(Deserialize)]
struct KubernetesVersion {
    #[serde(alias = "label")]
    version: String,
    #[serde(default, rename = "type")]
    kind: String,
}

pub struct CivoClient {
    http: Client,
    base_url: String,
    token: String,
}

impl CivoClient {
    pub fn new(token: impl Into<String>) -> Self {
        Self::with_base_url(token, DEFAULT_BASE_URL)
    }

    pub fn with_base_url(token: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        }
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http
            .request(method, format!("{}/{}", self.base_url, path))
            .bearer_auth(&self.token)
    }

    async fn send(call: &str, req: RequestBuilder) -> Result<Response> {
        debug!(call, "civo request");
        let resp = req.send().await.map_err(|e| Error::provider(call, e))?;
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        if status == StatusCode::NOT_FOUND {
            return Err(Error::NotFound(format!("{} ({})", call, body)));
        }
        Err(Error::provider(call, format!("{}: {}", status, body)))
    }

    async fn json<T: DeserializeOwned>(call: &str, req: RequestBuilder) -> Result<T> {
        Self::send(call, req)
            .await?
            .json::<T>()
            .await
            .map_err(|e| Error::provider(call, format!("invalid response: {}", e)))
    }

    /// DELETE that treats an already-missing resource as success
    async fn delete(&self, call: &str, path: &str, region: &str) -> Result<()> {
        let req = self
            .request(Method::DELETE, path)
            .query(&[("region", region)]);
        match Self::send(call, req).await {
            Ok(_) => Ok(()),
            Err(e) if e.is_not_found() => {
                debug!(call, "resource already gone");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl CivoApi for CivoClient {
    async fn list_regions(&self) -> Result<Vec<String>> {
        let regions: Vec<Region> =
            Self::json("list_regions", self.request(Method::GET, "regions")).await?;
        Ok(regions.into_iter().map(|r| r.code).collect())
    }

    async fn list_instance_sizes(&self) -> Result<Vec<String>> {
        let sizes: Vec<Named> =
            Self::json("list_instance_sizes", self.request(Method::GET, "sizes")).await?;
        Ok(sizes.into_iter().map(|s| s.name).collect())
    }

    async fn list_kubernetes_versions(&self) -> Result<Vec<String>> {
        let versions: Vec<KubernetesVersion> = Self::json(
            "list_kubernetes_versions",
            self.request(Method::GET, "kubernetes/versions"),
        )
        .await?;
        Ok(versions
            .into_iter()
            .filter(|v| v.kind.is_empty() || v.kind == "stable")
            .map(|v| v.version)
            .collect())
    }

    async fn disk_image_id(&self, region: &str, name: &str) -> Result<String> {
        let images: Vec<DiskImage> = Self::json(
            "list_disk_images",
            self.request(Method::GET, "disk_images")
                .query(&[("region", region)]),
        )
        .await?;
        images
            .into_iter()
            .find(|i| i.name == name)
            .map(|i| i.id)
            .ok_or_else(|| Error::NotFound(format!("disk image {}", name)))
    }

    async fn create_network(&self, region: &str, label: &str) -> Result<CivoNetwork> {
        let created: IdResponse = Self::json(
            "create_network",
            self.request(Method::POST, "networks")
                .json(&json!({ "label": label, "region": region })),
        )
        .await?;
        Ok(CivoNetwork {
            id: created.id,
            label: label.to_string(),
            cidr: String::new(),
            status: String::new(),
        })
    }

    async fn get_network(&self, region: &str, id: &str) -> Result<CivoNetwork> {
        Self::json(
            "get_network",
            self.request(Method::GET, &format!("networks/{}", id))
                .query(&[("region", region)]),
        )
        .await
    }

    async fn delete_network(&self, region: &str, id: &str) -> Result<()> {
        self.delete("delete_network", &format!("networks/{}", id), region)
            .await
    }

    async fn create_firewall(&self, config: &FirewallConfig) -> Result<String> {
        let created: IdResponse = Self::json(
            "create_firewall",
            self.request(Method::POST, "firewalls").json(config),
        )
        .await?;
        Ok(created.id)
    }

    async fn delete_firewall(&self, region: &str, id: &str) -> Result<()> {
        self.delete("delete_firewall", &format!("firewalls/{}", id), region)
            .await
    }

    async fn create_ssh_key(&self, region: &str, name: &str, public_key: &str) -> Result<String> {
        let created: IdResponse = Self::json(
            "create_ssh_key",
            self.request(Method::POST, "sshkeys").json(&json!({
                "name": name,
                "public_key": public_key,
                "region": region,
            })),
        )
        .await?;
        Ok(created.id)
    }

    async fn delete_ssh_key(&self, region: &str, id: &str) -> Result<()> {
        self.delete("delete_ssh_key", &format!("sshkeys/{}", id), region)
            .await
    }

    async fn create_instance(&self, config: &InstanceConfig) -> Result<CivoInstance> {
        Self::json(
            "create_instance",
            self.request(Method::POST, "instances").json(config),
        )
        .await
    }

    async fn get_instance(&self, region: &str, id: &str) -> Result<CivoInstance> {
        Self::json(
            "get_instance",
            self.request(Method::GET, &format!("instances/{}", id))
                .query(&[("region", region)]),
        )
        .await
    }

    async fn delete_instance(&self, region: &str, id: &str) -> Result<()> {
        self.delete("delete_instance", &format!("instances/{}", id), region)
            .await
    }

    async fn create_kubernetes_cluster(
        &self,
        config: &KubernetesClusterConfig,
    ) -> Result<CivoKubernetesCluster> {
        Self::json(
            "create_kubernetes_cluster",
            self.request(Method::POST, "kubernetes/clusters").json(config),
        )
        .await
    }

    async fn get_kubernetes_cluster(&self, region: &str, id: &str) -> Result<CivoKubernetesCluster> {
        Self::json(
            "get_kubernetes_cluster",
            self.request(Method::GET, &format!("kubernetes/clusters/{}", id))
                .query(&[("region", region)]),
        )
        .await
    }

    async fn delete_kubernetes_cluster(&self, region: &str, id: &str) -> Result<()> {
        self.delete(
            "delete_kubernetes_cluster",
            &format!("kubernetes/clusters/{}", id),
            region,
        )
        .await
    }
}
