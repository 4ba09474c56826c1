//! PostgreSQL store. One JSONB row per cluster in `kubeforge.cluster_states`.

use async_trait::async_trait;
use kubeforge_models::{ClusterIdentity, StorageDocument};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::types::Json;

use super::{ClusterFilter, StateStore};
use crate::error::{Error, Result};

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .map_err(|e| Error::storage(format!("failed to connect to database: {}", e)))?;
        Ok(Self { pool })
    }

    /// Create the schema and table if they do not exist yet
    pub async fn initialize_schema(&self) -> Result<()> {
        sqlx::query("CREATE SCHEMA IF NOT EXISTS kubeforge")
            .execute(&self.pool)
            .await
            .map_err(|e| Error::storage(format!("failed to create kubeforge schema: {}", e)))?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS kubeforge.cluster_states (
                cloud TEXT NOT NULL,
                cluster_type TEXT NOT NULL,
                region TEXT NOT NULL,
                cluster_name TEXT NOT NULL,
                document JSONB NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                PRIMARY KEY (cloud, cluster_type, region, cluster_name)
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| Error::storage(format!("failed to create cluster_states table: {}", e)))?;

        tracing::info!("✓ State schema ready");
        Ok(())
    }
}

#[async_trait]
impl StateStore for PgStore {
    async fn read(&self, id: &ClusterIdentity) -> Result<StorageDocument> {
        let row: Option<(Json<StorageDocument>,)> = sqlx::query_as(
            "SELECT document FROM kubeforge.cluster_states
             WHERE cloud = $1 AND cluster_type = $2 AND region = $3 AND cluster_name = $4",
        )
        .bind(id.cloud.as_str())
        .bind(id.cluster_type.as_str())
        .bind(&id.region)
        .bind(&id.name)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| Error::storage(format!("failed to read {}: {}", id, e)))?;

        row.map(|(Json(doc),)| doc)
            .ok_or_else(|| Error::NotFound(format!("state record for {}", id)))
    }

    async fn write(&self, id: &ClusterIdentity, doc: &StorageDocument) -> Result<()> {
        sqlx::query(
            "INSERT INTO kubeforge.cluster_states (cloud, cluster_type, region, cluster_name, document)
             VALUES ($1, $2, $3, $4, $5)
             ON CONFLICT (cloud, cluster_type, region, cluster_name)
             DO UPDATE SET document = EXCLUDED.document, updated_at = NOW()",
        )
        .bind(id.cloud.as_str())
        .bind(id.cluster_type.as_str())
        .bind(&id.region)
        .bind(&id.name)
        .bind(Json(doc))
        .execute(&self.pool)
        .await
        .map_err(|e| Error::storage(format!("failed to write {}: {}", id, e)))?;
        Ok(())
    }

    async fn delete_cluster(&self, id: &ClusterIdentity) -> Result<()> {
        sqlx::query(
            "DELETE FROM kubeforge.cluster_states
             WHERE cloud = $1 AND cluster_type = $2 AND region = $3 AND cluster_name = $4",
        )
        .bind(id.cloud.as_str())
        .bind(id.cluster_type.as_str())
        .bind(&id.region)
        .bind(&id.name)
        .execute(&self.pool)
        .await
        .map_err(|e| Error::storage(format!("failed to delete {}: {}", id, e)))?;
        Ok(())
    }

    async fn list_clusters(&self, filter: &ClusterFilter) -> Result<Vec<StorageDocument>> {
        let rows: Vec<(Json<StorageDocument>,)> = sqlx::query_as(
            "SELECT document FROM kubeforge.cluster_states
             WHERE ($1::TEXT IS NULL OR cloud = $1)
               AND ($2::TEXT IS NULL OR cluster_type = $2)
             ORDER BY cloud, cluster_type, region, cluster_name",
        )
        .bind(filter.cloud.map(|c| c.as_str()))
        .bind(filter.cluster_type.map(|t| t.as_str()))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| Error::storage(format!("failed to list clusters: {}", e)))?;

        Ok(rows.into_iter().map(|(Json(doc),)| doc).collect())
    }
}
