use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use chrono::{DateTime, Utc};
use kubeforge_models::{Cloud, ClusterIdentity, ClusterSummary, ClusterType, Metadata};
use kubeforge_orchestrations::provider::local::LOCAL_REGION;
use kubeforge_orchestrations::{list_clusters, phase, ClusterFilter};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::context::AppContext;

/// Finished operations stay queryable for this long
const OPERATION_RETENTION_MINUTES: i64 = 60;
/// Upper bound on finished operations kept in memory
const MAX_FINISHED_OPERATIONS: usize = 1000;

/// Shared API state
#[derive(Clone)]
pub struct AppState {
    pub ctx: Arc<AppContext>,
    pub operations: Arc<RwLock<HashMap<Uuid, OperationRecord>>>,
}

impl AppState {
    pub fn new(ctx: AppContext) -> Self {
        Self {
            ctx: Arc::new(ctx),
            operations: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationStatus {
    Running,
    Succeeded,
    Failed,
}

/// A create or delete running in the background
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationRecord {
    pub id: Uuid,
    pub kind: String,
    pub cluster: String,
    pub status: OperationStatus,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        .route("/api/clusters", get(list_all).post(create_cluster))
        .route(
            "/api/clusters/:cloud/:cluster_type/:region/:name",
            get(get_cluster).delete(delete_cluster),
        )
        .route("/api/operations/:id", get(get_operation))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}

/// Start the API server
pub async fn start_server(port: u16, state: AppState) -> Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("✓ API server listening on {}", addr);

    axum::serve(listener, app)
        .await
        .map_err(|e| anyhow::anyhow!("Server error: {}", e))?;

    Ok(())
}

// ============================================================================
// Health Check
// ============================================================================

async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "kubeforge",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

// ============================================================================
// Clusters
// ============================================================================

#[derive(Debug, Default, Deserialize)]
struct ListQuery {
    cloud: Option<Cloud>,
    cluster_type: Option<ClusterType>,
}

async fn list_all(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<ClusterSummary>>, AppError> {
    let filter = ClusterFilter {
        cloud: query.cloud,
        cluster_type: query.cluster_type,
    };
    let clusters = list_clusters(state.ctx.store.as_ref(), &filter).await?;
    Ok(Json(clusters))
}

fn identity_from_path(
    (cloud, cluster_type, region, name): (String, String, String, String),
) -> Result<ClusterIdentity, AppError> {
    let cloud: Cloud = cloud
        .parse()
        .map_err(|e: kubeforge_models::ParseEnumError| AppError::BadRequest(e.to_string()))?;
    let cluster_type: ClusterType = cluster_type
        .parse()
        .map_err(|e: kubeforge_models::ParseEnumError| AppError::BadRequest(e.to_string()))?;
    let region = if cloud == Cloud::Local {
        LOCAL_REGION.to_string()
    } else {
        region
    };
    Ok(ClusterIdentity::new(cloud, region, name, cluster_type))
}

async fn get_cluster(
    State(state): State<AppState>,
    Path(path): Path<(String, String, String, String)>,
) -> Result<Json<ClusterSummary>, AppError> {
    let identity = identity_from_path(path)?;
    let doc = state.ctx.store.read(&identity).await?;
    Ok(Json(phase::summarize(&doc)))
}

#[derive(Debug, Serialize)]
struct Accepted {
    operation_id: Uuid,
    cluster: String,
}

async fn create_cluster(
    State(state): State<AppState>,
    Json(metadata): Json<Metadata>,
) -> Result<(StatusCode, Json<Accepted>), AppError> {
    let manager = state
        .ctx
        .manager_for(&metadata)
        .map_err(|e| AppError::BadRequest(e.to_string()))?;
    let cluster = metadata.identity().to_string();

    let id = start_operation(&state, "create", &cluster, async move {
        match metadata.cluster_type {
            ClusterType::Ha => manager.create_ha_cluster().await.map(|_| ()),
            ClusterType::Managed => manager.create_managed_cluster().await.map(|_| ()),
        }
    })
    .await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(Accepted {
            operation_id: id,
            cluster,
        }),
    ))
}

async fn delete_cluster(
    State(state): State<AppState>,
    Path(path): Path<(String, String, String, String)>,
) -> Result<(StatusCode, Json<Accepted>), AppError> {
    let identity = identity_from_path(path)?;
    let metadata = Metadata::new(
        identity.cloud,
        identity.region.clone(),
        identity.name.clone(),
        identity.cluster_type,
    );
    let manager = state
        .ctx
        .manager_for(&metadata)
        .map_err(|e| AppError::BadRequest(e.to_string()))?;
    if !manager.exists().await? {
        return Err(AppError::NotFound(format!("cluster {} not found", identity)));
    }
    let cluster = identity.to_string();

    let id = start_operation(&state, "delete", &cluster, async move {
        match identity.cluster_type {
            ClusterType::Ha => manager.delete_ha_cluster().await,
            ClusterType::Managed => manager.delete_managed_cluster().await,
        }
    })
    .await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(Accepted {
            operation_id: id,
            cluster,
        }),
    ))
}

// ============================================================================
// Operations
// ============================================================================

/// Record an operation and run `work` on a background task. At most one
/// operation runs per cluster; providers do not share state records.
async fn start_operation<F>(
    state: &AppState,
    kind: &str,
    cluster: &str,
    work: F,
) -> Result<Uuid, AppError>
where
    F: std::future::Future<Output = kubeforge_orchestrations::Result<()>> + Send + 'static,
{
    let id = Uuid::new_v4();
    {
        let mut ops = state.operations.write().await;
        if let Some(running) = ops
            .values()
            .find(|op| op.status == OperationStatus::Running && op.cluster == cluster)
        {
            return Err(AppError::Conflict(format!(
                "cluster {} is busy with {} operation {}",
                cluster, running.kind, running.id
            )));
        }
        prune_operations(&mut ops, Utc::now());
        ops.insert(
            id,
            OperationRecord {
                id,
                kind: kind.to_string(),
                cluster: cluster.to_string(),
                status: OperationStatus::Running,
                error: None,
                started_at: Utc::now(),
                finished_at: None,
            },
        );
    }
    tracing::info!(operation = %id, kind, cluster, "operation started");

    let operations = state.operations.clone();
    tokio::spawn(async move {
        let result = work.await;
        let mut ops = operations.write().await;
        if let Some(op) = ops.get_mut(&id) {
            op.finished_at = Some(Utc::now());
            match result {
                Ok(()) => {
                    op.status = OperationStatus::Succeeded;
                    tracing::info!(operation = %id, cluster = %op.cluster, "operation succeeded");
                }
                Err(e) => {
                    op.status = OperationStatus::Failed;
                    op.error = Some(e.to_string());
                    tracing::error!(operation = %id, cluster = %op.cluster, error = %e, "operation failed");
                }
            }
        }
    });

    Ok(id)
}

/// Drop finished operations past retention, then the oldest beyond the cap
fn prune_operations(ops: &mut HashMap<Uuid, OperationRecord>, now: DateTime<Utc>) {
    let cutoff = now - chrono::Duration::minutes(OPERATION_RETENTION_MINUTES);
    ops.retain(|_, op| op.finished_at.map_or(true, |at| at > cutoff));

    let mut finished: Vec<(DateTime<Utc>, Uuid)> = ops
        .values()
        .filter_map(|op| op.finished_at.map(|at| (at, op.id)))
        .collect();
    if finished.len() > MAX_FINISHED_OPERATIONS {
        finished.sort();
        let excess = finished.len() - MAX_FINISHED_OPERATIONS;
        for (_, id) in finished.into_iter().take(excess) {
            ops.remove(&id);
        }
    }
}

async fn get_operation(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<OperationRecord>, AppError> {
    state
        .operations
        .read()
        .await
        .get(&id)
        .cloned()
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("Operation '{}' not found", id)))
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug)]
enum AppError {
    BadRequest(String),
    NotFound(String),
    Conflict(String),
    Internal(String),
}

impl From<kubeforge_orchestrations::Error> for AppError {
    fn from(err: kubeforge_orchestrations::Error) -> Self {
        use kubeforge_orchestrations::Error;

        let message = err.to_string();
        match err.root() {
            Error::NotFound(_) => AppError::NotFound(message),
            Error::DuplicateRecord(_) => AppError::Conflict(message),
            Error::Validation { .. }
            | Error::ConstraintViolation { .. }
            | Error::Unsupported { .. }
            | Error::InvalidOperation(_) => AppError::BadRequest(message),
            _ => AppError::Internal(message),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = Json(serde_json::json!({
            "error": message
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use kubeforge_orchestrations::provider::civo::MockCivoApi;
    use kubeforge_orchestrations::storage::MemoryStore;
    use tower::ServiceExt;

    use super::*;
    use crate::config::Config;

    fn test_state() -> AppState {
        test_state_with(Arc::new(MockCivoApi::new()))
    }

    fn test_state_with(mock: Arc<MockCivoApi>) -> AppState {
        let mut config = Config::from_lookup(|_| None).unwrap();
        config.civo_mock = true;
        config.poll_interval = Duration::from_millis(2);
        config.state_dir = std::env::temp_dir().join(format!("kubeforge-api-{}", Uuid::new_v4()));
        let ctx = AppContext::with_store(config, Arc::new(MemoryStore::new())).with_civo_mock(mock);
        AppState::new(ctx)
    }

    fn post_cluster(payload: &serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/api/clusters")
            .header("content-type", "application/json")
            .body(Body::from(payload.to_string()))
            .unwrap()
    }

    fn finished_op(cluster: &str, finished_at: DateTime<Utc>) -> OperationRecord {
        OperationRecord {
            id: Uuid::new_v4(),
            kind: "create".to_string(),
            cluster: cluster.to_string(),
            status: OperationStatus::Succeeded,
            error: None,
            started_at: finished_at,
            finished_at: Some(finished_at),
        }
    }

    async fn send(state: &AppState, request: Request<Body>) -> (StatusCode, serde_json::Value) {
        let response = create_router(state.clone()).oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn wait_for_operation(state: &AppState, id: &str) -> serde_json::Value {
        for _ in 0..500 {
            let (status, body) = send(state, get(&format!("/api/operations/{}", id))).await;
            assert_eq!(status, StatusCode::OK);
            if body["status"] != "running" {
                return body;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("operation {id} did not finish");
    }

    #[tokio::test]
    async fn test_health() {
        let (status, body) = send(&test_state(), get("/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
    }

    #[tokio::test]
    async fn test_unknown_cluster_is_404() {
        let state = test_state();
        let (status, _) = send(&state, get("/api/clusters/civo/managed/LON1/nope")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = send(&state, get("/api/clusters/aws/managed/LON1/nope")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_create_list_delete_managed() {
        let state = test_state();
        let payload = serde_json::json!({
            "cluster_name": "api-demo",
            "region": "LON1",
            "cloud": "civo",
            "cluster_type": "managed",
            "no_mp": 2,
            "managed_node_type": "g4s.kube.small"
        });
        let request = Request::builder()
            .method("POST")
            .uri("/api/clusters")
            .header("content-type", "application/json")
            .body(Body::from(payload.to_string()))
            .unwrap();
        let (status, body) = send(&state, request).await;
        assert_eq!(status, StatusCode::ACCEPTED);
        let op = body["operation_id"].as_str().unwrap().to_string();

        let finished = wait_for_operation(&state, &op).await;
        assert_eq!(finished["status"], "succeeded", "{finished}");

        let (status, body) = send(&state, get("/api/clusters?cloud=civo")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().unwrap().len(), 1);
        assert_eq!(body[0]["phase"], "ready");

        let (status, body) = send(&state, get("/api/clusters/civo/managed/LON1/api-demo")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["no_mp"], 2);

        let request = Request::builder()
            .method("DELETE")
            .uri("/api/clusters/civo/managed/LON1/api-demo")
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(&state, request).await;
        assert_eq!(status, StatusCode::ACCEPTED);
        let op = body["operation_id"].as_str().unwrap().to_string();
        assert_eq!(wait_for_operation(&state, &op).await["status"], "succeeded");

        let (status, body) = send(&state, get("/api/clusters")).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_create_is_reported() {
        let state = test_state();
        let payload = serde_json::json!({
            "cluster_name": "tiny",
            "region": "LON1",
            "cloud": "civo",
            "cluster_type": "ha",
            "no_cp": 2,
            "no_wp": 1,
            "no_ds": 1
        });
        let request = Request::builder()
            .method("POST")
            .uri("/api/clusters")
            .header("content-type", "application/json")
            .body(Body::from(payload.to_string()))
            .unwrap();
        let (status, body) = send(&state, request).await;
        assert_eq!(status, StatusCode::ACCEPTED);

        let finished = wait_for_operation(&state, body["operation_id"].as_str().unwrap()).await;
        assert_eq!(finished["status"], "failed");
        assert!(finished["error"].as_str().unwrap().contains("odd"));
    }

    #[tokio::test]
    async fn test_second_operation_on_busy_cluster_is_409() {
        let mock = Arc::new(MockCivoApi::new().with_pending_polls(20));
        let state = test_state_with(mock.clone());
        let payload = serde_json::json!({
            "cluster_name": "busy",
            "region": "LON1",
            "cloud": "civo",
            "cluster_type": "ha",
            "no_cp": 3,
            "no_wp": 1,
            "no_ds": 1,
            "control_plane_node_type": "g3.small",
            "worker_plane_node_type": "g3.medium",
            "load_balancer_node_type": "g3.small",
            "data_store_node_type": "g3.small"
        });

        let (status, body) = send(&state, post_cluster(&payload)).await;
        assert_eq!(status, StatusCode::ACCEPTED);
        let op = body["operation_id"].as_str().unwrap().to_string();

        let (status, body) = send(&state, post_cluster(&payload)).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert!(body["error"].as_str().unwrap().contains("busy"));

        let finished = wait_for_operation(&state, &op).await;
        assert_eq!(finished["status"], "succeeded", "{finished}");
        assert_eq!(mock.live_instances(), 6);
        assert_eq!(mock.calls("create_instance"), 6);

        // the cluster is free again once the first operation finishes
        let request = Request::builder()
            .method("DELETE")
            .uri("/api/clusters/civo/ha/LON1/busy")
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(&state, request).await;
        assert_eq!(status, StatusCode::ACCEPTED);
        let op = body["operation_id"].as_str().unwrap().to_string();
        assert_eq!(wait_for_operation(&state, &op).await["status"], "succeeded");
        assert_eq!(mock.live_instances(), 0);
    }

    #[test]
    fn test_prune_drops_expired_finished_operations() {
        let now = Utc::now();
        let mut ops = HashMap::new();
        let old = finished_op("civo/ha/LON1/old", now - chrono::Duration::hours(2));
        let recent = finished_op("civo/ha/LON1/recent", now - chrono::Duration::minutes(5));
        let mut running = finished_op("civo/ha/LON1/slow", now - chrono::Duration::hours(3));
        running.status = OperationStatus::Running;
        running.finished_at = None;
        for op in [&old, &recent, &running] {
            ops.insert(op.id, op.clone());
        }

        prune_operations(&mut ops, now);

        assert!(!ops.contains_key(&old.id));
        assert!(ops.contains_key(&recent.id));
        assert!(ops.contains_key(&running.id));
    }

    #[test]
    fn test_prune_caps_finished_operations() {
        let now = Utc::now();
        let mut ops = HashMap::new();
        let mut oldest = None;
        for i in 0..(MAX_FINISHED_OPERATIONS + 5) {
            let op = finished_op("civo/ha/LON1/many", now - chrono::Duration::seconds(i as i64));
            if i == MAX_FINISHED_OPERATIONS + 4 {
                oldest = Some(op.id);
            }
            ops.insert(op.id, op);
        }

        prune_operations(&mut ops, now);

        assert_eq!(ops.len(), MAX_FINISHED_OPERATIONS);
        assert!(!ops.contains_key(&oldest.unwrap()));
    }
}
