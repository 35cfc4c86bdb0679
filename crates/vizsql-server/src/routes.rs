//! HTTP routes
//!
//! Provides REST API endpoints for:
//! - Intent execution
//! - Catalog browsing
//! - Prometheus metrics

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use std::sync::{Arc, Mutex};
use tracing::info_span;
use uuid::Uuid;
use vizsql_catalog::MetadataCatalog;
use vizsql_duck::DuckDriver;
use vizsql_exec::Executor;

use crate::catalog::{self, CatalogResponse};
use crate::metrics::Metrics;
use crate::query::{self, ApiError, ExecuteRequest, ExecuteResponse};

pub struct AppState {
    database: Mutex<DuckDriver>,
    catalog: MetadataCatalog,
    executor: Executor,
    default_table: Option<String>,
    metrics: Metrics,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    pub fn new(database: DuckDriver, executor: Executor, default_table: Option<String>) -> prometheus::Result<Self> {
        Ok(Self {
            database: Mutex::new(database),
            catalog: MetadataCatalog::new(),
            executor,
            default_table,
            metrics: Metrics::new()?,
        })
    }

    /// A connection of its own for one request
    pub fn driver(&self) -> Result<DuckDriver, ApiError> {
        let database = self.database.lock().unwrap_or_else(|e| e.into_inner());
        database
            .try_clone()
            .map_err(|e| ApiError::internal(format!("Failed to open connection: {}", e)))
    }

    pub fn resolve_table(&self, table: Option<String>) -> Result<String, ApiError> {
        table
            .or_else(|| self.default_table.clone())
            .ok_or_else(|| ApiError::bad_request("No table given and no default table configured"))
    }

    pub fn catalog(&self) -> &MetadataCatalog {
        &self.catalog
    }

    pub fn executor(&self) -> &Executor {
        &self.executor
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }
}

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/execute", post(execute_intent))
        .route("/catalog/:table", get(get_catalog))
        .route("/metrics", get(get_metrics))
        .route("/health", get(health_check))
        .with_state(state)
}

async fn execute_intent(
    State(state): State<SharedState>,
    Json(request): Json<ExecuteRequest>,
) -> Result<Json<ExecuteResponse>, ApiError> {
    let request_id = Uuid::new_v4().to_string();
    let span = info_span!("request", request_id = %request_id, route = "/execute");

    let response = tokio::task::spawn_blocking(move || {
        let _guard = span.enter();
        query::execute(&state, request_id, request)
    })
    .await
    .map_err(|e| ApiError::internal(e.to_string()))??;

    Ok(Json(response))
}

async fn get_catalog(
    State(state): State<SharedState>,
    Path(table): Path<String>,
) -> Result<Json<CatalogResponse>, ApiError> {
    let request_id = Uuid::new_v4().to_string();
    let span = info_span!("request", request_id = %request_id, route = "/catalog");

    let response = tokio::task::spawn_blocking(move || {
        let _guard = span.enter();
        catalog::describe(&state, &table)
    })
    .await
    .map_err(|e| ApiError::internal(e.to_string()))??;

    Ok(Json(response))
}

async fn get_metrics(State(state): State<SharedState>) -> Result<String, ApiError> {
    state
        .metrics()
        .render()
        .map_err(|e| ApiError::internal(e.to_string()))
}

async fn health_check() -> &'static str {
    "OK"
}
