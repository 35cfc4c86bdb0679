//! Intent execution for HTTP requests

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Instant;
use tracing::{error, info};
use vizsql_catalog::CatalogError;
use vizsql_compile::CompileError;
use vizsql_exec::{Dataset, ExecutionError, Outcome};
use vizsql_ir::{ResultTable, VisualizationIntent};

use crate::routes::AppState;

#[derive(Debug, Deserialize)]
pub struct ExecuteRequest {
    /// Falls back to the configured table
    #[serde(default)]
    pub table: Option<String>,
    pub intent: VisualizationIntent,
}

#[derive(Debug, Serialize)]
pub struct ExecuteResponse {
    pub request_id: String,
    pub sql: Option<String>,
    pub outcome: Outcome,
    pub data: Option<ResultTable>,
}

/// Error reply: a status code and a JSON `{error}` body
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

fn catalog_status(err: &CatalogError) -> StatusCode {
    match err {
        CatalogError::NotApplicable { .. }
        | CatalogError::UnknownAttribute(_)
        | CatalogError::InvalidTableName(_)
        | CatalogError::EmptyDomain(_) => StatusCode::BAD_REQUEST,
        CatalogError::CatalogUnavailable(_) | CatalogError::Driver(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<CatalogError> for ApiError {
    fn from(err: CatalogError) -> Self {
        Self {
            status: catalog_status(&err),
            message: err.to_string(),
        }
    }
}

impl From<ExecutionError> for ApiError {
    fn from(err: ExecutionError) -> Self {
        let status = match &err {
            ExecutionError::ReconciliationMismatch { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            ExecutionError::Compile(CompileError::MalformedIntent(_)) => StatusCode::BAD_REQUEST,
            ExecutionError::Compile(CompileError::Catalog(e)) | ExecutionError::Catalog(e) => catalog_status(e),
            ExecutionError::Compile(CompileError::Registry(_))
            | ExecutionError::MissingColumn(_)
            | ExecutionError::Driver(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            message: err.to_string(),
        }
    }
}

/// Run one intent on a fresh connection; blocking
pub fn execute(state: &AppState, request_id: String, request: ExecuteRequest) -> Result<ExecuteResponse, ApiError> {
    let table = state.resolve_table(request.table)?;
    let driver = state.driver()?;
    let dataset = Dataset::new(table, &driver, state.catalog());
    let mut intent = request.intent;

    info!(
        table = %dataset.table(),
        mark = ?intent.mark,
        fingerprint = %intent.fingerprint(),
        "Executing intent"
    );

    let started = Instant::now();
    let result = state.executor().execute_intent(&dataset, &mut intent);
    let seconds = started.elapsed().as_secs_f64();

    let outcome = match result {
        Ok(outcome) => {
            state.metrics().record_outcome(&outcome, seconds);
            outcome
        }
        Err(e) => {
            state.metrics().record_error(seconds);
            error!(error = %e, "Intent execution failed");
            return Err(e.into());
        }
    };

    let sql = match &outcome {
        Outcome::Executed { sql, .. } => Some(sql.clone()),
        Outcome::Skipped { .. } => None,
    };

    Ok(ExecuteResponse {
        request_id,
        sql,
        outcome,
        data: intent.data.take(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use vizsql_catalog::SemanticType;

    #[test]
    fn test_status_mapping() {
        let mismatch = ExecutionError::ReconciliationMismatch {
            attribute: "origin".to_string(),
            detail: "expected 3 rows".to_string(),
        };
        assert_eq!(ApiError::from(mismatch).status, StatusCode::UNPROCESSABLE_ENTITY);

        let malformed = ExecutionError::Compile(CompileError::MalformedIntent("no bins".to_string()));
        assert_eq!(ApiError::from(malformed).status, StatusCode::BAD_REQUEST);

        let not_applicable = ExecutionError::Compile(CompileError::Catalog(CatalogError::NotApplicable {
            operation: "min/max",
            attribute: "origin".to_string(),
            semantic_type: Some(SemanticType::Nominal),
        }));
        assert_eq!(ApiError::from(not_applicable).status, StatusCode::BAD_REQUEST);

        let missing = ExecutionError::MissingColumn("count".to_string());
        assert_eq!(ApiError::from(missing).status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_request_without_table() {
        let request: ExecuteRequest = serde_json::from_value(json!({
            "intent": {"mark": "bar", "clauses": []}
        }))
        .unwrap();
        assert!(request.table.is_none());
        assert!(request.intent.clauses.is_empty());
    }
}
