//! Table catalog as served over HTTP

use serde::Serialize;
use std::collections::BTreeMap;
use tracing::info;
use vizsql_catalog::{DataModel, SemanticType, TableMetadata};

use crate::query::ApiError;
use crate::routes::AppState;

#[derive(Debug, Serialize)]
pub struct CatalogResponse {
    #[serde(flatten)]
    pub metadata: TableMetadata,
    pub data_model: DataModel,
    pub semantic_buckets: BTreeMap<SemanticType, Vec<String>>,
}

/// Metadata for `table`, introspecting on first use; blocking
pub fn describe(state: &AppState, table: &str) -> Result<CatalogResponse, ApiError> {
    let driver = state.driver()?;
    let metadata = state.catalog().get_or_load(&driver, table)?;
    info!(table = %table, columns = metadata.entries().len(), "Serving catalog");

    let data_model = metadata.data_model();
    let semantic_buckets = metadata
        .semantic_buckets()
        .into_iter()
        .map(|(semantic_type, attrs)| (semantic_type, attrs.into_iter().map(str::to_string).collect()))
        .collect();

    Ok(CatalogResponse {
        metadata: (*metadata).clone(),
        data_model,
        semantic_buckets,
    })
}
