//! Metadata Catalog - column types and statistics inferred from the database
//!
//! Nothing is materialized locally: names and SQL types come from
//! information_schema, statistics from aggregate queries. A table is
//! introspected once and then served from the `MetadataCatalog` cache.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};
use thiserror::Error;
use tracing::info;
use vizsql_ir::{Driver, DriverError};

pub mod classify;
pub mod introspect;

pub use classify::{classify, HeuristicIdDetector, IdDetector, SemanticType};
pub use introspect::{introspect, unqualified_table_name};

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Catalog unavailable: {0}")]
    CatalogUnavailable(String),

    #[error("Attribute not found: {0}")]
    UnknownAttribute(String),

    #[error("Invalid table name: {0}")]
    InvalidTableName(String),

    #[error("{operation} not applicable to {attribute} ({semantic_type:?})")]
    NotApplicable {
        operation: &'static str,
        attribute: String,
        semantic_type: Option<SemanticType>,
    },

    #[error("No values to compute a range for {0}")]
    EmptyDomain(String),

    #[error(transparent)]
    Driver(#[from] DriverError),
}

/// Everything known about one attribute
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnCatalogEntry {
    pub name: String,
    pub sql_type: String,
    pub semantic_type: Option<SemanticType>,
    pub cardinality: usize,
    pub distinct_values: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_max: Option<(f64, f64)>,
}

/// Measures and dimensions of a table
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataModel {
    pub measure: Vec<String>,
    pub dimension: Vec<String>,
}

/// Catalog of a single table; read-only once built
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableMetadata {
    table: String,
    row_count: usize,
    columns: Vec<ColumnCatalogEntry>,
}

impl TableMetadata {
    pub fn new(table: impl Into<String>, row_count: usize, columns: Vec<ColumnCatalogEntry>) -> Self {
        Self {
            table: table.into(),
            row_count,
            columns,
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn row_count(&self) -> usize {
        self.row_count
    }

    pub fn entries(&self) -> &[ColumnCatalogEntry] {
        &self.columns
    }

    pub fn entry(&self, attr: &str) -> Result<&ColumnCatalogEntry, CatalogError> {
        self.columns
            .iter()
            .find(|c| c.name == attr)
            .ok_or_else(|| CatalogError::UnknownAttribute(attr.to_string()))
    }

    /// Attribute names in table order
    pub fn columns(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// SQL type name as reported by the backend
    pub fn data_type(&self, attr: &str) -> Result<&str, CatalogError> {
        Ok(&self.entry(attr)?.sql_type)
    }

    pub fn semantic_type(&self, attr: &str) -> Result<Option<SemanticType>, CatalogError> {
        Ok(self.entry(attr)?.semantic_type)
    }

    pub fn cardinality(&self, attr: &str) -> Result<usize, CatalogError> {
        Ok(self.entry(attr)?.cardinality)
    }

    /// Authoritative value domain; order not significant
    pub fn distinct_values(&self, attr: &str) -> Result<&[Value], CatalogError> {
        Ok(&self.entry(attr)?.distinct_values)
    }

    pub fn min_max(&self, attr: &str) -> Result<(f64, f64), CatalogError> {
        let entry = self.entry(attr)?;
        if entry.semantic_type != Some(SemanticType::Quantitative) {
            return Err(CatalogError::NotApplicable {
                operation: "min/max",
                attribute: attr.to_string(),
                semantic_type: entry.semantic_type,
            });
        }
        entry
            .min_max
            .ok_or_else(|| CatalogError::EmptyDomain(attr.to_string()))
    }

    /// True when every non-null distinct value is an integer
    pub fn is_integer_domain(&self, attr: &str) -> Result<bool, CatalogError> {
        let values = self.distinct_values(attr)?;
        Ok(values
            .iter()
            .filter(|v| !v.is_null())
            .all(|v| v.is_i64() || v.is_u64()))
    }

    pub fn unique_values(&self) -> BTreeMap<&str, &[Value]> {
        self.columns
            .iter()
            .map(|c| (c.name.as_str(), c.distinct_values.as_slice()))
            .collect()
    }

    pub fn min_max_lookup(&self) -> BTreeMap<&str, (f64, f64)> {
        self.columns
            .iter()
            .filter_map(|c| c.min_max.map(|mm| (c.name.as_str(), mm)))
            .collect()
    }

    pub fn cardinality_lookup(&self) -> BTreeMap<&str, usize> {
        self.columns
            .iter()
            .map(|c| (c.name.as_str(), c.cardinality))
            .collect()
    }

    /// Attribute -> semantic type; unclassified attributes are absent
    pub fn data_type_lookup(&self) -> BTreeMap<&str, SemanticType> {
        self.columns
            .iter()
            .filter_map(|c| c.semantic_type.map(|t| (c.name.as_str(), t)))
            .collect()
    }

    /// Semantic type -> attributes, every bucket present even when empty
    pub fn semantic_buckets(&self) -> BTreeMap<SemanticType, Vec<&str>> {
        let mut buckets: BTreeMap<SemanticType, Vec<&str>> =
            SemanticType::ALL.iter().map(|t| (*t, Vec::new())).collect();
        for column in &self.columns {
            if let Some(t) = column.semantic_type {
                buckets.entry(t).or_default().push(&column.name);
            }
        }
        buckets
    }

    pub fn data_model(&self) -> DataModel {
        let buckets = self.semantic_buckets();
        let names = |t: SemanticType| -> Vec<String> {
            buckets
                .get(&t)
                .map(|v| v.iter().map(|s| s.to_string()).collect())
                .unwrap_or_default()
        };

        let mut dimension = names(SemanticType::Ordinal);
        dimension.extend(names(SemanticType::Nominal));
        dimension.extend(names(SemanticType::Temporal));

        DataModel {
            measure: names(SemanticType::Quantitative),
            dimension,
        }
    }
}

/// Lazily populated, per-table metadata cache
///
/// Loading runs outside the lock; when two callers race on first use both
/// compute the same metadata and the first one stored is kept.
pub struct MetadataCatalog {
    tables: RwLock<HashMap<String, Arc<TableMetadata>>>,
    id_detector: Box<dyn IdDetector>,
}

impl MetadataCatalog {
    pub fn new() -> Self {
        Self::with_id_detector(HeuristicIdDetector)
    }

    pub fn with_id_detector(id_detector: impl IdDetector + 'static) -> Self {
        Self {
            tables: RwLock::new(HashMap::new()),
            id_detector: Box::new(id_detector),
        }
    }

    pub fn get(&self, table: &str) -> Option<Arc<TableMetadata>> {
        self.tables
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(table)
            .cloned()
    }

    /// Store metadata unless an entry already exists; returns the cached entry
    pub fn insert(&self, metadata: TableMetadata) -> Arc<TableMetadata> {
        let mut tables = self.tables.write().unwrap_or_else(|e| e.into_inner());
        tables
            .entry(metadata.table.clone())
            .or_insert_with(|| Arc::new(metadata))
            .clone()
    }

    /// Cached metadata for `table`, introspecting it on first use
    pub fn get_or_load(&self, driver: &dyn Driver, table: &str) -> Result<Arc<TableMetadata>, CatalogError> {
        if let Some(metadata) = self.get(table) {
            return Ok(metadata);
        }

        let metadata = introspect(driver, table, self.id_detector.as_ref())?;
        info!(
            table = %table,
            columns = metadata.columns.len(),
            rows = metadata.row_count,
            "Table metadata computed"
        );
        Ok(self.insert(metadata))
    }

    pub fn invalidate(&self, table: &str) -> bool {
        self.tables
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(table)
            .is_some()
    }
}

impl Default for MetadataCatalog {
    fn default() -> Self {
        Self::new()
    }
}
