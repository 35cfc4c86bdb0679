//! Executor - runs visualization intents against a dataset
//!
//! Manages:
//! - Metadata lookup through the shared catalog
//! - Compilation to one of the fixed query shapes
//! - Count-then-fetch for projections
//! - Result shaping and repair

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, info};
use vizsql_catalog::{CatalogError, MetadataCatalog, TableMetadata};
use vizsql_compile::{CompileError, CompiledQuery, QueryCompiler, QueryPlan, SkipReason};
use vizsql_ir::{Driver, DriverError, QueryShape, RowSet, VisualizationIntent};

pub mod normalize;

pub use normalize::{normalize_aggregation, normalize_histogram, normalize_projection, Normalized};

#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("Reconciliation mismatch on {attribute}: {detail}")]
    ReconciliationMismatch { attribute: String, detail: String },

    #[error("Expected column missing from result: {0}")]
    MissingColumn(String),

    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Driver(#[from] DriverError),
}

/// A table reachable through a driver, with its metadata cache
pub struct Dataset<'a> {
    table: String,
    driver: &'a dyn Driver,
    catalog: &'a MetadataCatalog,
}

impl<'a> Dataset<'a> {
    pub fn new(table: impl Into<String>, driver: &'a dyn Driver, catalog: &'a MetadataCatalog) -> Self {
        Self {
            table: table.into(),
            driver,
            catalog,
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn driver(&self) -> &dyn Driver {
        self.driver
    }

    pub fn metadata(&self) -> Result<Arc<TableMetadata>, CatalogError> {
        self.catalog.get_or_load(self.driver, &self.table)
    }

    fn fetch(&self, query: &CompiledQuery) -> Result<RowSet, ExecutionError> {
        debug!(table = %self.table, sql = %query.sql, "Executing SQL");
        Ok(self.driver.query(&query.sql)?)
    }
}

/// What happened to one intent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    Executed {
        shape: QueryShape,
        sql: String,
        rows: usize,
        backfilled: usize,
    },
    Skipped {
        reason: SkipReason,
    },
}

impl Outcome {
    pub fn is_skipped(&self) -> bool {
        matches!(self, Outcome::Skipped { .. })
    }
}

pub struct Executor {
    compiler: QueryCompiler,
}

impl Executor {
    pub fn new(compiler: QueryCompiler) -> Self {
        Self { compiler }
    }

    pub fn compiler(&self) -> &QueryCompiler {
        &self.compiler
    }

    /// Execute intents in order, stopping at the first error
    pub fn execute(
        &self,
        dataset: &Dataset<'_>,
        intents: &mut [VisualizationIntent],
    ) -> Result<Vec<Outcome>, ExecutionError> {
        intents
            .iter_mut()
            .map(|intent| self.execute_intent(dataset, intent))
            .collect()
    }

    /// Compile, run and normalize one intent, writing the table to `intent.data`
    ///
    /// Skipped intents keep whatever data they had.
    pub fn execute_intent(
        &self,
        dataset: &Dataset<'_>,
        intent: &mut VisualizationIntent,
    ) -> Result<Outcome, ExecutionError> {
        let started = Instant::now();
        let metadata = dataset.metadata()?;
        let plan = self.compiler.plan(intent, dataset.table(), &metadata)?;

        let (shape, sql, normalized) = match plan {
            QueryPlan::Skip(reason) => {
                info!(
                    table = %dataset.table(),
                    mark = ?intent.mark,
                    reason = ?reason,
                    "Intent skipped"
                );
                return Ok(Outcome::Skipped { reason });
            }
            QueryPlan::Projection(plan) => {
                let counted = dataset.fetch(&plan.count_query)?;
                let row_count = counted
                    .scalar()
                    .and_then(|v| v.as_u64())
                    .ok_or_else(|| ExecutionError::MissingColumn("count".to_string()))?
                    as usize;
                if plan.is_sampled(row_count) {
                    debug!(row_count, limit = plan.sample_limit(), "Sampling projection");
                }

                let query = plan.finish(row_count);
                let rows = dataset.fetch(&query)?;
                let table = normalize_projection(rows, &query.columns)?;
                (
                    QueryShape::Projection,
                    query.sql,
                    Normalized { table, backfilled: 0 },
                )
            }
            QueryPlan::Aggregation(plan) => {
                let rows = dataset.fetch(&plan.query)?;
                let key_domain = metadata.distinct_values(&plan.key)?;
                let color_domain = plan
                    .color
                    .as_deref()
                    .map(|c| metadata.distinct_values(c))
                    .transpose()?;
                let normalized = normalize_aggregation(rows, &plan, key_domain, color_domain)?;
                (QueryShape::Aggregation, plan.query.sql, normalized)
            }
            QueryPlan::Histogram(plan) => {
                let rows = dataset.fetch(&plan.query)?;
                let normalized = normalize_histogram(rows, &plan)?;
                (QueryShape::Histogram, plan.query.sql, normalized)
            }
        };

        let rows = normalized.table.row_count();
        info!(
            table = %dataset.table(),
            shape = shape.as_str(),
            rows,
            backfilled = normalized.backfilled,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Intent executed"
        );
        intent.data = Some(normalized.table);

        Ok(Outcome::Executed {
            shape,
            sql,
            rows,
            backfilled: normalized.backfilled,
        })
    }
}
