//! Compiler - transforms visualization intents to SQL
//!
//! Filters become a conjunctive WHERE fragment; the intent's mark selects one
//! of the fixed query shapes. Compilation never touches the database: the
//! only inputs are the intent, the table name and its cached metadata.

use thiserror::Error;
use vizsql_catalog::CatalogError;
use vizsql_registry::RegistryError;

pub mod bins;
pub mod bucket;
pub mod filter;
pub mod query;

pub use bins::{BinEdges, MAX_BINS};
pub use bucket::{ArithmeticBucket, BucketStrategy, NativeWidthBucket};
pub use filter::{compile_filters, compile_filters_with, FilterPredicate, LiteralQuoting};
pub use query::{
    AggregationPlan, CompileOptions, CompiledQuery, HistogramPlan, ProjectionPlan, QueryCompiler, QueryPlan,
    SkipReason, DEFAULT_SAMPLE_LIMIT, HISTOGRAM_COUNT_COLUMN,
};

#[derive(Debug, Error)]
pub enum CompileError {
    #[error("Malformed intent: {0}")]
    MalformedIntent(String),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}
