//! SQL dialect registry
//!
//! The fixed query shapes only need a handful of backend-specific spellings:
//! aggregate function names, the random-ordering function, and whether an
//! equal-width bucket function exists. Each dialect records those once.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;
use vizsql_ir::Aggregation;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Dialect not found: {0}")]
    DialectNotFound(String),

    #[error("Aggregate {func:?} not supported by dialect {dialect}")]
    FunctionNotFound { dialect: String, func: Aggregation },
}

/// How a backend assigns rows to equal-width buckets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BucketCapability {
    /// `width_bucket(value, thresholds)` is available
    NativeWidthBucket,
    /// Bucket index computed with `FLOOR` arithmetic
    Arithmetic,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dialect {
    pub name: String,
    pub random_function: String,
    pub bucket: BucketCapability,
    aggregates: HashMap<Aggregation, String>,
}

impl Dialect {
    pub fn new(name: impl Into<String>, random_function: impl Into<String>, bucket: BucketCapability) -> Self {
        let aggregates = [
            (Aggregation::Mean, "AVG"),
            (Aggregation::Sum, "SUM"),
            (Aggregation::Max, "MAX"),
            (Aggregation::Count, "COUNT"),
        ]
        .into_iter()
        .map(|(agg, func)| (agg, func.to_string()))
        .collect();

        Self {
            name: name.into(),
            random_function: random_function.into(),
            bucket,
            aggregates,
        }
    }

    /// SQL function implementing an aggregation
    pub fn aggregate_function(&self, agg: Aggregation) -> Result<&str, RegistryError> {
        self.aggregates
            .get(&agg)
            .map(String::as_str)
            .ok_or_else(|| RegistryError::FunctionNotFound {
                dialect: self.name.clone(),
                func: agg,
            })
    }

    pub fn with_aggregate(mut self, agg: Aggregation, func: impl Into<String>) -> Self {
        self.aggregates.insert(agg, func.into());
        self
    }

    pub fn without_aggregate(mut self, agg: Aggregation) -> Self {
        self.aggregates.remove(&agg);
        self
    }

    pub fn postgres() -> Self {
        Self::new("postgres", "random", BucketCapability::NativeWidthBucket)
    }

    pub fn duckdb() -> Self {
        Self::new("duckdb", "random", BucketCapability::Arithmetic)
    }
}

pub struct DialectRegistry {
    dialects: HashMap<String, Dialect>,
    version: String,
}

impl DialectRegistry {
    pub fn new(version: impl Into<String>) -> Self {
        let mut registry = Self {
            dialects: HashMap::new(),
            version: version.into(),
        };
        registry.register_builtins();
        registry
    }

    fn register_builtins(&mut self) {
        self.register(Dialect::postgres());
        self.register(Dialect::duckdb());
    }

    pub fn register(&mut self, dialect: Dialect) {
        self.dialects.insert(dialect.name.to_lowercase(), dialect);
    }

    pub fn lookup(&self, name: &str) -> Result<&Dialect, RegistryError> {
        self.dialects
            .get(&name.to_lowercase())
            .ok_or_else(|| RegistryError::DialectNotFound(name.to_string()))
    }

    pub fn version(&self) -> &str {
        &self.version
    }
}

impl Default for DialectRegistry {
    fn default() -> Self {
        Self::new("0.1.0")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_lookup() {
        let registry = DialectRegistry::default();

        let pg = registry.lookup("Postgres").unwrap();
        assert_eq!(pg.bucket, BucketCapability::NativeWidthBucket);
        assert_eq!(pg.random_function, "random");

        let duck = registry.lookup("duckdb").unwrap();
        assert_eq!(duck.bucket, BucketCapability::Arithmetic);
    }

    #[test]
    fn test_aggregate_lookup() {
        let dialect = Dialect::duckdb();
        assert_eq!(dialect.aggregate_function(Aggregation::Mean).unwrap(), "AVG");
        assert_eq!(dialect.aggregate_function(Aggregation::Max).unwrap(), "MAX");

        let trimmed = dialect.without_aggregate(Aggregation::Max);
        assert!(matches!(
            trimmed.aggregate_function(Aggregation::Max),
            Err(RegistryError::FunctionNotFound { .. })
        ));
    }

    #[test]
    fn test_unknown_dialect() {
        let registry = DialectRegistry::default();
        assert!(matches!(registry.lookup("oracle"), Err(RegistryError::DialectNotFound(_))));
    }
}
