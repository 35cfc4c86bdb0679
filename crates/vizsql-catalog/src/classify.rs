//! Semantic type classification of SQL columns

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SemanticType {
    Quantitative,
    Ordinal,
    Nominal,
    Temporal,
    Id,
}

impl SemanticType {
    pub const ALL: [SemanticType; 5] = [
        SemanticType::Quantitative,
        SemanticType::Ordinal,
        SemanticType::Nominal,
        SemanticType::Temporal,
        SemanticType::Id,
    ];
}

const NOMINAL_TYPES: &[&str] = &[
    "character",
    "character varying",
    "boolean",
    "uuid",
    "text",
    // DuckDB spellings
    "varchar",
    "char",
    "bpchar",
    "string",
    "bool",
];

const NUMERIC_TYPES: &[&str] = &[
    "integer",
    "numeric",
    "decimal",
    "bigint",
    "real",
    "smallint",
    "smallserial",
    "serial",
    "bigserial",
    // DuckDB spellings
    "int",
    "tinyint",
    "hugeint",
    "utinyint",
    "usmallint",
    "uinteger",
    "ubigint",
    "double",
    "double precision",
    "float",
];

/// Numeric columns with fewer distinct values than this are nominal
pub const NOMINAL_CARDINALITY_THRESHOLD: usize = 13;

/// Lowercase a SQL type name and strip a `(precision, scale)` suffix
pub fn normalize_sql_type(sql_type: &str) -> String {
    let lower = sql_type.trim().to_lowercase();
    match lower.find('(') {
        Some(idx) => lower[..idx].trim_end().to_string(),
        None => lower,
    }
}

pub fn is_numeric_type(sql_type: &str) -> bool {
    NUMERIC_TYPES.contains(&normalize_sql_type(sql_type).as_str())
}

/// Statistics the id heuristic looks at
pub struct ColumnProfile<'a> {
    pub name: &'a str,
    pub cardinality: usize,
    pub row_count: usize,
    pub distinct_values: &'a [Value],
}

/// Decides whether a numeric column is a row identifier
pub trait IdDetector: Send + Sync {
    fn is_id_like(&self, profile: &ColumnProfile<'_>) -> bool;
}

/// Default heuristic: high cardinality, nearly unique, evenly spaced values
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicIdDetector;

impl IdDetector for HeuristicIdDetector {
    fn is_id_like(&self, profile: &ColumnProfile<'_>) -> bool {
        let high_cardinality = profile.cardinality > 500;
        let uniqueness = if profile.name.to_lowercase().contains("id") {
            0.75
        } else {
            0.98
        };
        let almost_unique = profile.cardinality as f64 >= uniqueness * profile.row_count as f64;

        high_cardinality && almost_unique && evenly_spaced(profile.distinct_values)
    }
}

fn evenly_spaced(values: &[Value]) -> bool {
    let mut numbers: Vec<f64> = values.iter().filter_map(Value::as_f64).collect();
    if numbers.len() < values.iter().filter(|v| !v.is_null()).count() {
        return false;
    }
    if numbers.len() < 3 {
        return true;
    }
    numbers.sort_by(f64::total_cmp);
    let step = numbers[1] - numbers[0];
    numbers.windows(2).all(|w| (w[1] - w[0] - step).abs() < 1e-9)
}

/// Classify an attribute; `None` when no rule applies
///
/// Rule order matters: the name-based temporal rule wins over the type.
pub fn classify(
    name: &str,
    sql_type: &str,
    cardinality: usize,
    id_like: impl FnOnce() -> bool,
) -> Option<SemanticType> {
    let lower_name = name.to_lowercase();
    if lower_name == "month" || lower_name == "year" {
        return Some(SemanticType::Temporal);
    }

    let sql_type = normalize_sql_type(sql_type);
    if NOMINAL_TYPES.contains(&sql_type.as_str()) {
        Some(SemanticType::Nominal)
    } else if NUMERIC_TYPES.contains(&sql_type.as_str()) {
        if cardinality < NOMINAL_CARDINALITY_THRESHOLD {
            Some(SemanticType::Nominal)
        } else if id_like() {
            Some(SemanticType::Id)
        } else {
            Some(SemanticType::Quantitative)
        }
    } else if sql_type.contains("time") || sql_type.contains("date") {
        Some(SemanticType::Temporal)
    } else {
        None
    }
}
