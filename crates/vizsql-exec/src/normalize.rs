//! Result Normalizer - raw row sets to canonical result tables
//!
//! Columns are addressed by name throughout. Missing groups and buckets are
//! repaired from already-fetched rows and the catalog's distinct-value
//! domains; nothing here queries the database.

use serde_json::{json, Value};
use std::collections::HashSet;
use tracing::warn;
use vizsql_compile::{AggregationPlan, HistogramPlan, HISTOGRAM_COUNT_COLUMN};
use vizsql_ir::{value_key, ResultTable, RowSet};

use crate::ExecutionError;

/// A normalized table and how many rows were synthesized
#[derive(Debug, Clone, PartialEq)]
pub struct Normalized {
    pub table: ResultTable,
    pub backfilled: usize,
}

fn require_column(rows: &RowSet, name: &str) -> Result<usize, ExecutionError> {
    rows.column_index(name)
        .ok_or_else(|| ExecutionError::MissingColumn(name.to_string()))
}

/// Column `name`, or else the only column not already claimed
///
/// Count columns come back under backend-chosen names (`count`,
/// `count(origin)`, ...) when an alias is not honored.
fn resolve_remaining(rows: &RowSet, name: &str, claimed: &[usize]) -> Result<usize, ExecutionError> {
    if let Some(idx) = rows.column_index(name) {
        return Ok(idx);
    }
    let remaining: Vec<usize> = (0..rows.columns.len())
        .filter(|i| !claimed.contains(i))
        .collect();
    match remaining.as_slice() {
        [idx] => Ok(*idx),
        _ => Err(ExecutionError::MissingColumn(name.to_string())),
    }
}

/// Keep the expected columns, under their canonical names
pub fn normalize_projection(rows: RowSet, columns: &[String]) -> Result<ResultTable, ExecutionError> {
    let indices = columns
        .iter()
        .map(|c| require_column(&rows, c))
        .collect::<Result<Vec<_>, _>>()?;

    let mut table = ResultTable::new(columns.to_vec());
    table.rows = rows
        .rows
        .into_iter()
        .map(|row| indices.iter().map(|&i| row.get(i).cloned().unwrap_or(Value::Null)).collect())
        .collect();
    Ok(table)
}

/// Reshape a grouped aggregation to `(key, [color], measure)` and back-fill
/// every key x color combination the database left out with a zero measure
///
/// Fetched measures are kept as returned, NULL included.
pub fn normalize_aggregation(
    rows: RowSet,
    plan: &AggregationPlan,
    key_domain: &[Value],
    color_domain: Option<&[Value]>,
) -> Result<Normalized, ExecutionError> {
    let key_idx = require_column(&rows, &plan.key)?;
    let color_idx = plan
        .color
        .as_deref()
        .map(|c| require_column(&rows, c))
        .transpose()?;
    let mut claimed = vec![key_idx];
    claimed.extend(color_idx);
    let measure_idx = resolve_remaining(&rows, &plan.measure, &claimed)?;

    let mut columns = vec![plan.key.clone()];
    columns.extend(plan.color.iter().cloned());
    columns.push(plan.measure.clone());
    let mut table = ResultTable::new(columns);

    let colors: Vec<Option<&Value>> = match color_domain {
        Some(values) => values.iter().map(Some).collect(),
        None => vec![None],
    };
    let combo = |key: &Value, color: Option<&Value>| -> (String, Option<String>) {
        (value_key(key), color.map(value_key))
    };

    let domain: HashSet<(String, Option<String>)> = key_domain
        .iter()
        .flat_map(|k| colors.iter().map(move |&c| combo(k, c)))
        .collect();
    let expected = key_domain.len() * colors.len();
    let mismatch = |detail: String| ExecutionError::ReconciliationMismatch {
        attribute: match &plan.color {
            Some(color) => format!("{}, {}", plan.key, color),
            None => plan.key.clone(),
        },
        detail,
    };

    let mut seen: HashSet<(String, Option<String>)> = HashSet::new();
    for row in rows.rows {
        let key = row.get(key_idx).cloned().unwrap_or(Value::Null);
        let color = color_idx.map(|i| row.get(i).cloned().unwrap_or(Value::Null));
        let id = combo(&key, color.as_ref());

        if !domain.contains(&id) {
            return Err(mismatch(format!(
                "group {} is not in the catalogued domain",
                describe(&key, color.as_ref())
            )));
        }
        if !seen.insert(id) {
            return Err(mismatch(format!(
                "group {} returned more than once",
                describe(&key, color.as_ref())
            )));
        }

        let measure = row.get(measure_idx).cloned().unwrap_or(Value::Null);
        let mut out = vec![key];
        out.extend(color);
        out.push(measure);
        table.rows.push(out);
    }

    let mut backfilled = 0;
    if table.rows.len() < expected {
        for key in key_domain {
            for &color in &colors {
                if seen.contains(&combo(key, color)) {
                    continue;
                }
                let mut out = vec![key.clone()];
                out.extend(color.cloned());
                out.push(json!(0));
                table.rows.push(out);
                backfilled += 1;
            }
        }
        warn!(
            key = %plan.key,
            color = ?plan.color,
            backfilled,
            "Back-filled groups missing from the aggregation result"
        );
    }

    if table.rows.len() != expected {
        return Err(mismatch(format!(
            "expected {} rows after repair, got {}",
            expected,
            table.rows.len()
        )));
    }

    let mut order = vec![plan.key.as_str()];
    order.extend(plan.color.as_deref());
    table.sort_by_columns(&order);

    Ok(Normalized { table, backfilled })
}

/// Counts per bucket as `(center, count)`, zero for empty buckets
pub fn normalize_histogram(rows: RowSet, plan: &HistogramPlan) -> Result<Normalized, ExecutionError> {
    let bucket_idx = require_column(&rows, "bucket")?;
    let count_idx = resolve_remaining(&rows, "count", &[bucket_idx])?;

    let centers = plan.centers();
    let mut counts: Vec<Option<u64>> = vec![None; centers.len()];

    for row in &rows.rows {
        let bucket = match row.get(bucket_idx).and_then(Value::as_f64) {
            Some(b) => b,
            // rows whose binned value is NULL fall in no bucket
            None => continue,
        };
        if bucket < 0.0 || bucket as usize >= centers.len() {
            return Err(ExecutionError::ReconciliationMismatch {
                attribute: plan.attribute.clone(),
                detail: format!("bucket index {} outside 0..{}", bucket, centers.len()),
            });
        }
        let count = row.get(count_idx).and_then(Value::as_u64).unwrap_or(0);
        let slot = counts[bucket as usize].get_or_insert(0);
        *slot += count;
    }

    let backfilled = counts.iter().filter(|c| c.is_none()).count();
    if backfilled > 0 {
        warn!(
            attribute = %plan.attribute,
            backfilled,
            "Back-filled empty histogram buckets"
        );
    }

    let mut table = ResultTable::new(vec![plan.attribute.clone(), HISTOGRAM_COUNT_COLUMN.to_string()]);
    table.rows = centers
        .iter()
        .zip(counts)
        .map(|(center, count)| {
            let center = if plan.bins.integer_domain {
                json!(*center as i64)
            } else {
                json!(center)
            };
            vec![center, json!(count.unwrap_or(0))]
        })
        .collect();

    Ok(Normalized { table, backfilled })
}

fn describe(key: &Value, color: Option<&Value>) -> String {
    match color {
        Some(color) => format!("({}, {})", key, color),
        None => key.to_string(),
    }
}
