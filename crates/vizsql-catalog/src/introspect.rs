//! Schema introspection through information_schema and aggregate queries

use serde_json::Value;
use tracing::{debug, warn};
use vizsql_ir::{Driver, RowSet};

use crate::classify::{classify, ColumnProfile, IdDetector, SemanticType};
use crate::{CatalogError, ColumnCatalogEntry, TableMetadata};

/// Drop a `schema.` prefix; metadata views are keyed by the bare table name
pub fn unqualified_table_name(table: &str) -> &str {
    match table.find('.') {
        Some(idx) => &table[idx + 1..],
        None => table,
    }
}

/// Quote a value as a SQL string literal
fn string_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Table names are spliced into FROM clauses, so only plain dotted identifiers pass
fn check_table_name(table: &str) -> Result<(), CatalogError> {
    let valid = table
        .split('.')
        .all(|part| !part.is_empty() && part.chars().all(|c| c.is_alphanumeric() || c == '_'));
    if valid {
        Ok(())
    } else {
        Err(CatalogError::InvalidTableName(table.to_string()))
    }
}

/// Build the full catalog for one table
///
/// Costs one query per attribute for distinct values and one per quantitative
/// attribute for min/max; types and cardinalities are batched when the
/// backend accepts it.
pub fn introspect(
    driver: &dyn Driver,
    table: &str,
    id_detector: &dyn IdDetector,
) -> Result<TableMetadata, CatalogError> {
    check_table_name(table)?;
    let columns = column_types(driver, table)?;
    let row_count = row_count(driver, table)?;
    let names: Vec<&str> = columns.iter().map(|(name, _)| name.as_str()).collect();
    let cardinalities = cardinalities(driver, table, &names)?;

    let mut entries = Vec::with_capacity(columns.len());
    for ((name, sql_type), cardinality) in columns.into_iter().zip(cardinalities) {
        let distinct_values = distinct_values(driver, table, &name)?;

        let semantic_type = classify(&name, &sql_type, cardinality, || {
            id_detector.is_id_like(&ColumnProfile {
                name: &name,
                cardinality,
                row_count,
                distinct_values: &distinct_values,
            })
        });

        let min_max = if semantic_type == Some(SemanticType::Quantitative) {
            min_max(driver, table, &name)?
        } else {
            None
        };

        debug!(
            table = %table,
            attribute = %name,
            sql_type = %sql_type,
            cardinality,
            semantic_type = ?semantic_type,
            "Catalogued attribute"
        );

        entries.push(ColumnCatalogEntry {
            name,
            sql_type,
            semantic_type,
            cardinality,
            distinct_values,
            min_max,
        });
    }

    Ok(TableMetadata::new(table, row_count, entries))
}

fn run(driver: &dyn Driver, sql: &str) -> Result<RowSet, CatalogError> {
    debug!(sql = %sql, "Introspection query");
    Ok(driver.query(sql)?)
}

fn column_types(driver: &dyn Driver, table: &str) -> Result<Vec<(String, String)>, CatalogError> {
    let name = unqualified_table_name(table);
    let batched = format!(
        "SELECT column_name, data_type FROM information_schema.columns \
         WHERE table_name = {} ORDER BY ordinal_position",
        string_literal(name)
    );

    let columns = match run(driver, &batched) {
        Ok(rows) => rows
            .rows
            .iter()
            .map(|row| Ok((cell_string(row.first())?, cell_string(row.get(1))?)))
            .collect::<Result<Vec<_>, CatalogError>>()?,
        Err(CatalogError::Driver(e)) => {
            warn!(table = %table, error = %e, "Batched type lookup failed, querying per attribute");
            column_types_per_attribute(driver, name)?
        }
        Err(e) => return Err(e),
    };

    if columns.is_empty() {
        return Err(CatalogError::CatalogUnavailable(format!(
            "No columns found for table '{}'",
            table
        )));
    }

    Ok(columns)
}

fn column_types_per_attribute(driver: &dyn Driver, name: &str) -> Result<Vec<(String, String)>, CatalogError> {
    let attr_query = format!(
        "SELECT column_name FROM information_schema.columns \
         WHERE table_name = {} ORDER BY ordinal_position",
        string_literal(name)
    );
    let attributes = run(driver, &attr_query)
        .map_err(|e| CatalogError::CatalogUnavailable(e.to_string()))?;

    let mut columns = Vec::new();
    for row in &attributes.rows {
        let attr = cell_string(row.first())?;
        let type_query = format!(
            "SELECT data_type FROM information_schema.columns \
             WHERE table_name = {} AND column_name = {}",
            string_literal(name),
            string_literal(&attr)
        );
        let rows = run(driver, &type_query)
            .map_err(|e| CatalogError::CatalogUnavailable(e.to_string()))?;
        let sql_type = cell_string(rows.scalar())?;
        columns.push((attr, sql_type));
    }
    Ok(columns)
}

fn row_count(driver: &dyn Driver, table: &str) -> Result<usize, CatalogError> {
    let rows = run(driver, &format!("SELECT COUNT(*) AS count FROM {}", table))?;
    cell_count(rows.scalar())
}

fn cardinalities(driver: &dyn Driver, table: &str, columns: &[&str]) -> Result<Vec<usize>, CatalogError> {
    let select = columns
        .iter()
        .map(|c| format!("COUNT(DISTINCT {c}) AS {c}"))
        .collect::<Vec<_>>()
        .join(", ");
    let batched = format!("SELECT {} FROM {}", select, table);

    match run(driver, &batched) {
        Ok(rows) => {
            if let Some(row) = rows.rows.first().filter(|row| row.len() == columns.len()) {
                return row.iter().map(|v| cell_count(Some(v))).collect();
            }
            warn!(table = %table, "Batched cardinality query returned an unexpected shape");
        }
        Err(CatalogError::Driver(e)) => {
            warn!(table = %table, error = %e, "Batched cardinality query failed, querying per attribute");
        }
        Err(e) => return Err(e),
    }

    columns
        .iter()
        .map(|c| {
            let rows = run(driver, &format!("SELECT COUNT(DISTINCT({})) AS count FROM {}", c, table))?;
            cell_count(rows.scalar())
        })
        .collect()
}

fn distinct_values(driver: &dyn Driver, table: &str, attr: &str) -> Result<Vec<Value>, CatalogError> {
    let rows = run(driver, &format!("SELECT DISTINCT({}) FROM {}", attr, table))?;
    Ok(rows
        .rows
        .into_iter()
        .filter_map(|row| row.into_iter().next())
        .collect())
}

fn min_max(driver: &dyn Driver, table: &str, attr: &str) -> Result<Option<(f64, f64)>, CatalogError> {
    let query = format!(
        "SELECT CAST(MIN({a}) AS DOUBLE PRECISION) AS min, CAST(MAX({a}) AS DOUBLE PRECISION) AS max FROM {t}",
        a = attr,
        t = table
    );
    let rows = run(driver, &query)?;
    let min = rows.rows.first().and_then(|r| r.first()).and_then(Value::as_f64);
    let max = rows.rows.first().and_then(|r| r.get(1)).and_then(Value::as_f64);

    Ok(min.zip(max))
}

fn cell_string(value: Option<&Value>) -> Result<String, CatalogError> {
    match value {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(other) if !other.is_null() => Ok(other.to_string()),
        _ => Err(CatalogError::CatalogUnavailable(
            "Introspection query returned no value".to_string(),
        )),
    }
}

fn cell_count(value: Option<&Value>) -> Result<usize, CatalogError> {
    match value {
        Some(Value::Number(n)) => n
            .as_u64()
            .or_else(|| n.as_f64().map(|f| f as u64))
            .map(|n| n as usize)
            .ok_or_else(|| CatalogError::CatalogUnavailable(format!("Invalid count: {}", n))),
        Some(Value::String(s)) => s
            .parse()
            .map_err(|_| CatalogError::CatalogUnavailable(format!("Invalid count: {}", s))),
        _ => Err(CatalogError::CatalogUnavailable(
            "Count query returned no value".to_string(),
        )),
    }
}
