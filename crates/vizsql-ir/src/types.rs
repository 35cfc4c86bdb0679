//! Tabular types shared by the driver and the normalizer

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;

/// Raw row set as returned by a driver
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RowSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl RowSet {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        Self { columns, rows }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Index of a column, matched case-insensitively
    ///
    /// Backends that fold unquoted identifiers (Postgres lowercases them)
    /// return aliases in a different case than they were written.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c == name)
            .or_else(|| self.columns.iter().position(|c| c.eq_ignore_ascii_case(name)))
    }

    /// First cell of the first row, for scalar queries
    pub fn scalar(&self) -> Option<&Value> {
        self.rows.first().and_then(|row| row.first())
    }
}

/// Normalized result: named columns and rows in final order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl ResultTable {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Values of one column, top to bottom
    pub fn column(&self, name: &str) -> Option<Vec<&Value>> {
        let idx = self.column_index(name)?;
        Some(self.rows.iter().map(|row| &row[idx]).collect())
    }

    pub fn get(&self, row: usize, name: &str) -> Option<&Value> {
        let idx = self.column_index(name)?;
        self.rows.get(row).and_then(|r| r.get(idx))
    }

    /// Rows as name -> value records
    pub fn records(&self) -> Vec<serde_json::Map<String, Value>> {
        self.rows
            .iter()
            .map(|row| {
                self.columns
                    .iter()
                    .cloned()
                    .zip(row.iter().cloned())
                    .collect()
            })
            .collect()
    }

    /// Stable sort by the given columns, ascending
    pub fn sort_by_columns(&mut self, names: &[&str]) {
        let indices: Vec<usize> = names.iter().filter_map(|n| self.column_index(n)).collect();
        self.rows.sort_by(|a, b| {
            indices
                .iter()
                .map(|&i| compare_values(&a[i], &b[i]))
                .find(|ord| *ord != Ordering::Equal)
                .unwrap_or(Ordering::Equal)
        });
    }
}

/// Serialized as `{columns, rows: [records], row_count}`
impl Serialize for ResultTable {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeStruct;

        let mut state = serializer.serialize_struct("ResultTable", 3)?;
        state.serialize_field("columns", &self.columns)?;
        state.serialize_field("rows", &self.records())?;
        state.serialize_field("row_count", &self.rows.len())?;
        state.end()
    }
}

impl<'de> Deserialize<'de> for ResultTable {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        struct Records {
            columns: Vec<String>,
            rows: Vec<serde_json::Map<String, Value>>,
        }

        let records = Records::deserialize(deserializer)?;
        let rows = records
            .rows
            .into_iter()
            .map(|mut record| {
                records
                    .columns
                    .iter()
                    .map(|c| record.remove(c).unwrap_or(Value::Null))
                    .collect()
            })
            .collect();

        Ok(ResultTable {
            columns: records.columns,
            rows,
        })
    }
}

fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

/// Total order over cell values: null < bool < number < string < other
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => {
            let (x, y) = (x.as_f64().unwrap_or(0.0), y.as_f64().unwrap_or(0.0));
            x.total_cmp(&y)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Array(_), Value::Array(_)) | (Value::Object(_), Value::Object(_)) => {
            a.to_string().cmp(&b.to_string())
        }
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

/// Canonical key for matching cell values across result sets
///
/// Numbers compare by value, so `1` and `1.0` share a key.
pub fn value_key(value: &Value) -> String {
    match value {
        Value::Number(n) => match n.as_f64() {
            Some(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("n:{}", f as i64),
            Some(f) => format!("n:{}", f),
            None => format!("n:{}", n),
        },
        Value::String(s) => format!("s:{}", s),
        other => other.to_string(),
    }
}
