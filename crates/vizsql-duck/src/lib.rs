//! DuckDB driver

use chrono::{DateTime, NaiveDate};
use duckdb::types::{TimeUnit, ValueRef};
use duckdb::{Connection, Result as DuckResult};
use serde_json::Value;
use std::path::Path;
use tracing::debug;
use vizsql_ir::{Driver, DriverError, RowSet};

/// Days from 0001-01-01 (CE day 1) to 1970-01-01
const UNIX_EPOCH_CE_DAYS: i32 = 719_163;

pub struct DuckDriver {
    conn: Connection,
}

impl DuckDriver {
    pub fn in_memory() -> DuckResult<Self> {
        Ok(Self {
            conn: Connection::open_in_memory()?,
        })
    }

    pub fn open(path: impl AsRef<Path>) -> DuckResult<Self> {
        Ok(Self {
            conn: Connection::open(path)?,
        })
    }

    pub fn from_connection(conn: Connection) -> Self {
        Self { conn }
    }

    /// A second driver on the same database
    pub fn try_clone(&self) -> DuckResult<Self> {
        Ok(Self {
            conn: self.conn.try_clone()?,
        })
    }

    /// Get the underlying connection for setup/introspection
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    fn run(&self, sql: &str) -> DuckResult<RowSet> {
        let mut stmt = self.conn.prepare(sql)?;
        let mut rows = stmt.query([])?;

        // column metadata is only available once the statement has run
        let columns: Vec<String> = match rows.as_ref() {
            Some(stmt) => (0..stmt.column_count())
                .map(|i| {
                    stmt.column_name(i)
                        .map(|name| name.to_string())
                        .unwrap_or_else(|_| format!("column{}", i))
                })
                .collect(),
            None => Vec::new(),
        };

        let mut result = Vec::new();
        while let Some(row) = rows.next()? {
            let mut json_row = Vec::with_capacity(columns.len());
            for i in 0..columns.len() {
                json_row.push(to_json(row.get_ref(i)?));
            }
            result.push(json_row);
        }

        Ok(RowSet::new(columns, result))
    }
}

impl Driver for DuckDriver {
    fn query(&self, sql: &str) -> Result<RowSet, DriverError> {
        let rows = self
            .run(sql)
            .map_err(|e| DriverError::Database(e.to_string()))?;
        debug!(rows = rows.row_count(), "DuckDB query returned");
        Ok(rows)
    }
}

fn to_json(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Boolean(b) => Value::Bool(b),
        ValueRef::TinyInt(i) => Value::from(i),
        ValueRef::SmallInt(i) => Value::from(i),
        ValueRef::Int(i) => Value::from(i),
        ValueRef::BigInt(i) => Value::from(i),
        ValueRef::HugeInt(i) => match i64::try_from(i) {
            Ok(i) => Value::from(i),
            Err(_) => Value::from(i as f64),
        },
        ValueRef::UTinyInt(i) => Value::from(i),
        ValueRef::USmallInt(i) => Value::from(i),
        ValueRef::UInt(i) => Value::from(i),
        ValueRef::UBigInt(i) => Value::from(i),
        ValueRef::Float(f) => Value::from(f64::from(f)),
        ValueRef::Double(f) => Value::from(f),
        ValueRef::Decimal(d) => d
            .to_string()
            .parse::<f64>()
            .map(Value::from)
            .unwrap_or(Value::Null),
        ValueRef::Text(bytes) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Date32(days) => NaiveDate::from_num_days_from_ce_opt(days + UNIX_EPOCH_CE_DAYS)
            .map(|date| Value::String(date.to_string()))
            .unwrap_or(Value::Null),
        ValueRef::Timestamp(unit, amount) => {
            let micros = match unit {
                TimeUnit::Second => amount.saturating_mul(1_000_000),
                TimeUnit::Millisecond => amount.saturating_mul(1_000),
                TimeUnit::Microsecond => amount,
                TimeUnit::Nanosecond => amount / 1_000,
            };
            DateTime::from_timestamp_micros(micros)
                .map(|ts| Value::String(ts.naive_utc().to_string()))
                .unwrap_or(Value::Null)
        }
        _ => Value::Null,
    }
}
