//! Driver trait for executing SQL text against a backend

use std::sync::Mutex;
use thiserror::Error;

use crate::RowSet;

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("No response registered for query: {0}")]
    Unexpected(String),
}

/// Executes SQL and returns named-column rows
///
/// Connection lifecycle is owned by the implementor; callers never retry.
pub trait Driver {
    fn query(&self, sql: &str) -> Result<RowSet, DriverError>;
}

impl<D: Driver + ?Sized> Driver for &D {
    fn query(&self, sql: &str) -> Result<RowSet, DriverError> {
        (**self).query(sql)
    }
}

/// Scripted driver for tests
///
/// Answers are matched against the SQL text, exact matches first, then the
/// longest registered prefix. Every statement is recorded.
#[derive(Default)]
pub struct MockDriver {
    responses: Vec<(String, Result<RowSet, String>)>,
    log: Mutex<Vec<String>>,
}

impl MockDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&mut self, sql: impl Into<String>, rows: RowSet) {
        self.responses.push((sql.into(), Ok(rows)));
    }

    pub fn fail(&mut self, sql: impl Into<String>, message: impl Into<String>) {
        self.responses.push((sql.into(), Err(message.into())));
    }

    /// Statements seen so far, in order
    pub fn statements(&self) -> Vec<String> {
        self.log.lock().map(|log| log.clone()).unwrap_or_default()
    }
}

impl Driver for MockDriver {
    fn query(&self, sql: &str) -> Result<RowSet, DriverError> {
        if let Ok(mut log) = self.log.lock() {
            log.push(sql.to_string());
        }

        let response = self
            .responses
            .iter()
            .find(|(key, _)| key == sql)
            .or_else(|| {
                self.responses
                    .iter()
                    .filter(|(key, _)| sql.starts_with(key.as_str()))
                    .max_by_key(|(key, _)| key.len())
            })
            .map(|(_, response)| response)
            .ok_or_else(|| DriverError::Unexpected(sql.to_string()))?;

        match response {
            Ok(rows) => Ok(rows.clone()),
            Err(message) => Err(DriverError::Database(message.clone())),
        }
    }
}
