//! vizsql HTTP server
//!
//! Accepts visualization intents as JSON, compiles them to SQL, runs them
//! against DuckDB and returns the normalized result tables.

use std::sync::Arc;
use tracing::info;
use vizsql_compile::QueryCompiler;
use vizsql_duck::DuckDriver;
use vizsql_exec::Executor;
use vizsql_registry::DialectRegistry;

mod catalog;
mod config;
mod logging;
mod metrics;
mod query;
mod routes;

use config::{Config, ConfigError};

const CONFIG_FILE: &str = "config.yaml";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let config = match Config::load(CONFIG_FILE) {
        Ok(config) => config,
        Err(ConfigError::Io(_)) => Config::from_env()?,
        Err(e) => return Err(e.into()),
    };
    config.apply_logging_env();
    logging::init();

    let registry = DialectRegistry::default();
    let dialect = config.database.dialect(&registry)?;
    info!(dialect = %dialect.name, registry_version = %registry.version(), "Dialect selected");

    let driver = match &config.database.path {
        Some(path) => DuckDriver::open(path)?,
        None => DuckDriver::in_memory()?,
    };
    info!(
        database = config.database.path.as_deref().unwrap_or(":memory:"),
        default_table = ?config.database.table,
        "Database opened"
    );

    let executor = Executor::new(QueryCompiler::new(dialect, config.compile.options()));
    let state = Arc::new(routes::AppState::new(driver, executor, config.database.table.clone())?);
    let app = routes::router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("vizsql server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
