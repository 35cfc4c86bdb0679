//! End-to-end intent execution against an in-memory DuckDB

use serde_json::json;
use vizsql_catalog::{MetadataCatalog, SemanticType};
use vizsql_compile::{CompileOptions, LiteralQuoting, QueryCompiler};
use vizsql_duck::DuckDriver;
use vizsql_exec::{Dataset, ExecutionError, Executor, Outcome};
use vizsql_ir::{Aggregation, Channel, Clause, FilterOp, Mark, QueryShape, VisualizationIntent, RECORD};
use vizsql_registry::{DialectRegistry, RegistryError};

/// 101 cars: origin and cylinders both cycle with `i % 3`, horsepower is `i`
fn cars() -> Result<DuckDriver, Box<dyn std::error::Error>> {
    let driver = DuckDriver::in_memory()?;
    driver.connection().execute_batch(
        "CREATE TABLE cars AS
         SELECT CASE i % 3 WHEN 0 THEN 'USA' WHEN 1 THEN 'Europe' ELSE 'Japan' END AS origin,
                4 + (i % 3) * 2 AS cylinders,
                i AS horsepower
         FROM range(0, 101) t(i);",
    )?;
    Ok(driver)
}

fn executor(options: CompileOptions) -> Result<Executor, RegistryError> {
    let dialect = DialectRegistry::default().lookup("duckdb")?.clone();
    Ok(Executor::new(QueryCompiler::new(dialect, options)))
}

#[test]
fn test_catalog_classifies_columns() -> Result<(), Box<dyn std::error::Error>> {
    let driver = cars()?;
    let catalog = MetadataCatalog::new();
    let dataset = Dataset::new("cars", &driver, &catalog);
    let meta = dataset.metadata()?;

    assert_eq!(meta.row_count(), 101);
    assert_eq!(meta.semantic_type("origin")?, Some(SemanticType::Nominal));
    assert_eq!(meta.semantic_type("cylinders")?, Some(SemanticType::Nominal));
    assert_eq!(meta.semantic_type("horsepower")?, Some(SemanticType::Quantitative));
    assert_eq!(meta.cardinality("origin")?, 3);
    assert_eq!(meta.min_max("horsepower")?, (0.0, 100.0));
    assert!(meta.is_integer_domain("horsepower")?);
    Ok(())
}

#[test]
fn test_filtered_bar_backfills_cylinders() -> Result<(), Box<dyn std::error::Error>> {
    let driver = cars()?;
    let catalog = MetadataCatalog::new();
    let dataset = Dataset::new("cars", &driver, &catalog);

    let mut intent = VisualizationIntent::new(
        Mark::Bar,
        vec![
            Clause::attribute("cylinders").on(Channel::X),
            Clause::attribute(RECORD).on(Channel::Y).aggregate(Aggregation::Count),
            Clause::filter("origin", FilterOp::Eq, "USA"),
        ],
    );
    let outcome = executor(CompileOptions::default())?.execute_intent(&dataset, &mut intent)?;

    assert!(matches!(outcome, Outcome::Executed { backfilled: 2, rows: 3, .. }));
    let data = intent.data.ok_or("no data")?;
    assert_eq!(data.columns, vec!["cylinders", "Record"]);
    assert_eq!(
        data.rows,
        vec![
            vec![json!(4), json!(34)],
            vec![json!(6), json!(0)],
            vec![json!(8), json!(0)],
        ]
    );
    Ok(())
}

#[test]
fn test_color_split_covers_full_domain() -> Result<(), Box<dyn std::error::Error>> {
    let driver = cars()?;
    let catalog = MetadataCatalog::new();
    let dataset = Dataset::new("cars", &driver, &catalog);

    let mut intent = VisualizationIntent::new(
        Mark::Bar,
        vec![
            Clause::attribute("origin").on(Channel::X),
            Clause::attribute("horsepower").on(Channel::Y).aggregate(Aggregation::Mean),
            Clause::attribute("cylinders").on(Channel::Color),
        ],
    );
    executor(CompileOptions::default())?.execute_intent(&dataset, &mut intent)?;

    let data = intent.data.ok_or("no data")?;
    assert_eq!(data.columns, vec!["origin", "cylinders", "horsepower"]);
    assert_eq!(data.row_count(), 9);
    // sorted by origin, then cylinders
    assert_eq!(data.rows[0], vec![json!("Europe"), json!(4), json!(0)]);
    assert_eq!(data.rows[1], vec![json!("Europe"), json!(6), json!(50.5)]);
    assert_eq!(data.rows[6], vec![json!("USA"), json!(4), json!(49.5)]);
    Ok(())
}

#[test]
fn test_histogram_buckets() -> Result<(), Box<dyn std::error::Error>> {
    let driver = cars()?;
    let catalog = MetadataCatalog::new();
    let dataset = Dataset::new("cars", &driver, &catalog);

    let mut intent = VisualizationIntent::new(
        Mark::Histogram,
        vec![
            Clause::attribute("horsepower").on(Channel::X).bins(4),
            Clause::attribute(RECORD).on(Channel::Y).aggregate(Aggregation::Count),
        ],
    );
    let outcome = executor(CompileOptions::default())?.execute_intent(&dataset, &mut intent)?;

    assert!(matches!(outcome, Outcome::Executed { shape: QueryShape::Histogram, .. }));
    let data = intent.data.ok_or("no data")?;
    assert_eq!(data.columns, vec!["horsepower", "Number of Records"]);
    assert_eq!(
        data.rows,
        vec![
            vec![json!(13), json!(25)],
            vec![json!(38), json!(25)],
            vec![json!(63), json!(25)],
            vec![json!(88), json!(26)],
        ]
    );
    Ok(())
}

#[test]
fn test_scatter_is_sampled_above_limit() -> Result<(), Box<dyn std::error::Error>> {
    let driver = cars()?;
    let catalog = MetadataCatalog::new();
    let dataset = Dataset::new("cars", &driver, &catalog);
    let options = CompileOptions {
        sample_limit: 50,
        literal_quoting: LiteralQuoting::Typed,
    };

    let mut intent = VisualizationIntent::new(
        Mark::Scatter,
        vec![
            Clause::attribute("horsepower").on(Channel::X),
            Clause::attribute("cylinders").on(Channel::Y),
        ],
    );
    let outcome = executor(options)?.execute_intent(&dataset, &mut intent)?;

    let Outcome::Executed { sql, rows, .. } = outcome else {
        panic!("scatter should execute");
    };
    assert!(sql.ends_with("ORDER BY random() LIMIT 50"));
    assert_eq!(rows, 50);

    let mut small = VisualizationIntent::new(
        Mark::Scatter,
        vec![
            Clause::attribute("horsepower").on(Channel::X),
            Clause::filter("cylinders", FilterOp::Eq, 8),
        ],
    );
    executor(options)?.execute_intent(&dataset, &mut small)?;
    assert_eq!(small.data.ok_or("no data")?.row_count(), 33);
    Ok(())
}

#[test]
fn test_histogram_of_nominal_attribute_is_rejected() -> Result<(), Box<dyn std::error::Error>> {
    let driver = cars()?;
    let catalog = MetadataCatalog::new();
    let dataset = Dataset::new("cars", &driver, &catalog);

    let mut intent = VisualizationIntent::new(Mark::Histogram, vec![Clause::attribute("origin").bins(4)]);
    let err = executor(CompileOptions::default())?
        .execute_intent(&dataset, &mut intent)
        .unwrap_err();

    assert!(matches!(err, ExecutionError::Compile(_)));
    assert!(intent.data.is_none());
    Ok(())
}
