//! Query Compiler - visualization intent to SQL
//!
//! Emits one of three fixed shapes:
//! - projection (optionally sampled) for marks that plot raw rows
//! - grouped aggregation, optionally split by a color attribute
//! - equal-width histogram, bucketed inside the database

use serde::{Deserialize, Serialize};
use tracing::debug;
use vizsql_catalog::TableMetadata;
use vizsql_ir::{Aggregation, Channel, Clause, QueryShape, VisualizationIntent, RECORD};
use vizsql_registry::Dialect;

use crate::bins::BinEdges;
use crate::bucket::{strategy_for, BucketStrategy};
use crate::filter::{compile_filters_with, FilterPredicate, LiteralQuoting};
use crate::CompileError;

/// Rows above which projections are randomly sampled
pub const DEFAULT_SAMPLE_LIMIT: usize = 10_000;

/// Output column of histogram counts
pub const HISTOGRAM_COUNT_COLUMN: &str = "Number of Records";

/// SQL text plus the columns it is expected to return, in order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompiledQuery {
    pub sql: String,
    pub columns: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompileOptions {
    pub sample_limit: usize,
    pub literal_quoting: LiteralQuoting,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            sample_limit: DEFAULT_SAMPLE_LIMIT,
            literal_quoting: LiteralQuoting::AlwaysString,
        }
    }
}

/// Why an intent produced no query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Neither axis carries an aggregation function
    NotAggregatable,
}

#[derive(Debug, Clone)]
pub enum QueryPlan {
    Projection(ProjectionPlan),
    Aggregation(AggregationPlan),
    Histogram(HistogramPlan),
    Skip(SkipReason),
}

impl QueryPlan {
    pub fn shape(&self) -> Option<QueryShape> {
        match self {
            QueryPlan::Projection(_) => Some(QueryShape::Projection),
            QueryPlan::Aggregation(_) => Some(QueryShape::Aggregation),
            QueryPlan::Histogram(_) => Some(QueryShape::Histogram),
            QueryPlan::Skip(_) => None,
        }
    }
}

/// Raw projection; the row count decides whether to sample
#[derive(Debug, Clone)]
pub struct ProjectionPlan {
    pub count_query: CompiledQuery,
    pub attributes: Vec<String>,
    table: String,
    predicate: String,
    random_function: String,
    sample_limit: usize,
}

impl ProjectionPlan {
    /// Final projection given the count under the predicate
    pub fn finish(&self, row_count: usize) -> CompiledQuery {
        let mut sql = format!("SELECT {} FROM {}", self.attributes.join(", "), self.table);
        if !self.predicate.is_empty() {
            sql.push(' ');
            sql.push_str(&self.predicate);
        }
        if self.is_sampled(row_count) {
            sql.push_str(&format!(
                " ORDER BY {}() LIMIT {}",
                self.random_function, self.sample_limit
            ));
        }
        CompiledQuery {
            sql,
            columns: self.attributes.clone(),
        }
    }

    pub fn is_sampled(&self, row_count: usize) -> bool {
        row_count > self.sample_limit
    }

    pub fn sample_limit(&self) -> usize {
        self.sample_limit
    }
}

/// Grouped aggregation; `query.columns` is `key, [color], measure`
#[derive(Debug, Clone)]
pub struct AggregationPlan {
    pub query: CompiledQuery,
    pub key: String,
    pub color: Option<String>,
    /// Output name of the measure column (`Record` for row counts)
    pub measure: String,
    pub aggregation: Aggregation,
}

/// Histogram over one binned attribute
#[derive(Debug, Clone)]
pub struct HistogramPlan {
    pub query: CompiledQuery,
    pub attribute: String,
    pub bins: BinEdges,
}

impl HistogramPlan {
    pub fn centers(&self) -> Vec<f64> {
        self.bins.centers()
    }
}

pub struct QueryCompiler {
    dialect: Dialect,
    options: CompileOptions,
    buckets: Box<dyn BucketStrategy>,
}

impl QueryCompiler {
    pub fn new(dialect: Dialect, options: CompileOptions) -> Self {
        let buckets = strategy_for(dialect.bucket);
        Self {
            dialect,
            options,
            buckets,
        }
    }

    /// Replace the dialect's bucket strategy
    pub fn with_bucket_strategy(mut self, strategy: impl BucketStrategy + 'static) -> Self {
        self.buckets = Box::new(strategy);
        self
    }

    pub fn dialect(&self) -> &Dialect {
        &self.dialect
    }

    pub fn options(&self) -> &CompileOptions {
        &self.options
    }

    /// Plan the query for an intent; pure, the same input yields the same SQL
    pub fn plan(
        &self,
        intent: &VisualizationIntent,
        table: &str,
        metadata: &TableMetadata,
    ) -> Result<QueryPlan, CompileError> {
        check_attributes(intent, metadata)?;
        let predicate = compile_filters_with(intent, self.options.literal_quoting, metadata);

        let plan = match intent.mark.shape() {
            QueryShape::Projection => QueryPlan::Projection(self.projection(intent, table, predicate)),
            QueryShape::Aggregation => self.aggregation(intent, table, &predicate)?,
            QueryShape::Histogram => {
                QueryPlan::Histogram(self.histogram(intent, table, &predicate, metadata)?)
            }
        };

        debug!(
            table = %table,
            mark = ?intent.mark,
            shape = ?plan.shape(),
            "Planned intent"
        );
        Ok(plan)
    }

    fn projection(&self, intent: &VisualizationIntent, table: &str, predicate: FilterPredicate) -> ProjectionPlan {
        let mut attributes: Vec<String> = intent
            .attributes()
            .into_iter()
            .filter(|a| *a != RECORD)
            .map(str::to_string)
            .collect();
        for attr in predicate.attributes {
            if !attributes.contains(&attr) {
                attributes.push(attr);
            }
        }

        let count_query = CompiledQuery {
            sql: with_predicate(format!("SELECT COUNT(*) AS count FROM {}", table), &predicate.fragment),
            columns: vec!["count".to_string()],
        };

        ProjectionPlan {
            count_query,
            attributes,
            table: table.to_string(),
            predicate: predicate.fragment,
            random_function: self.dialect.random_function.clone(),
            sample_limit: self.options.sample_limit,
        }
    }

    fn aggregation(
        &self,
        intent: &VisualizationIntent,
        table: &str,
        predicate: &FilterPredicate,
    ) -> Result<QueryPlan, CompileError> {
        let (x, y) = match (
            intent.clauses_by_channel(Channel::X).first(),
            intent.clauses_by_channel(Channel::Y).first(),
        ) {
            (Some(x), Some(y)) => (*x, *y),
            _ => return Ok(QueryPlan::Skip(SkipReason::NotAggregatable)),
        };

        // x wins when both axes carry an aggregation
        let (key, measure, aggregation) = match (x.aggregation, y.aggregation) {
            (Some(agg), _) => (y, x, agg),
            (None, Some(agg)) => (x, y, agg),
            (None, None) => return Ok(QueryPlan::Skip(SkipReason::NotAggregatable)),
        };

        let key_attr = clause_attribute(key)?;
        let measure_attr = clause_attribute(measure)?;
        let color = match intent.clauses_by_channel(Channel::Color).as_slice() {
            [] => None,
            [clause] => Some(clause_attribute(clause)?.to_string()),
            _ => {
                return Err(CompileError::MalformedIntent(
                    "more than one clause on the color channel".to_string(),
                ))
            }
        };

        let group_by = match &color {
            Some(color) => format!("{}, {}", key_attr, color),
            None => key_attr.to_string(),
        };

        let (select, measure_name) = if measure.is_record() {
            (format!("COUNT({}) AS count", key_attr), RECORD.to_string())
        } else {
            let func = self.dialect.aggregate_function(aggregation)?;
            (
                format!("{}({}) AS {}", func, measure_attr, measure_attr),
                measure_attr.to_string(),
            )
        };

        let sql = format!(
            "SELECT {}, {} FROM {} GROUP BY {}",
            group_by,
            select,
            with_predicate(table.to_string(), &predicate.fragment),
            group_by
        );

        let mut columns = vec![key_attr.to_string()];
        columns.extend(color.iter().cloned());
        columns.push(measure_name.clone());

        Ok(QueryPlan::Aggregation(AggregationPlan {
            query: CompiledQuery { sql, columns },
            key: key_attr.to_string(),
            color,
            measure: measure_name,
            aggregation,
        }))
    }

    fn histogram(
        &self,
        intent: &VisualizationIntent,
        table: &str,
        predicate: &FilterPredicate,
        metadata: &TableMetadata,
    ) -> Result<HistogramPlan, CompileError> {
        let clause = match intent.bin_clauses().as_slice() {
            [clause] => *clause,
            [] => {
                return Err(CompileError::MalformedIntent(
                    "histogram requires a clause with a bin count".to_string(),
                ))
            }
            many => {
                return Err(CompileError::MalformedIntent(format!(
                    "histogram requires exactly one binned clause, found {}",
                    many.len()
                )))
            }
        };

        let attribute = clause_attribute(clause)?;
        let (min, max) = metadata.min_max(attribute)?;
        let integer_domain = metadata.is_integer_domain(attribute)?;
        let bins = BinEdges::compute(min, max, clause.bin_size as usize, integer_domain)?;

        let inner = with_predicate(
            format!(
                "SELECT {} AS bucket FROM {}",
                self.buckets.bucket_expr(attribute, &bins),
                table
            ),
            &predicate.fragment,
        );
        let sql = format!(
            "SELECT bucket, COUNT(*) AS count FROM ({}) AS buckets GROUP BY bucket ORDER BY bucket",
            inner
        );

        Ok(HistogramPlan {
            query: CompiledQuery {
                sql,
                columns: vec!["bucket".to_string(), "count".to_string()],
            },
            attribute: attribute.to_string(),
            bins,
        })
    }
}

fn clause_attribute(clause: &Clause) -> Result<&str, CompileError> {
    clause
        .attribute
        .as_deref()
        .ok_or_else(|| CompileError::MalformedIntent("clause without an attribute".to_string()))
}

/// Every named attribute, filters included, must be a catalogued column
fn check_attributes(intent: &VisualizationIntent, metadata: &TableMetadata) -> Result<(), CompileError> {
    for attr in intent.clauses.iter().filter_map(|c| c.attribute.as_deref()) {
        if attr != RECORD {
            metadata.entry(attr)?;
        }
    }
    Ok(())
}

fn with_predicate(mut sql: String, fragment: &str) -> String {
    if !fragment.is_empty() {
        sql.push(' ');
        sql.push_str(fragment);
    }
    sql
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use vizsql_catalog::{CatalogError, ColumnCatalogEntry, SemanticType};
    use vizsql_ir::{FilterOp, Mark};

    fn entry(name: &str, semantic_type: SemanticType, values: Vec<serde_json::Value>) -> ColumnCatalogEntry {
        ColumnCatalogEntry {
            name: name.to_string(),
            sql_type: "INTEGER".to_string(),
            semantic_type: Some(semantic_type),
            cardinality: values.len(),
            distinct_values: values,
            min_max: None,
        }
    }

    fn metadata() -> TableMetadata {
        let mut horsepower = entry(
            "horsepower",
            SemanticType::Quantitative,
            vec![json!(0), json!(40), json!(100)],
        );
        horsepower.min_max = Some((0.0, 100.0));

        TableMetadata::new(
            "cars",
            400,
            vec![
                entry("origin", SemanticType::Nominal, vec![json!("A"), json!("B")]),
                entry("cylinders", SemanticType::Nominal, vec![json!(4), json!(6)]),
                horsepower,
            ],
        )
    }

    fn compiler(dialect: Dialect) -> QueryCompiler {
        QueryCompiler::new(dialect, CompileOptions::default())
    }

    fn bar(measure: Clause) -> VisualizationIntent {
        VisualizationIntent::new(
            Mark::Bar,
            vec![Clause::attribute("origin").on(Channel::X), measure.on(Channel::Y)],
        )
    }

    #[test]
    fn test_record_count_query() {
        let intent = bar(Clause::attribute(RECORD).aggregate(Aggregation::Count));
        let plan = compiler(Dialect::duckdb()).plan(&intent, "cars", &metadata()).unwrap();

        let QueryPlan::Aggregation(plan) = plan else {
            panic!("expected aggregation plan");
        };
        assert_eq!(
            plan.query.sql,
            "SELECT origin, COUNT(origin) AS count FROM cars GROUP BY origin"
        );
        assert_eq!(plan.query.columns, vec!["origin", "Record"]);
        assert_eq!(plan.measure, RECORD);
    }

    #[test]
    fn test_mean_with_color_and_filter() {
        let mut intent = bar(Clause::attribute("horsepower").aggregate(Aggregation::Mean));
        intent.clauses.push(Clause::attribute("cylinders").on(Channel::Color));
        intent.clauses.push(Clause::filter("origin", FilterOp::Ne, "C"));

        let plan = compiler(Dialect::postgres()).plan(&intent, "cars", &metadata()).unwrap();
        let QueryPlan::Aggregation(plan) = plan else {
            panic!("expected aggregation plan");
        };
        assert_eq!(
            plan.query.sql,
            "SELECT origin, cylinders, AVG(horsepower) AS horsepower FROM cars WHERE origin != 'C' \
             GROUP BY origin, cylinders"
        );
        assert_eq!(plan.query.columns, vec!["origin", "cylinders", "horsepower"]);
        assert_eq!(plan.color.as_deref(), Some("cylinders"));
    }

    #[test]
    fn test_aggregation_on_x_axis() {
        let intent = VisualizationIntent::new(
            Mark::Bar,
            vec![
                Clause::attribute("horsepower").on(Channel::X).aggregate(Aggregation::Sum),
                Clause::attribute("origin").on(Channel::Y),
            ],
        );
        let QueryPlan::Aggregation(plan) = compiler(Dialect::duckdb()).plan(&intent, "cars", &metadata()).unwrap()
        else {
            panic!("expected aggregation plan");
        };
        assert_eq!(plan.key, "origin");
        assert!(plan.query.sql.contains("SUM(horsepower) AS horsepower"));
    }

    #[test]
    fn test_not_aggregatable_is_skipped() {
        let intent = bar(Clause::attribute("horsepower"));
        let plan = compiler(Dialect::duckdb()).plan(&intent, "cars", &metadata()).unwrap();
        assert!(matches!(plan, QueryPlan::Skip(SkipReason::NotAggregatable)));
    }

    #[test]
    fn test_projection_sampling_threshold() {
        let intent = VisualizationIntent::new(
            Mark::Scatter,
            vec![
                Clause::attribute("horsepower").on(Channel::X),
                Clause::attribute("cylinders").on(Channel::Y),
                Clause::filter("origin", FilterOp::Eq, "A"),
            ],
        );
        let QueryPlan::Projection(plan) = compiler(Dialect::duckdb()).plan(&intent, "cars", &metadata()).unwrap()
        else {
            panic!("expected projection plan");
        };

        assert_eq!(plan.count_query.sql, "SELECT COUNT(*) AS count FROM cars WHERE origin = 'A'");
        assert_eq!(plan.attributes, vec!["horsepower", "cylinders", "origin"]);

        assert_eq!(
            plan.finish(10_000).sql,
            "SELECT horsepower, cylinders, origin FROM cars WHERE origin = 'A'"
        );
        assert_eq!(
            plan.finish(10_001).sql,
            "SELECT horsepower, cylinders, origin FROM cars WHERE origin = 'A' ORDER BY random() LIMIT 10000"
        );
    }

    #[test]
    fn test_histogram_native_and_arithmetic() {
        let intent = VisualizationIntent::new(
            Mark::Histogram,
            vec![
                Clause::attribute("horsepower").on(Channel::X).bins(4),
                Clause::attribute(RECORD).on(Channel::Y).aggregate(Aggregation::Count),
            ],
        );

        let QueryPlan::Histogram(native) = compiler(Dialect::postgres()).plan(&intent, "cars", &metadata()).unwrap()
        else {
            panic!("expected histogram plan");
        };
        assert_eq!(
            native.query.sql,
            "SELECT bucket, COUNT(*) AS count FROM (SELECT width_bucket(horsepower, '{25,50,75}') AS bucket \
             FROM cars) AS buckets GROUP BY bucket ORDER BY bucket"
        );
        assert_eq!(native.centers(), vec![13.0, 38.0, 63.0, 88.0]);

        let QueryPlan::Histogram(arith) = compiler(Dialect::duckdb()).plan(&intent, "cars", &metadata()).unwrap()
        else {
            panic!("expected histogram plan");
        };
        assert!(arith.query.sql.contains("LEAST(GREATEST(CAST(FLOOR((horsepower - 0.0) / 25.0)"));
    }

    #[test]
    fn test_histogram_requires_single_binned_quantitative_clause() {
        let none = VisualizationIntent::new(Mark::Histogram, vec![Clause::attribute("horsepower")]);
        assert!(matches!(
            compiler(Dialect::duckdb()).plan(&none, "cars", &metadata()),
            Err(CompileError::MalformedIntent(_))
        ));

        let two = VisualizationIntent::new(
            Mark::Histogram,
            vec![Clause::attribute("horsepower").bins(4), Clause::attribute("cylinders").bins(4)],
        );
        assert!(matches!(
            compiler(Dialect::duckdb()).plan(&two, "cars", &metadata()),
            Err(CompileError::MalformedIntent(_))
        ));

        let nominal = VisualizationIntent::new(Mark::Histogram, vec![Clause::attribute("cylinders").bins(4)]);
        assert!(matches!(
            compiler(Dialect::duckdb()).plan(&nominal, "cars", &metadata()),
            Err(CompileError::Catalog(CatalogError::NotApplicable { .. }))
        ));
    }

    #[test]
    fn test_uncatalogued_attributes_rejected() {
        let crafted = VisualizationIntent::new(
            Mark::Scatter,
            vec![
                Clause::attribute("origin").on(Channel::X),
                Clause::filter("(SELECT pw FROM secrets)", FilterOp::Eq, "hunter2"),
            ],
        );
        assert!(matches!(
            compiler(Dialect::duckdb()).plan(&crafted, "cars", &metadata()),
            Err(CompileError::Catalog(CatalogError::UnknownAttribute(_)))
        ));

        let unknown_axis = bar(Clause::attribute("weight").aggregate(Aggregation::Sum));
        assert!(matches!(
            compiler(Dialect::duckdb()).plan(&unknown_axis, "cars", &metadata()),
            Err(CompileError::Catalog(CatalogError::UnknownAttribute(_)))
        ));

        let unknown_color = {
            let mut intent = bar(Clause::attribute(RECORD).aggregate(Aggregation::Count));
            intent.clauses.push(Clause::attribute("origin; DROP TABLE cars").on(Channel::Color));
            intent
        };
        assert!(matches!(
            compiler(Dialect::duckdb()).plan(&unknown_color, "cars", &metadata()),
            Err(CompileError::Catalog(CatalogError::UnknownAttribute(_)))
        ));
    }

    #[test]
    fn test_compilation_is_idempotent() {
        let mut intent = bar(Clause::attribute("horsepower").aggregate(Aggregation::Max));
        intent.clauses.push(Clause::filter("cylinders", FilterOp::Gt, 4));
        let compiler = compiler(Dialect::duckdb());
        let meta = metadata();

        let first = compiler.plan(&intent, "cars", &meta).unwrap();
        let second = compiler.plan(&intent, "cars", &meta).unwrap();
        match (first, second) {
            (QueryPlan::Aggregation(a), QueryPlan::Aggregation(b)) => assert_eq!(a.query, b.query),
            _ => panic!("expected aggregation plans"),
        }
    }
}
