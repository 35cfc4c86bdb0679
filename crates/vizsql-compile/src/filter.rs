//! Filter Compiler - filter clauses to a conjunctive WHERE fragment

use serde::{Deserialize, Serialize};
use serde_json::Value;
use vizsql_catalog::{classify::is_numeric_type, SemanticType, TableMetadata};
use vizsql_ir::VisualizationIntent;

/// How filter literals are rendered
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LiteralQuoting {
    /// Every literal is a quoted string, whatever the column type
    #[default]
    AlwaysString,
    /// Numeric literals on numeric columns are emitted bare
    Typed,
}

/// Compiled predicate and the attributes it references
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterPredicate {
    /// Empty, or `WHERE a op 'v' [AND b op 'w' ...]`
    pub fragment: String,
    /// De-duplicated, first-seen order
    pub attributes: Vec<String>,
}

impl FilterPredicate {
    pub fn is_empty(&self) -> bool {
        self.fragment.is_empty()
    }
}

/// Compile with string-only literal quoting
pub fn compile_filters(intent: &VisualizationIntent) -> FilterPredicate {
    compile(intent, |_, value| quote_string(value))
}

/// Compile with the given quoting policy, consulting column types for `Typed`
pub fn compile_filters_with(
    intent: &VisualizationIntent,
    quoting: LiteralQuoting,
    metadata: &TableMetadata,
) -> FilterPredicate {
    match quoting {
        LiteralQuoting::AlwaysString => compile_filters(intent),
        LiteralQuoting::Typed => compile(intent, |attr, value| {
            if is_numeric_column(metadata, attr) {
                if let Some(number) = numeric_literal(value) {
                    return number;
                }
            }
            quote_string(value)
        }),
    }
}

fn compile(intent: &VisualizationIntent, literal: impl Fn(&str, &Value) -> String) -> FilterPredicate {
    let mut parts: Vec<String> = Vec::new();
    let mut attributes: Vec<String> = Vec::new();

    for (i, (attr, filter)) in intent.filters().enumerate() {
        parts.push(if i == 0 { "WHERE" } else { "AND" }.to_string());
        parts.push(attr.to_string());
        parts.push(filter.op.as_sql().to_string());
        parts.push(literal(attr, &filter.value));

        if !attributes.iter().any(|a| a == attr) {
            attributes.push(attr.to_string());
        }
    }

    FilterPredicate {
        fragment: parts.join(" "),
        attributes,
    }
}

fn is_numeric_column(metadata: &TableMetadata, attr: &str) -> bool {
    match metadata.entry(attr) {
        Ok(entry) => {
            matches!(
                entry.semantic_type,
                Some(SemanticType::Quantitative) | Some(SemanticType::Id)
            ) || is_numeric_type(&entry.sql_type)
        }
        Err(_) => false,
    }
}

fn numeric_literal(value: &Value) -> Option<String> {
    match value {
        Value::Number(n) => n.as_f64().filter(|f| f.is_finite()).map(|_| n.to_string()),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|f| f.is_finite())
            .map(|_| s.trim().to_string()),
        _ => None,
    }
}

/// `'text'`, with embedded quotes doubled
fn quote_string(value: &Value) -> String {
    let text = match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    format!("'{}'", text.replace('\'', "''"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use vizsql_catalog::ColumnCatalogEntry;
    use vizsql_ir::{Channel, Clause, FilterOp, Mark};

    fn intent(filters: Vec<Clause>) -> VisualizationIntent {
        let mut clauses = vec![Clause::attribute("horsepower").on(Channel::X)];
        clauses.extend(filters);
        VisualizationIntent::new(Mark::Scatter, clauses)
    }

    #[test]
    fn test_no_filters() {
        let predicate = compile_filters(&intent(vec![]));
        assert!(predicate.is_empty());
        assert!(predicate.attributes.is_empty());
    }

    #[test]
    fn test_where_then_and() {
        for n in 1..5 {
            let filters = (0..n)
                .map(|i| Clause::filter(format!("attr{}", i), FilterOp::Eq, i))
                .collect();
            let predicate = compile_filters(&intent(filters));

            assert!(predicate.fragment.starts_with("WHERE"));
            assert_eq!(predicate.fragment.matches(" AND ").count(), n - 1);
            assert_eq!(predicate.attributes.len(), n);
        }
    }

    #[test]
    fn test_literals_quoted_as_strings() {
        let predicate = compile_filters(&intent(vec![
            Clause::filter("origin", FilterOp::Eq, "USA"),
            Clause::filter("cylinders", FilterOp::Gt, 4),
            Clause::filter("name", FilterOp::Ne, "chevy's"),
        ]));

        assert_eq!(
            predicate.fragment,
            "WHERE origin = 'USA' AND cylinders > '4' AND name != 'chevy''s'"
        );
    }

    #[test]
    fn test_repeated_attribute_listed_once() {
        let predicate = compile_filters(&intent(vec![
            Clause::filter("weight", FilterOp::Gt, 2000),
            Clause::filter("weight", FilterOp::Lt, 3000),
        ]));

        assert_eq!(predicate.attributes, vec!["weight"]);
        assert_eq!(predicate.fragment, "WHERE weight > '2000' AND weight < '3000'");
    }

    #[test]
    fn test_typed_quoting() {
        let metadata = TableMetadata::new(
            "cars",
            3,
            vec![
                ColumnCatalogEntry {
                    name: "cylinders".to_string(),
                    sql_type: "INTEGER".to_string(),
                    semantic_type: Some(SemanticType::Nominal),
                    cardinality: 3,
                    distinct_values: vec![json!(4), json!(6), json!(8)],
                    min_max: None,
                },
                ColumnCatalogEntry {
                    name: "origin".to_string(),
                    sql_type: "VARCHAR".to_string(),
                    semantic_type: Some(SemanticType::Nominal),
                    cardinality: 1,
                    distinct_values: vec![json!("USA")],
                    min_max: None,
                },
            ],
        );

        let predicate = compile_filters_with(
            &intent(vec![
                Clause::filter("cylinders", FilterOp::Ge, "6"),
                Clause::filter("origin", FilterOp::Eq, "USA"),
            ]),
            LiteralQuoting::Typed,
            &metadata,
        );

        assert_eq!(predicate.fragment, "WHERE cylinders >= 6 AND origin = 'USA'");

        let non_finite = compile_filters_with(
            &intent(vec![
                Clause::filter("cylinders", FilterOp::Ne, "NaN"),
                Clause::filter("cylinders", FilterOp::Lt, "inf"),
                Clause::filter("cylinders", FilterOp::Gt, "-Infinity"),
            ]),
            LiteralQuoting::Typed,
            &metadata,
        );
        assert_eq!(
            non_finite.fragment,
            "WHERE cylinders != 'NaN' AND cylinders < 'inf' AND cylinders > '-Infinity'"
        );
    }
}
