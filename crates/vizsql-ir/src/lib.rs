//! vizsql Intermediate Representation (IR)
//!
//! Visualization intents as handed over by the front end, the tabular
//! results written back onto them, and the `Driver` seam every query goes
//! through. All types are deterministically serializable.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

mod driver;
mod types;
pub use driver::*;
pub use types::*;

/// Attribute sentinel meaning "count of rows"
pub const RECORD: &str = "Record";

/// A chart specification: a mark plus an ordered list of clauses
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisualizationIntent {
    pub mark: Mark,

    #[serde(default)]
    pub clauses: Vec<Clause>,

    /// Normalized result, written back after execution
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<ResultTable>,
}

impl VisualizationIntent {
    pub fn new(mark: Mark, clauses: Vec<Clause>) -> Self {
        Self {
            mark,
            clauses,
            data: None,
        }
    }

    /// Calculate fingerprint (SHA-256) of mark and clauses
    ///
    /// Attached result data does not take part, so the fingerprint is stable
    /// across executions of the same intent.
    pub fn fingerprint(&self) -> String {
        let json = serde_json::to_string(&(&self.mark, &self.clauses))
            .unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(json.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// Clauses assigned to the given channel, in clause order
    pub fn clauses_by_channel(&self, channel: Channel) -> Vec<&Clause> {
        self.clauses
            .iter()
            .filter(|c| c.channel == Some(channel))
            .collect()
    }

    /// Clauses carrying a filter
    pub fn filters(&self) -> impl Iterator<Item = (&str, &Filter)> {
        self.clauses.iter().filter_map(|c| match (&c.attribute, &c.filter) {
            (Some(attr), Some(filter)) => Some((attr.as_str(), filter)),
            _ => None,
        })
    }

    /// Clauses with a nonzero bin count
    pub fn bin_clauses(&self) -> Vec<&Clause> {
        self.clauses.iter().filter(|c| c.bin_size != 0).collect()
    }

    /// Attribute names referenced by non-filter clauses, de-duplicated in clause order
    pub fn attributes(&self) -> Vec<&str> {
        let mut attrs: Vec<&str> = Vec::new();
        for clause in self.clauses.iter().filter(|c| c.filter.is_none()) {
            if let Some(attr) = clause.attribute.as_deref() {
                if !attrs.contains(&attr) {
                    attrs.push(attr);
                }
            }
        }
        attrs
    }
}

/// Mark kind; selects the query shape
///
/// Any mark name outside the known set is kept as `Other` and plots raw rows.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Mark {
    Bar,
    Line,
    Histogram,
    Scatter,
    Tick,
    Heatmap,
    Other(String),
}

impl Mark {
    pub fn shape(&self) -> QueryShape {
        match self {
            Mark::Bar | Mark::Line => QueryShape::Aggregation,
            Mark::Histogram => QueryShape::Histogram,
            Mark::Scatter | Mark::Tick | Mark::Heatmap | Mark::Other(_) => QueryShape::Projection,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Mark::Bar => "bar",
            Mark::Line => "line",
            Mark::Histogram => "histogram",
            Mark::Scatter => "scatter",
            Mark::Tick => "tick",
            Mark::Heatmap => "heatmap",
            Mark::Other(name) => name,
        }
    }
}

impl From<String> for Mark {
    fn from(name: String) -> Self {
        match name.to_lowercase().as_str() {
            "bar" => Mark::Bar,
            "line" => Mark::Line,
            "histogram" => Mark::Histogram,
            "scatter" => Mark::Scatter,
            "tick" => Mark::Tick,
            "heatmap" => Mark::Heatmap,
            _ => Mark::Other(name),
        }
    }
}

impl From<Mark> for String {
    fn from(mark: Mark) -> Self {
        match mark {
            Mark::Other(name) => name,
            known => known.as_str().to_string(),
        }
    }
}

/// The three mutually exclusive query shapes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryShape {
    Projection,
    Aggregation,
    Histogram,
}

impl QueryShape {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryShape::Projection => "projection",
            QueryShape::Aggregation => "aggregation",
            QueryShape::Histogram => "histogram",
        }
    }
}

/// A single clause of an intent
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Clause {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attribute: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<Channel>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggregation: Option<Aggregation>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<Filter>,

    /// Number of bins; zero means "not a binning clause"
    #[serde(default)]
    pub bin_size: u32,
}

impl Clause {
    /// Clause on `attribute` without channel, aggregation or filter
    pub fn attribute(attribute: impl Into<String>) -> Self {
        Self {
            attribute: Some(attribute.into()),
            ..Default::default()
        }
    }

    /// Filter clause `attribute op value`
    pub fn filter(attribute: impl Into<String>, op: FilterOp, value: impl Into<serde_json::Value>) -> Self {
        Self {
            attribute: Some(attribute.into()),
            filter: Some(Filter {
                op,
                value: value.into(),
            }),
            ..Default::default()
        }
    }

    pub fn on(mut self, channel: Channel) -> Self {
        self.channel = Some(channel);
        self
    }

    pub fn aggregate(mut self, aggregation: Aggregation) -> Self {
        self.aggregation = Some(aggregation);
        self
    }

    pub fn bins(mut self, bin_size: u32) -> Self {
        self.bin_size = bin_size;
        self
    }

    pub fn is_record(&self) -> bool {
        self.attribute.as_deref() == Some(RECORD)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    X,
    Y,
    Color,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Aggregation {
    Mean,
    Sum,
    Max,
    Count,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    pub op: FilterOp,
    pub value: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FilterOp {
    #[serde(rename = "=")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Ge,
}

impl FilterOp {
    pub fn as_sql(&self) -> &'static str {
        match self {
            FilterOp::Eq => "=",
            FilterOp::Ne => "!=",
            FilterOp::Lt => "<",
            FilterOp::Le => "<=",
            FilterOp::Gt => ">",
            FilterOp::Ge => ">=",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bar_intent() -> VisualizationIntent {
        VisualizationIntent::new(
            Mark::Bar,
            vec![
                Clause::attribute("origin").on(Channel::X),
                Clause::attribute(RECORD).on(Channel::Y).aggregate(Aggregation::Count),
                Clause::filter("cylinders", FilterOp::Gt, 4),
            ],
        )
    }

    #[test]
    fn test_fingerprint_deterministic() {
        let intent1 = bar_intent();
        let intent2 = intent1.clone();

        assert_eq!(intent1.fingerprint(), intent2.fingerprint());
    }

    #[test]
    fn test_fingerprint_ignores_data() {
        let mut intent = bar_intent();
        let before = intent.fingerprint();
        intent.data = Some(ResultTable::new(vec!["origin".to_string()]));

        assert_eq!(before, intent.fingerprint());
    }

    #[test]
    fn test_json_round_trip() {
        let json = r#"{
            "mark": "histogram",
            "clauses": [
                {"attribute": "horsepower", "channel": "x", "bin_size": 10},
                {"attribute": "origin", "filter": {"op": "=", "value": "USA"}}
            ]
        }"#;

        let intent: VisualizationIntent = serde_json::from_str(json).unwrap();
        assert_eq!(intent.mark.shape(), QueryShape::Histogram);
        assert_eq!(intent.bin_clauses().len(), 1);

        let (attr, filter) = intent.filters().next().unwrap();
        assert_eq!(attr, "origin");
        assert_eq!(filter.op, FilterOp::Eq);

        let reparsed: VisualizationIntent =
            serde_json::from_str(&serde_json::to_string(&intent).unwrap()).unwrap();
        assert_eq!(intent.fingerprint(), reparsed.fingerprint());
    }

    #[test]
    fn test_unknown_mark_plots_raw_rows() {
        let json = r#"{"mark": "point", "clauses": [{"attribute": "horsepower", "channel": "x"}]}"#;

        let intent: VisualizationIntent = serde_json::from_str(json).unwrap();
        assert_eq!(intent.mark, Mark::Other("point".to_string()));
        assert_eq!(intent.mark.shape(), QueryShape::Projection);

        let encoded = serde_json::to_value(&intent).unwrap();
        assert_eq!(encoded["mark"], serde_json::json!("point"));

        let known: Mark = serde_json::from_str(r#""heatmap""#).unwrap();
        assert_eq!(known, Mark::Heatmap);
        assert_eq!(serde_json::to_string(&Mark::Bar).unwrap(), r#""bar""#);
    }

    #[test]
    fn test_attributes_skip_filters_and_duplicates() {
        let mut intent = bar_intent();
        intent.clauses.push(Clause::attribute("origin").on(Channel::Color));

        assert_eq!(intent.attributes(), vec!["origin", RECORD]);
        assert_eq!(intent.clauses_by_channel(Channel::X).len(), 1);
        assert!(intent.clauses_by_channel(Channel::Y)[0].is_record());
    }
}
