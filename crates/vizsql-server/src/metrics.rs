//! Prometheus metrics for intent execution

use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};
use vizsql_exec::Outcome;

pub struct Metrics {
    registry: Registry,
    intents_total: IntCounterVec,
    backfilled_rows_total: IntCounter,
    execution_seconds: Histogram,
}

impl Metrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let intents_total = IntCounterVec::new(
            Opts::new("vizsql_intents_total", "Visualization intents processed"),
            &["shape", "outcome"],
        )?;
        let backfilled_rows_total = IntCounter::new(
            "vizsql_backfilled_rows_total",
            "Rows synthesized for groups or buckets the database left out",
        )?;
        let execution_seconds = Histogram::with_opts(
            HistogramOpts::new("vizsql_execution_seconds", "Intent execution latency in seconds")
                .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]),
        )?;

        registry.register(Box::new(intents_total.clone()))?;
        registry.register(Box::new(backfilled_rows_total.clone()))?;
        registry.register(Box::new(execution_seconds.clone()))?;

        Ok(Self {
            registry,
            intents_total,
            backfilled_rows_total,
            execution_seconds,
        })
    }

    pub fn record_outcome(&self, outcome: &Outcome, seconds: f64) {
        match outcome {
            Outcome::Executed { shape, backfilled, .. } => {
                self.intents_total
                    .with_label_values(&[shape.as_str(), "executed"])
                    .inc();
                self.backfilled_rows_total.inc_by(*backfilled as u64);
            }
            Outcome::Skipped { .. } => {
                self.intents_total.with_label_values(&["none", "skipped"]).inc();
            }
        }
        self.execution_seconds.observe(seconds);
    }

    pub fn record_error(&self, seconds: f64) {
        self.intents_total.with_label_values(&["none", "error"]).inc();
        self.execution_seconds.observe(seconds);
    }

    /// Text exposition format
    pub fn render(&self) -> prometheus::Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}
