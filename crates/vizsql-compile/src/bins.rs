//! Equal-width bin edges and bucket centers

use serde::{Deserialize, Serialize};

use crate::CompileError;

/// Largest bin count a histogram may ask for
pub const MAX_BINS: usize = 1_000;

/// Equal-width binning of `[min, max]` into `num_bins` buckets
///
/// `upper_edges` holds the `num_bins - 1` interior edges. For integer
/// domains edges and centers are rounded up.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BinEdges {
    pub min: f64,
    pub max: f64,
    pub num_bins: usize,
    pub width: f64,
    pub upper_edges: Vec<f64>,
    pub integer_domain: bool,
}

impl BinEdges {
    pub fn compute(min: f64, max: f64, num_bins: usize, integer_domain: bool) -> Result<Self, CompileError> {
        if num_bins == 0 {
            return Err(CompileError::MalformedIntent(
                "bin count must be positive".to_string(),
            ));
        }
        if num_bins > MAX_BINS {
            return Err(CompileError::MalformedIntent(format!(
                "bin count {} exceeds the maximum of {}",
                num_bins, MAX_BINS
            )));
        }
        if !min.is_finite() || !max.is_finite() || min > max {
            return Err(CompileError::MalformedIntent(format!(
                "invalid bin range [{}, {}]",
                min, max
            )));
        }

        let width = (max - min) / num_bins as f64;
        let upper_edges = (1..num_bins)
            .map(|e| {
                let edge = min + e as f64 * width;
                if integer_domain {
                    edge.ceil()
                } else {
                    edge
                }
            })
            .collect();

        Ok(Self {
            min,
            max,
            num_bins,
            width,
            upper_edges,
            integer_domain,
        })
    }

    /// One center per bucket, bucket 0 first
    ///
    /// Bucket 0 spans `[min, min + width]`, interior buckets span consecutive
    /// edges, the last bucket spans `[last edge, max]`.
    pub fn centers(&self) -> Vec<f64> {
        let round = |c: f64| if self.integer_domain { c.ceil() } else { c };

        let (first, last) = match (self.upper_edges.first(), self.upper_edges.last()) {
            (Some(_), Some(&last_edge)) => (
                (self.min + self.min + self.width) / 2.0,
                (last_edge + self.max) / 2.0,
            ),
            // single bucket
            _ => return vec![round((self.min + self.max) / 2.0)],
        };

        let mut centers = Vec::with_capacity(self.num_bins);
        centers.push(round(first));
        centers.extend(
            self.upper_edges
                .windows(2)
                .map(|pair| round((pair[0] + pair[1]) / 2.0)),
        );
        centers.push(round(last));
        centers
    }
}

/// Render an `f64` as a SQL numeric literal that is never parsed as an integer
pub(crate) fn sql_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{:.1}", value)
    } else {
        format!("{}", value)
    }
}

/// Edge list as written into a `width_bucket` threshold array
pub(crate) fn edge_literal(value: f64, integer_domain: bool) -> String {
    if integer_domain {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}
