//! Bucket assignment strategies for histogram queries

use vizsql_registry::BucketCapability;

use crate::bins::{edge_literal, sql_number, BinEdges};

/// Renders the per-row bucket index expression, `0..num_bins - 1`
pub trait BucketStrategy: Send + Sync {
    fn bucket_expr(&self, attribute: &str, bins: &BinEdges) -> String;
}

/// `width_bucket(value, thresholds)` over the interior edges
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeWidthBucket;

impl BucketStrategy for NativeWidthBucket {
    fn bucket_expr(&self, attribute: &str, bins: &BinEdges) -> String {
        if bins.upper_edges.is_empty() {
            return "0".to_string();
        }
        let edges = bins
            .upper_edges
            .iter()
            .map(|e| edge_literal(*e, bins.integer_domain))
            .collect::<Vec<_>>()
            .join(",");
        format!("width_bucket({}, '{{{}}}')", attribute, edges)
    }
}

/// `floor((value - min) / width)` clamped to the bucket range
#[derive(Debug, Clone, Copy, Default)]
pub struct ArithmeticBucket;

impl BucketStrategy for ArithmeticBucket {
    fn bucket_expr(&self, attribute: &str, bins: &BinEdges) -> String {
        if bins.width <= 0.0 || bins.num_bins == 1 {
            return "0".to_string();
        }
        format!(
            "LEAST(GREATEST(CAST(FLOOR(({x} - {min}) / {w}) AS INTEGER), 0), {last})",
            x = attribute,
            min = sql_number(bins.min),
            w = sql_number(bins.width),
            last = bins.num_bins - 1
        )
    }
}

pub fn strategy_for(capability: BucketCapability) -> Box<dyn BucketStrategy> {
    match capability {
        BucketCapability::NativeWidthBucket => Box::new(NativeWidthBucket),
        BucketCapability::Arithmetic => Box::new(ArithmeticBucket),
    }
}
