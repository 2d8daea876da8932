//! Metrics snapshot export

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::Metrics;

/// Point-in-time snapshot of every instrument in a registry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// Counter values
    pub counters: HashMap<String, u64>,
    /// Gauge values
    pub gauges: HashMap<String, i64>,
    /// Histogram summaries
    pub histograms: HashMap<String, HistogramSummary>,
}

/// Summary of a histogram
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistogramSummary {
    /// Mean value
    pub mean: f64,
    /// Total observation count
    pub count: u64,
}

impl MetricsSnapshot {
    /// Capture a snapshot from a registry
    pub fn from_metrics(metrics: &Metrics) -> Self {
        Self {
            counters: metrics.all_counters().into_iter().collect(),
            gauges: metrics.all_gauges().into_iter().collect(),
            histograms: metrics
                .all_histograms()
                .into_iter()
                .map(|(name, mean, count)| (name, HistogramSummary { mean, count }))
                .collect(),
        }
    }

    /// Export as pretty-printed JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Export as compact JSON
    pub fn to_json_compact(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
