//! # fugue-metrics
//!
//! Observability primitives for FugueLedger components.
//!
//! Features:
//! - Counters for monotonic event counts
//! - Gauges for current values (settable and adjustable)
//! - Histograms for latency tracking
//! - JSON snapshot export

#![warn(missing_docs)]
#![warn(clippy::all)]

mod collector;
mod export;
mod histogram;

pub use collector::Metrics;
pub use export::{HistogramSummary, MetricsSnapshot};
pub use histogram::Histogram;

/// Macro for timing a block of code into a histogram (microseconds)
#[macro_export]
macro_rules! timed {
    ($metrics:expr, $name:expr, $block:block) => {{
        let start = std::time::Instant::now();
        let result = $block;
        $metrics.histogram($name, start.elapsed().as_micros() as f64);
        result
    }};
}
