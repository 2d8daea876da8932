//! Metrics registry

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::Histogram;

/// Thread-safe metrics registry
///
/// Instruments are created on first use; recording on an existing
/// instrument takes only the read lock.
pub struct Metrics {
    histograms: RwLock<HashMap<String, Arc<Histogram>>>,
    counters: RwLock<HashMap<String, Arc<AtomicU64>>>,
    gauges: RwLock<HashMap<String, Arc<AtomicI64>>>,
}

impl Metrics {
    /// Create a new metrics registry
    pub fn new() -> Self {
        Self {
            histograms: RwLock::new(HashMap::new()),
            counters: RwLock::new(HashMap::new()),
            gauges: RwLock::new(HashMap::new()),
        }
    }

    /// Record a histogram observation
    pub fn histogram(&self, name: &str, value: f64) {
        if let Some(h) = self.histograms.read().get(name) {
            h.observe(value);
            return;
        }
        self.histograms
            .write()
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Histogram::new()))
            .observe(value);
    }

    /// Increment a counter
    pub fn counter(&self, name: &str, delta: u64) {
        if let Some(c) = self.counters.read().get(name) {
            c.fetch_add(delta, Ordering::Relaxed);
            return;
        }
        self.counters
            .write()
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(AtomicU64::new(0)))
            .fetch_add(delta, Ordering::Relaxed);
    }

    /// Set a gauge to an absolute value
    pub fn gauge(&self, name: &str, value: i64) {
        if let Some(g) = self.gauges.read().get(name) {
            g.store(value, Ordering::Relaxed);
            return;
        }
        self.gauges
            .write()
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(AtomicI64::new(0)))
            .store(value, Ordering::Relaxed);
    }

    /// Adjust a gauge by a signed delta
    pub fn gauge_add(&self, name: &str, delta: i64) {
        if let Some(g) = self.gauges.read().get(name) {
            g.fetch_add(delta, Ordering::Relaxed);
            return;
        }
        self.gauges
            .write()
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(AtomicI64::new(0)))
            .fetch_add(delta, Ordering::Relaxed);
    }

    /// Get counter value
    pub fn get_counter(&self, name: &str) -> Option<u64> {
        self.counters
            .read()
            .get(name)
            .map(|c| c.load(Ordering::Relaxed))
    }

    /// Get gauge value
    pub fn get_gauge(&self, name: &str) -> Option<i64> {
        self.gauges
            .read()
            .get(name)
            .map(|g| g.load(Ordering::Relaxed))
    }

    /// Get histogram mean for a metric
    pub fn get_histogram_mean(&self, name: &str) -> Option<f64> {
        self.histograms.read().get(name).map(|h| h.mean())
    }

    /// All counter names and values
    pub fn all_counters(&self) -> Vec<(String, u64)> {
        self.counters
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.load(Ordering::Relaxed)))
            .collect()
    }

    /// All gauge names and values
    pub fn all_gauges(&self) -> Vec<(String, i64)> {
        self.gauges
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.load(Ordering::Relaxed)))
            .collect()
    }

    /// All histogram names with mean and observation count
    pub fn all_histograms(&self) -> Vec<(String, f64, u64)> {
        self.histograms
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.mean(), v.total_count()))
            .collect()
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_accumulates() {
        let metrics = Metrics::new();
        metrics.counter("txpool/admitted", 1);
        metrics.counter("txpool/admitted", 2);
        assert_eq!(metrics.get_counter("txpool/admitted"), Some(3));
        assert_eq!(metrics.get_counter("missing"), None);
    }

    #[test]
    fn test_gauge_set_and_add() {
        let metrics = Metrics::new();
        metrics.gauge("txpool/pending", 42);
        assert_eq!(metrics.get_gauge("txpool/pending"), Some(42));
        metrics.gauge_add("txpool/pending", -10);
        assert_eq!(metrics.get_gauge("txpool/pending"), Some(32));
        metrics.gauge_add("fresh", 7);
        assert_eq!(metrics.get_gauge("fresh"), Some(7));
    }

    #[test]
    fn test_histogram_mean() {
        let metrics = Metrics::new();
        metrics.histogram("reorg_us", 100.0);
        metrics.histogram("reorg_us", 200.0);
        assert_eq!(metrics.get_histogram_mean("reorg_us"), Some(150.0));
    }

    #[test]
    fn test_timed_macro() {
        let metrics = Metrics::new();
        let out = crate::timed!(metrics, "block_us", { 21 * 2 });
        assert_eq!(out, 42);
        assert!(metrics.get_histogram_mean("block_us").is_some());
    }
}
