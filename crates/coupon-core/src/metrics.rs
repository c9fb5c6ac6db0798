//! Prometheus-compatible counters for coupon validation.
//!
//! Counters are updated lock-free from every request thread. The cache and
//! index lookup counters double as instrumentation: a request rejected for
//! its shape never moves them.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// The type of metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    /// A monotonically increasing counter.
    Counter,
    /// A gauge that can go up or down.
    Gauge,
}

/// The value of a metric.
#[derive(Debug, Clone, PartialEq)]
pub enum MetricValue {
    /// A counter value.
    Counter(u64),
    /// A gauge value.
    Gauge(f64),
}

/// A single metric with metadata and value.
#[derive(Debug, Clone, PartialEq)]
pub struct Metric {
    /// The metric name.
    pub name: String,
    /// Help text describing the metric.
    pub help: String,
    /// The kind of metric.
    pub kind: MetricKind,
    /// The metric value.
    pub value: MetricValue,
}

impl Metric {
    fn counter(name: &str, help: &str, value: u64) -> Self {
        Self {
            name: name.to_string(),
            help: help.to_string(),
            kind: MetricKind::Counter,
            value: MetricValue::Counter(value),
        }
    }

    fn gauge(name: &str, help: &str, value: f64) -> Self {
        Self {
            name: name.to_string(),
            help: help.to_string(),
            kind: MetricKind::Gauge,
            value: MetricValue::Gauge(value),
        }
    }
}

/// Validation counters shared by all request threads.
#[derive(Debug, Default)]
pub struct ValidatorMetrics {
    validations: AtomicU64,
    no_coupon: AtomicU64,
    malformed: AtomicU64,
    cache_lookups: AtomicU64,
    cache_hits: AtomicU64,
    index_lookups: AtomicU64,
    accepted: AtomicU64,
    rejected: AtomicU64,
}

impl ValidatorMetrics {
    /// Create a new set of counters, all zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one call into the validator.
    #[inline]
    pub fn record_validation(&self) {
        self.validations.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a request that carried no coupon.
    #[inline]
    pub fn record_no_coupon(&self) {
        self.no_coupon.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a code rejected for its length.
    #[inline]
    pub fn record_malformed(&self) {
        self.malformed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a result cache lookup and whether it hit.
    #[inline]
    pub fn record_cache_lookup(&self, hit: bool) {
        self.cache_lookups.fetch_add(1, Ordering::Relaxed);
        if hit {
            self.cache_hits.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record a membership index lookup.
    #[inline]
    pub fn record_index_lookup(&self) {
        self.index_lookups.fetch_add(1, Ordering::Relaxed);
    }

    /// Record the final decision for a well-formed code.
    #[inline]
    pub fn record_decision(&self, valid: bool) {
        if valid {
            self.accepted.fetch_add(1, Ordering::Relaxed);
        } else {
            self.rejected.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Cache hit ratio. Returns 0.0 before the first lookup.
    pub fn cache_hit_ratio(&self) -> f64 {
        let lookups = self.cache_lookups.load(Ordering::Relaxed);
        if lookups == 0 {
            0.0
        } else {
            self.cache_hits.load(Ordering::Relaxed) as f64 / lookups as f64
        }
    }

    /// Point-in-time copy of every counter.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            validations: self.validations.load(Ordering::Relaxed),
            no_coupon: self.no_coupon.load(Ordering::Relaxed),
            malformed: self.malformed.load(Ordering::Relaxed),
            cache_lookups: self.cache_lookups.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            index_lookups: self.index_lookups.load(Ordering::Relaxed),
            accepted: self.accepted.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            cache_hit_ratio: self.cache_hit_ratio(),
        }
    }

    /// Collect all metrics with Prometheus names and help text.
    pub fn collect(&self) -> Vec<Metric> {
        let s = self.snapshot();
        vec![
            Metric::counter(
                "coupon_validations_total",
                "Total validation requests",
                s.validations,
            ),
            Metric::counter(
                "coupon_no_coupon_total",
                "Requests that carried no coupon code",
                s.no_coupon,
            ),
            Metric::counter(
                "coupon_malformed_total",
                "Codes rejected for their length before any lookup",
                s.malformed,
            ),
            Metric::counter(
                "coupon_cache_lookups_total",
                "Result cache lookups",
                s.cache_lookups,
            ),
            Metric::counter(
                "coupon_cache_hits_total",
                "Result cache lookups that found a decision",
                s.cache_hits,
            ),
            Metric::gauge(
                "coupon_cache_hit_ratio",
                "Result cache hit ratio (hits / lookups)",
                s.cache_hit_ratio,
            ),
            Metric::counter(
                "coupon_index_lookups_total",
                "Membership index lookups",
                s.index_lookups,
            ),
            Metric::counter(
                "coupon_accepted_total",
                "Well-formed codes accepted",
                s.accepted,
            ),
            Metric::counter(
                "coupon_rejected_total",
                "Well-formed codes rejected",
                s.rejected,
            ),
        ]
    }
}

/// A point-in-time snapshot of the validation counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// Total validation requests.
    pub validations: u64,
    /// Requests without a coupon.
    pub no_coupon: u64,
    /// Codes rejected for their length.
    pub malformed: u64,
    /// Result cache lookups.
    pub cache_lookups: u64,
    /// Result cache hits.
    pub cache_hits: u64,
    /// Membership index lookups.
    pub index_lookups: u64,
    /// Accepted well-formed codes.
    pub accepted: u64,
    /// Rejected well-formed codes.
    pub rejected: u64,
    /// Cache hit ratio.
    pub cache_hit_ratio: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn counters_start_at_zero() {
        let m = ValidatorMetrics::new();
        assert_eq!(m.snapshot(), MetricsSnapshot::default());
        assert_eq!(m.cache_hit_ratio(), 0.0);
    }

    #[test]
    fn records_lookups_and_decisions() {
        let m = ValidatorMetrics::new();
        m.record_validation();
        m.record_cache_lookup(false);
        m.record_index_lookup();
        m.record_decision(true);
        m.record_validation();
        m.record_cache_lookup(true);
        m.record_decision(true);
        m.record_validation();
        m.record_malformed();

        let s = m.snapshot();
        assert_eq!(s.validations, 3);
        assert_eq!(s.cache_lookups, 2);
        assert_eq!(s.cache_hits, 1);
        assert_eq!(s.index_lookups, 1);
        assert_eq!(s.accepted, 2);
        assert_eq!(s.malformed, 1);
        assert!((s.cache_hit_ratio - 0.5).abs() < 0.001);
    }

    #[test]
    fn collect_names() {
        let m = ValidatorMetrics::new();
        m.record_no_coupon();
        let metrics = m.collect();
        assert_eq!(metrics.len(), 9);
        let no_coupon = metrics
            .iter()
            .find(|x| x.name == "coupon_no_coupon_total")
            .unwrap();
        assert_eq!(no_coupon.kind, MetricKind::Counter);
        assert_eq!(no_coupon.value, MetricValue::Counter(1));
    }

    #[test]
    fn test_thread_safety() {
        let metrics = Arc::new(ValidatorMetrics::new());
        let mut handles = Vec::new();
        for _ in 0..4 {
            let m = Arc::clone(&metrics);
            handles.push(std::thread::spawn(move || {
                for _ in 0..100 {
                    m.record_validation();
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(metrics.snapshot().validations, 400);
    }
}
