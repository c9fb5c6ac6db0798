//! Quorum validation over the membership index and result cache

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::cache::ResultCache;
use crate::fingerprint::{fingerprint_normalized, is_well_formed, normalize};
use crate::index::MembershipIndex;
use crate::metrics::ValidatorMetrics;

/// Minimum number of independent sources that must share a fingerprint.
///
/// A 32-bit collision confined to one source never reaches this threshold.
pub const QUORUM: u32 = 2;

/// How a validation decision was reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verdict {
    /// Empty input: no coupon supplied, accepted.
    NoCoupon,
    /// Normalized length outside 8..=10, rejected before any lookup.
    Malformed,
    /// Decision served from the result cache.
    Cached(bool),
    /// No source produced the fingerprint.
    Unknown,
    /// Fingerprint seen in fewer than [`QUORUM`] sources.
    BelowQuorum,
    /// Fingerprint seen in at least [`QUORUM`] sources.
    Quorum,
}

impl Verdict {
    /// The boolean decision
    pub fn is_valid(&self) -> bool {
        match self {
            Verdict::NoCoupon | Verdict::Quorum => true,
            Verdict::Malformed | Verdict::Unknown | Verdict::BelowQuorum => false,
            Verdict::Cached(valid) => *valid,
        }
    }
}

fn evaluate(
    index: &MembershipIndex,
    cache: &ResultCache,
    metrics: &ValidatorMetrics,
    raw: &str,
) -> Verdict {
    metrics.record_validation();
    let code = normalize(raw);
    if code.is_empty() {
        metrics.record_no_coupon();
        return Verdict::NoCoupon;
    }
    if !is_well_formed(&code) {
        metrics.record_malformed();
        return Verdict::Malformed;
    }

    let cached = cache.get(&code);
    metrics.record_cache_lookup(cached.is_some());
    if let Some(valid) = cached {
        metrics.record_decision(valid);
        return Verdict::Cached(valid);
    }

    let fp = fingerprint_normalized(&code);
    metrics.record_index_lookup();
    let verdict = match index.get(fp) {
        None => Verdict::Unknown,
        Some(mask) if mask.source_count() >= QUORUM => Verdict::Quorum,
        Some(_) => Verdict::BelowQuorum,
    };
    trace!(%fp, ?verdict, "index decision");

    let valid = verdict.is_valid();
    metrics.record_decision(valid);
    cache.set(code, valid);
    verdict
}

/// Validate `raw` against `index`, caching the decision in `cache`.
pub fn is_valid(index: &MembershipIndex, cache: &ResultCache, raw: &str) -> bool {
    evaluate(index, cache, &ValidatorMetrics::new(), raw).is_valid()
}

/// Validation front end shared by all request handlers.
///
/// Holds only handles to the frozen index, the cache and the counters, so
/// it is cheap to clone into each task.
#[derive(Debug, Clone)]
pub struct ValidationEngine {
    index: Arc<MembershipIndex>,
    cache: Arc<ResultCache>,
    metrics: Arc<ValidatorMetrics>,
}

impl ValidationEngine {
    /// Build an engine over a finished index.
    pub fn new(index: Arc<MembershipIndex>, cache: Arc<ResultCache>) -> Self {
        Self::with_metrics(index, cache, Arc::new(ValidatorMetrics::new()))
    }

    /// Build an engine recording into existing counters.
    pub fn with_metrics(
        index: Arc<MembershipIndex>,
        cache: Arc<ResultCache>,
        metrics: Arc<ValidatorMetrics>,
    ) -> Self {
        Self {
            index,
            cache,
            metrics,
        }
    }

    /// Decide `raw` and report how the decision was reached.
    pub fn validate(&self, raw: &str) -> Verdict {
        evaluate(&self.index, &self.cache, &self.metrics, raw)
    }

    /// True if `raw` is absent or shared by at least [`QUORUM`] sources.
    pub fn is_valid(&self, raw: &str) -> bool {
        self.validate(raw).is_valid()
    }

    /// The membership index
    pub fn index(&self) -> &Arc<MembershipIndex> {
        &self.index
    }

    /// The result cache
    pub fn cache(&self) -> &Arc<ResultCache> {
        &self.cache
    }

    /// The validation counters
    pub fn metrics(&self) -> &Arc<ValidatorMetrics> {
        &self.metrics
    }
}
