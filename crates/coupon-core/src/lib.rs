#![warn(missing_docs)]

//! Coupon validation core: membership index, quorum validation, result cache
//!
//! Build path:   Source → Decompress → Lines → Candidate codes → Fingerprint → Index
//! Request path: Code → Normalize → Result cache → Index → Quorum → Result cache

pub mod cache;
pub mod codec;
pub mod config;
pub mod engine;
pub mod error;
pub mod fingerprint;
pub mod index;
pub mod ingest;
pub mod metrics;

pub use cache::{CacheStats, ResultCache, DEFAULT_CACHE_CAPACITY};
pub use codec::Compression;
pub use config::{SourceConfig, ValidatorConfig};
pub use engine::{is_valid, ValidationEngine, Verdict, QUORUM};
pub use error::{CouponError, Result};
pub use fingerprint::{fingerprint, normalize, Fingerprint, MAX_CODE_LEN, MIN_CODE_LEN};
pub use index::{MembershipIndex, SourceBit, SourceMask, MAX_SOURCES};
pub use ingest::{
    build_index, ingest_source, BuildReport, FileSource, IngestConfig, MemorySource,
    SourceOpener, SourceReport, SourceStatus, MIN_SOURCES,
};
pub use metrics::{Metric, MetricKind, MetricValue, MetricsSnapshot, ValidatorMetrics};
