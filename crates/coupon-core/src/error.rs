//! Error types for the coupon validation core

/// Errors surfaced while configuring or building the membership index.
///
/// Validation itself never fails: a malformed code is an "invalid coupon"
/// outcome, not an error.
#[derive(Debug, thiserror::Error)]
pub enum CouponError {
    /// A source stream could not be opened
    #[error("source {source_name} unavailable: {reason}")]
    SourceUnavailable {
        /// Name of the source that failed
        source_name: String,
        /// Underlying cause
        reason: String,
    },
    /// A source stream could not be decompressed
    #[error("source {source_name} could not be decompressed: {reason}")]
    Decompression {
        /// Name of the source that failed
        source_name: String,
        /// Underlying cause
        reason: String,
    },
    /// Quorum validation needs at least two sources
    #[error("insufficient sources: {available} available, at least {required} required")]
    InsufficientSources {
        /// Minimum number of sources for quorum validation
        required: usize,
        /// Number of sources supplied or successfully ingested
        available: usize,
    },
    /// Only three source bits exist
    #[error("too many sources: {supplied} supplied, at most {max} supported")]
    TooManySources {
        /// Maximum number of sources
        max: usize,
        /// Number of sources supplied
        supplied: usize,
    },
    /// Configuration failed validation
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// Configuration file could not be parsed
    #[error("config parse error: {0}")]
    ConfigParse(String),
    /// I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias for coupon core operations
pub type Result<T> = std::result::Result<T, CouponError>;
