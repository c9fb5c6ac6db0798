//! Code normalization and 32-bit FNV-1a fingerprints
//!
//! Ingestion and validation both reach the hash through
//! [`fingerprint_normalized`], so a code indexed at build time always maps to
//! the same fingerprint at query time.
//!
//! The fingerprint is deliberately 32 bits wide: tens of millions of codes fit
//! in a few hundred megabytes of index. Distinct codes may collide; the quorum
//! rule in [`crate::engine`] filters collisions that land in a single source.

use serde::{Deserialize, Serialize};

/// Shortest well-formed coupon code, in bytes
pub const MIN_CODE_LEN: usize = 8;
/// Longest well-formed coupon code, in bytes
pub const MAX_CODE_LEN: usize = 10;

const FNV32_OFFSET: u32 = 0x811c_9dc5;
const FNV32_PRIME: u32 = 0x0100_0193;

/// 32-bit fingerprint of a normalized coupon code. Not reversible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Fingerprint(pub u32);

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:08x}", self.0)
    }
}

/// Trim surrounding whitespace and uppercase.
pub fn normalize(raw: &str) -> String {
    raw.trim().to_uppercase()
}

/// True if a normalized code has an acceptable length, measured in bytes.
pub fn is_well_formed(normalized: &str) -> bool {
    (MIN_CODE_LEN..=MAX_CODE_LEN).contains(&normalized.len())
}

/// FNV-1a 32-bit hash of a byte slice
fn fnv1a_32(data: &[u8]) -> u32 {
    data.iter()
        .fold(FNV32_OFFSET, |h, &b| (h ^ b as u32).wrapping_mul(FNV32_PRIME))
}

/// Fingerprint a code that is already normalized.
pub fn fingerprint_normalized(normalized: &str) -> Fingerprint {
    Fingerprint(fnv1a_32(normalized.as_bytes()))
}

/// Normalize then fingerprint a raw code.
pub fn fingerprint(code: &str) -> Fingerprint {
    fingerprint_normalized(&normalize(code))
}
