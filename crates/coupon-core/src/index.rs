//! Membership index: fingerprint → bitmask of the sources that produced it

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::fingerprint::Fingerprint;

/// Maximum number of ingestion sources (one bit each)
pub const MAX_SOURCES: usize = 3;

/// Single-bit flag identifying one ingestion source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceBit(u8);

impl SourceBit {
    /// Bit for the source at `position` (0, 1 or 2). `None` past the third source.
    pub fn from_position(position: usize) -> Option<Self> {
        if position < MAX_SOURCES {
            Some(Self(1 << position))
        } else {
            None
        }
    }

    /// Position of this source (0-based)
    pub fn position(&self) -> usize {
        self.0.trailing_zeros() as usize
    }

    /// The bit as a mask value
    pub fn mask(&self) -> u8 {
        self.0
    }
}

/// Union of the source bits recorded for one fingerprint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SourceMask(pub u8);

impl SourceMask {
    /// Number of distinct sources in the mask
    pub fn source_count(&self) -> u32 {
        self.0.count_ones()
    }

    /// True if the given source contributed to this record
    pub fn contains(&self, bit: SourceBit) -> bool {
        self.0 & bit.mask() != 0
    }
}

/// Concurrent fingerprint → source mask map, built once then read-only.
///
/// A single reader-writer lock guards the map: concurrent `get` calls share
/// the read side, `add` takes the write side. Splitting the map into shards
/// keyed by a fingerprint prefix would reduce writer contention during
/// parallel ingestion if that ever becomes material.
#[derive(Debug, Default)]
pub struct MembershipIndex {
    records: RwLock<HashMap<Fingerprint, u8>>,
    frozen: AtomicBool,
}

impl MembershipIndex {
    /// Create an empty index
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `bit`'s source produced `fingerprint`. Idempotent.
    ///
    /// Ignored once the index has been frozen.
    pub fn add(&self, fingerprint: Fingerprint, bit: SourceBit) {
        if self.is_frozen() {
            warn!(%fingerprint, source = bit.position(), "add on frozen membership index ignored");
            return;
        }
        let mut records = self.records.write();
        *records.entry(fingerprint).or_insert(0) |= bit.mask();
    }

    /// Source mask for `fingerprint`, or `None` if no source produced it.
    pub fn get(&self, fingerprint: Fingerprint) -> Option<SourceMask> {
        self.records.read().get(&fingerprint).copied().map(SourceMask)
    }

    /// Number of distinct fingerprints recorded
    pub fn size(&self) -> usize {
        self.records.read().len()
    }

    /// True if nothing has been recorded
    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// End the build phase. Every later `add` is dropped.
    pub fn freeze(&self) {
        self.frozen.store(true, Ordering::Release);
    }

    /// True once the build phase has ended
    pub fn is_frozen(&self) -> bool {
        self.frozen.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::fingerprint;
    use std::sync::Arc;

    fn bit(position: usize) -> SourceBit {
        SourceBit::from_position(position).unwrap()
    }

    #[test]
    fn source_bits() {
        assert_eq!(bit(0).mask(), 0b001);
        assert_eq!(bit(2).mask(), 0b100);
        assert_eq!(bit(2).position(), 2);
        assert!(SourceBit::from_position(3).is_none());
    }

    #[test]
    fn add_merges_bits() {
        let index = MembershipIndex::new();
        let fp = fingerprint("SAVE1234");
        index.add(fp, bit(0));
        index.add(fp, bit(2));
        let mask = index.get(fp).unwrap();
        assert_eq!(mask, SourceMask(0b101));
        assert_eq!(mask.source_count(), 2);
        assert!(mask.contains(bit(0)));
        assert!(!mask.contains(bit(1)));
        assert_eq!(index.size(), 1);
    }

    #[test]
    fn add_is_idempotent() {
        let index = MembershipIndex::new();
        let fp = fingerprint("SAVE1234");
        for _ in 0..5 {
            index.add(fp, bit(1));
        }
        assert_eq!(index.get(fp), Some(SourceMask(0b010)));
        assert_eq!(index.size(), 1);
    }

    #[test]
    fn missing_fingerprint() {
        let index = MembershipIndex::new();
        assert!(index.get(fingerprint("NOPE1234")).is_none());
        assert!(index.is_empty());
    }

    #[test]
    fn frozen_index_rejects_adds() {
        let index = MembershipIndex::new();
        index.add(fingerprint("SAVE1234"), bit(0));
        index.freeze();
        index.add(fingerprint("SAVE1234"), bit(1));
        index.add(fingerprint("OTHERCOD"), bit(1));
        assert!(index.is_frozen());
        assert_eq!(index.size(), 1);
        assert_eq!(index.get(fingerprint("SAVE1234")), Some(SourceMask(0b001)));
    }

    #[test]
    fn concurrent_adds_from_three_writers() {
        let index = Arc::new(MembershipIndex::new());
        let mut handles = Vec::new();
        for position in 0..MAX_SOURCES {
            let idx = Arc::clone(&index);
            handles.push(std::thread::spawn(move || {
                for n in 0..1_000u32 {
                    idx.add(fingerprint(&format!("CODE{n:05}")), bit(position));
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(index.size(), 1_000);
        assert_eq!(
            index.get(fingerprint("CODE00042")),
            Some(SourceMask(0b111))
        );
    }
}
