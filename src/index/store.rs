//! Content-addressed store for interval-list blobs
//!
//! Many documents encode to identical interval lists (a single-feature
//! predicate is always `[1..1]`), so posting entries reference deduplicated
//! blobs by a compact u32 ref instead of owning the bytes.

use std::collections::HashMap;
use std::io::{Read, Write};

use crate::error::{PredixError, Result};
use crate::persistence::codec;

/// Reference to one blob inside a [`PredicateIntervalStore`].
pub type EntryRef = u32;

/// Immutable, deduplicated store of u32-word blobs. Entry `i` occupies
/// `data[offsets[i]..offsets[i + 1]]`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PredicateIntervalStore {
    offsets: Vec<u32>,
    data: Vec<u32>,
}

impl PredicateIntervalStore {
    pub fn get(&self, entry_ref: EntryRef) -> &[u32] {
        let i = entry_ref as usize;
        let start = self.offsets[i] as usize;
        let end = self.offsets[i + 1] as usize;
        &self.data[start..end]
    }

    pub fn entry_count(&self) -> usize {
        self.offsets.len().saturating_sub(1)
    }

    pub fn word_count(&self) -> usize {
        self.data.len()
    }

    pub fn write_to<W: Write>(&self, w: &mut W) -> Result<()> {
        codec::write_u32_array(w, &self.offsets)?;
        codec::write_u32_array(w, &self.data)?;
        Ok(())
    }

    pub fn read_from<R: Read>(r: &mut R) -> Result<Self> {
        let offsets = codec::read_u32_array(r)?;
        let data = codec::read_u32_array(r)?;
        if offsets.first().copied() != Some(0) && !offsets.is_empty() {
            return Err(PredixError::Corrupt(
                "interval store offsets must start at 0".to_string(),
            ));
        }
        if offsets.is_empty() || offsets.last().copied() != Some(data.len() as u32) {
            return Err(PredixError::Corrupt(
                "interval store offsets do not cover the data".to_string(),
            ));
        }
        if offsets.windows(2).any(|w| w[0] > w[1]) {
            return Err(PredixError::Corrupt(
                "interval store offsets not monotonic".to_string(),
            ));
        }
        Ok(Self { offsets, data })
    }
}

/// Accumulates blobs during index building, deduplicating by content.
#[derive(Debug, Default)]
pub struct IntervalStoreBuilder {
    offsets: Vec<u32>,
    data: Vec<u32>,
    dedup: HashMap<Vec<u32>, EntryRef>,
}

impl IntervalStoreBuilder {
    pub fn new() -> Self {
        Self {
            offsets: vec![0],
            data: Vec::new(),
            dedup: HashMap::new(),
        }
    }

    /// Insert a blob, returning the ref of an existing identical blob when
    /// one is already stored.
    pub fn insert(&mut self, blob: &[u32]) -> EntryRef {
        if let Some(&entry_ref) = self.dedup.get(blob) {
            return entry_ref;
        }
        let entry_ref = (self.offsets.len() - 1) as EntryRef;
        self.data.extend_from_slice(blob);
        self.offsets.push(self.data.len() as u32);
        self.dedup.insert(blob.to_vec(), entry_ref);
        entry_ref
    }

    pub fn build(self) -> PredicateIntervalStore {
        PredicateIntervalStore {
            offsets: self.offsets,
            data: self.data,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_get() {
        let mut builder = IntervalStoreBuilder::new();
        let a = builder.insert(&[1, 2, 3]);
        let b = builder.insert(&[4]);
        let store = builder.build();
        assert_eq!(store.get(a), &[1, 2, 3]);
        assert_eq!(store.get(b), &[4]);
        assert_eq!(store.entry_count(), 2);
    }

    #[test]
    fn test_dedup_returns_same_ref() {
        let mut builder = IntervalStoreBuilder::new();
        let a = builder.insert(&[7, 8]);
        let b = builder.insert(&[9]);
        let c = builder.insert(&[7, 8]);
        assert_eq!(a, c);
        assert_ne!(a, b);
        assert_eq!(builder.build().entry_count(), 2);
    }

    #[test]
    fn test_empty_blob() {
        let mut builder = IntervalStoreBuilder::new();
        let a = builder.insert(&[]);
        let store = builder.build();
        assert!(store.get(a).is_empty());
    }

    #[test]
    fn test_serialization_roundtrip() {
        let mut builder = IntervalStoreBuilder::new();
        builder.insert(&[1, 2]);
        builder.insert(&[3]);
        let store = builder.build();

        let mut buf = Vec::new();
        store.write_to(&mut buf).unwrap();
        let restored = PredicateIntervalStore::read_from(&mut &buf[..]).unwrap();
        assert_eq!(restored, store);
    }

    #[test]
    fn test_corrupt_offsets_rejected() {
        let store = {
            let mut builder = IntervalStoreBuilder::new();
            builder.insert(&[1, 2]);
            builder.build()
        };
        let mut buf = Vec::new();
        store.write_to(&mut buf).unwrap();
        // truncate the data array length field
        buf[4] = 9;
        assert!(PredicateIntervalStore::read_from(&mut &buf[..]).is_err());
    }
}
