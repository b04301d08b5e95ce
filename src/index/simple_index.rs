//! Feature-hash keyed posting lists
//!
//! One `SimpleIndex` maps a 64-bit feature hash to a posting list of
//! `(internal doc id, interval blob ref)` pairs. The predicate index keeps
//! three instances: plain intervals, bounds-checked intervals, and
//! conjunction intervals.

use std::collections::HashMap;
use std::io::{Read, Write};

use crate::error::{PredixError, Result};
use crate::index::store::EntryRef;
use crate::persistence::codec;

/// Posting list: parallel arrays sorted by ascending doc id. Internal ids
/// are assigned in insertion order, so build-time appends keep the order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PostingList {
    pub doc_ids: Vec<u32>,
    pub entry_refs: Vec<EntryRef>,
}

impl PostingList {
    pub fn len(&self) -> usize {
        self.doc_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.doc_ids.is_empty()
    }
}

/// Immutable hash-to-posting-list map.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SimpleIndex {
    postings: HashMap<u64, PostingList>,
}

impl SimpleIndex {
    pub fn get(&self, feature_hash: u64) -> Option<&PostingList> {
        self.postings.get(&feature_hash)
    }

    pub fn key_count(&self) -> usize {
        self.postings.len()
    }

    pub fn posting_count(&self) -> usize {
        self.postings.values().map(PostingList::len).sum()
    }

    /// Serialized sorted by feature hash so identical indexes produce
    /// identical bytes.
    pub fn write_to<W: Write>(&self, w: &mut W) -> Result<()> {
        codec::write_u32(w, self.postings.len() as u32)?;
        let mut hashes: Vec<u64> = self.postings.keys().copied().collect();
        hashes.sort_unstable();
        for hash in hashes {
            let list = &self.postings[&hash];
            codec::write_u64(w, hash)?;
            codec::write_u32_array(w, &list.doc_ids)?;
            codec::write_u32_array(w, &list.entry_refs)?;
        }
        Ok(())
    }

    pub fn read_from<R: Read>(r: &mut R) -> Result<Self> {
        let key_count = codec::read_u32(r)? as usize;
        let mut postings = HashMap::with_capacity(key_count);
        for _ in 0..key_count {
            let hash = codec::read_u64(r)?;
            let doc_ids = codec::read_u32_array(r)?;
            let entry_refs = codec::read_u32_array(r)?;
            if doc_ids.len() != entry_refs.len() {
                return Err(PredixError::Corrupt(format!(
                    "posting list for {hash:#018x} has mismatched array lengths"
                )));
            }
            if doc_ids.windows(2).any(|w| w[0] >= w[1]) {
                return Err(PredixError::Corrupt(format!(
                    "posting list for {hash:#018x} is not sorted by doc id"
                )));
            }
            postings.insert(
                hash,
                PostingList {
                    doc_ids,
                    entry_refs,
                },
            );
        }
        Ok(Self { postings })
    }
}

/// Build-time accumulator. Documents must be appended in ascending internal
/// id order, which the index builder guarantees by construction.
#[derive(Debug, Default)]
pub struct SimpleIndexBuilder {
    postings: HashMap<u64, PostingList>,
}

impl SimpleIndexBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, feature_hash: u64, doc_id: u32, entry_ref: EntryRef) {
        let list = self.postings.entry(feature_hash).or_default();
        debug_assert!(list.doc_ids.last().map_or(true, |&last| last < doc_id));
        list.doc_ids.push(doc_id);
        list.entry_refs.push(entry_ref);
    }

    pub fn build(self) -> SimpleIndex {
        SimpleIndex {
            postings: self.postings,
        }
    }
}
