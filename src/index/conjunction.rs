//! Secondary index for multi-feature conjunctions
//!
//! An AND-group of plain features can be indexed as a single conjunction
//! instead of one posting list per member, which keeps per-feature posting
//! lists short for broad targeting predicates. The conjunction index maps
//! each member feature hash to the conjunctions it participates in; at
//! query time a conjunction fires when every member is present in the query
//! and their subquery bitmaps intersect.

use std::collections::{HashMap, HashSet};
use std::io::{Read, Write};

use crate::error::{PredixError, Result};
use crate::index::hash;
use crate::persistence::codec;
use crate::query::QueryFeature;

/// An AND-group of at least two distinct feature hashes, identified by a
/// hash over the sorted member set.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct FeatureConjunction {
    feature_hashes: Vec<u64>,
}

impl FeatureConjunction {
    pub fn new(mut feature_hashes: Vec<u64>) -> Self {
        feature_hashes.sort_unstable();
        feature_hashes.dedup();
        debug_assert!(feature_hashes.len() >= 2);
        Self { feature_hashes }
    }

    pub fn id(&self) -> u64 {
        hash::conjunction_hash(&self.feature_hashes)
    }

    pub fn feature_hashes(&self) -> &[u64] {
        &self.feature_hashes
    }
}

/// A conjunction satisfied by the current query.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ConjunctionHit {
    pub id: u64,
    pub subquery_bitmap: u64,
}

/// Immutable conjunction registry: id -> member feature set, plus an
/// inverted member -> conjunctions map rebuilt on load.
#[derive(Clone, Debug, Default)]
pub struct ConjunctionIndex {
    /// sorted by id for deterministic serialization
    conjunctions: Vec<(u64, Vec<u64>)>,
    by_feature: HashMap<u64, Vec<u32>>,
}

impl ConjunctionIndex {
    fn from_conjunctions(mut conjunctions: Vec<(u64, Vec<u64>)>) -> Self {
        conjunctions.sort_unstable_by_key(|(id, _)| *id);
        let mut by_feature: HashMap<u64, Vec<u32>> = HashMap::new();
        for (idx, (_, members)) in conjunctions.iter().enumerate() {
            for &feature in members {
                by_feature.entry(feature).or_default().push(idx as u32);
            }
        }
        Self {
            conjunctions,
            by_feature,
        }
    }

    pub fn len(&self) -> usize {
        self.conjunctions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conjunctions.is_empty()
    }

    pub fn searcher(&self) -> ConjunctionSearcher<'_> {
        ConjunctionSearcher {
            index: self,
            candidates: HashSet::new(),
        }
    }

    pub fn write_to<W: Write>(&self, w: &mut W) -> Result<()> {
        codec::write_u32(w, self.conjunctions.len() as u32)?;
        for (id, members) in &self.conjunctions {
            codec::write_u64(w, *id)?;
            codec::write_u64_array(w, members)?;
        }
        Ok(())
    }

    pub fn read_from<R: Read>(r: &mut R) -> Result<Self> {
        let count = codec::read_u32(r)? as usize;
        let mut conjunctions = Vec::with_capacity(count);
        for _ in 0..count {
            let id = codec::read_u64(r)?;
            let members = codec::read_u64_array(r)?;
            if members.len() < 2 {
                return Err(PredixError::Corrupt(format!(
                    "conjunction {id:#018x} has fewer than two members"
                )));
            }
            conjunctions.push((id, members));
        }
        Ok(Self::from_conjunctions(conjunctions))
    }
}

/// Per-thread conjunction matcher; owns reusable candidate scratch.
pub struct ConjunctionSearcher<'a> {
    index: &'a ConjunctionIndex,
    candidates: HashSet<u32>,
}

impl ConjunctionSearcher<'_> {
    /// Find every indexed conjunction whose members are all present in the
    /// query. The hit bitmap is the intersection of the member bitmaps
    /// (duplicate query features OR together first), so a conjunction only
    /// fires for subqueries where every member is asserted.
    pub fn search(&mut self, features: &[QueryFeature]) -> Vec<ConjunctionHit> {
        let index = self.index;
        if index.is_empty() || features.is_empty() {
            return Vec::new();
        }

        let mut feature_bitmaps: HashMap<u64, u64> = HashMap::with_capacity(features.len());
        for f in features {
            *feature_bitmaps.entry(f.hash).or_insert(0) |= f.subquery_bitmap;
        }

        self.candidates.clear();
        for hash in feature_bitmaps.keys() {
            if let Some(indices) = index.by_feature.get(hash) {
                self.candidates.extend(indices.iter().copied());
            }
        }

        let mut hits = Vec::new();
        for &idx in &self.candidates {
            let (id, members) = &index.conjunctions[idx as usize];
            let mut bitmap = u64::MAX;
            let mut all_present = true;
            for member in members {
                match feature_bitmaps.get(member) {
                    Some(&b) => bitmap &= b,
                    None => {
                        all_present = false;
                        break;
                    }
                }
            }
            if all_present && bitmap != 0 {
                hits.push(ConjunctionHit {
                    id: *id,
                    subquery_bitmap: bitmap,
                });
            }
        }
        // candidate iteration order is arbitrary; keep output deterministic
        hits.sort_unstable_by_key(|h| h.id);
        hits
    }
}

/// Build-time accumulator keyed by conjunction id.
#[derive(Debug, Default)]
pub struct ConjunctionIndexBuilder {
    conjunctions: HashMap<u64, Vec<u64>>,
}

impl ConjunctionIndexBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a conjunction, returning its id. Registering the same
    /// member set twice is idempotent.
    pub fn insert(&mut self, conjunction: &FeatureConjunction) -> u64 {
        let id = conjunction.id();
        self.conjunctions
            .entry(id)
            .or_insert_with(|| conjunction.feature_hashes().to_vec());
        id
    }

    pub fn build(self) -> ConjunctionIndex {
        ConjunctionIndex::from_conjunctions(self.conjunctions.into_iter().collect())
    }
}
