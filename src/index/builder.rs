//! Single-use index builder
//!
//! Accumulates `(doc id, predicate)` pairs into posting lists and parallel
//! per-document arrays, then freezes everything into an immutable
//! [`PredicateIndex`]. The builder is strictly single-threaded and consumed
//! by `build()`, so post-build mutation is unrepresentable.

use roaring::RoaringBitmap;
use tracing::{debug, trace};

use crate::config::Config;
use crate::error::{PredixError, Result};
use crate::index::annotate::{PredicateTreeAnnotations, TreeAnnotator, MAX_TREE_DEPTH};
use crate::index::conjunction::ConjunctionIndexBuilder;
use crate::index::hash;
use crate::index::interval::ZERO_CONSTRAINT_RANGE;
use crate::index::predicate_index::PredicateIndex;
use crate::index::simple_index::SimpleIndexBuilder;
use crate::index::store::IntervalStoreBuilder;
use crate::index::usage::UsageCache;
use crate::predicate::{optimize, Predicate};

/// Aggregate statistics over everything indexed so far.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BuilderStats {
    pub document_count: u32,
    pub zero_constraint_doc_count: u32,
    pub highest_interval_end: u32,
    /// documents carrying compressed-negation postings
    pub z_star_doc_count: u32,
    /// total words across their z-star blobs
    pub z_star_word_count: u64,
}

pub struct PredicateIndexBuilder {
    config: Config,
    annotator: TreeAnnotator,
    z_star: u64,
    seen: RoaringBitmap,
    /// internal id 0 is reserved; all parallel arrays carry a sentinel slot
    internal_to_external: Vec<u32>,
    min_feature: Vec<u8>,
    interval_ends: Vec<u16>,
    zero_constraint_docs: RoaringBitmap,
    interval_index: SimpleIndexBuilder,
    bounds_index: SimpleIndexBuilder,
    conjunction_interval_index: SimpleIndexBuilder,
    conjunction_index: ConjunctionIndexBuilder,
    store: IntervalStoreBuilder,
    stats: BuilderStats,
}

impl PredicateIndexBuilder {
    pub fn new(config: Config) -> Self {
        Self {
            annotator: TreeAnnotator::new(&config),
            z_star: hash::z_star_hash(),
            config,
            seen: RoaringBitmap::new(),
            internal_to_external: vec![0],
            min_feature: vec![0],
            interval_ends: vec![0],
            zero_constraint_docs: RoaringBitmap::new(),
            interval_index: SimpleIndexBuilder::new(),
            bounds_index: SimpleIndexBuilder::new(),
            conjunction_interval_index: SimpleIndexBuilder::new(),
            conjunction_index: ConjunctionIndexBuilder::new(),
            store: IntervalStoreBuilder::new(),
            stats: BuilderStats::default(),
        }
    }

    pub fn with_arity(arity: u32) -> Self {
        Self::new(Config::builder().arity(arity).build())
    }

    pub fn with_bounds(arity: u32, lower_bound: i64, upper_bound: i64) -> Self {
        Self::new(
            Config::builder()
                .arity(arity)
                .lower_bound(lower_bound)
                .upper_bound(upper_bound)
                .build(),
        )
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Index one document. The document id must be unique across the
    /// lifetime of this builder, including ids whose predicates folded to
    /// constant false.
    pub fn index_document(&mut self, doc_id: u32, predicate: &Predicate) -> Result<()> {
        if self.seen.contains(doc_id) {
            return Err(PredixError::DuplicateDocId(doc_id));
        }
        if self.next_internal_id() == u32::MAX {
            return Err(PredixError::DocIdSpaceExhausted);
        }
        if predicate.depth() > MAX_TREE_DEPTH {
            return Err(PredixError::PredicateTooComplex(format!(
                "tree depth exceeds {MAX_TREE_DEPTH}"
            )));
        }

        let optimized = optimize(predicate);
        if optimized == Predicate::False {
            // never matches: occupies no internal id and no posting entry
            self.seen.insert(doc_id);
            trace!(doc_id, "dropped constant-false predicate");
            return Ok(());
        }
        if optimized == Predicate::True {
            self.seen.insert(doc_id);
            let internal = self.push_document(doc_id, 0, ZERO_CONSTRAINT_RANGE);
            self.zero_constraint_docs.insert(internal);
            self.stats.zero_constraint_doc_count += 1;
            trace!(doc_id, internal, "indexed zero-constraint document");
            return Ok(());
        }

        // compile before touching any builder state: a rejected predicate
        // must leave no partial writes behind
        let annotations = self.annotator.annotate(&optimized)?;
        self.seen.insert(doc_id);
        let internal = self.push_document(
            doc_id,
            annotations.min_feature,
            annotations.interval_end,
        );
        self.stats.highest_interval_end = self
            .stats
            .highest_interval_end
            .max(annotations.interval_end as u32);
        self.insert_postings(internal, &annotations);
        trace!(
            doc_id,
            internal,
            interval_end = annotations.interval_end,
            "indexed document"
        );
        Ok(())
    }

    fn next_internal_id(&self) -> u32 {
        self.internal_to_external.len() as u32
    }

    fn push_document(&mut self, doc_id: u32, min_feature: u8, interval_end: u16) -> u32 {
        let internal = self.next_internal_id();
        self.internal_to_external.push(doc_id);
        self.min_feature.push(min_feature);
        self.interval_ends.push(interval_end);
        self.stats.document_count += 1;
        internal
    }

    fn insert_postings(&mut self, internal: u32, annotations: &PredicateTreeAnnotations) {
        let mut hashes: Vec<u64> = annotations.interval_map.keys().copied().collect();
        hashes.sort_unstable();
        for hash in hashes {
            let blob = &annotations.interval_map[&hash];
            let entry_ref = self.store.insert(blob);
            self.interval_index.insert(hash, internal, entry_ref);
            if hash == self.z_star {
                self.stats.z_star_doc_count += 1;
                self.stats.z_star_word_count += blob.len() as u64;
            }
        }

        let mut hashes: Vec<u64> = annotations.bounds_map.keys().copied().collect();
        hashes.sort_unstable();
        let mut blob = Vec::new();
        for hash in hashes {
            blob.clear();
            for entry in &annotations.bounds_map[&hash] {
                blob.push(entry.interval);
                blob.push(entry.bounds);
            }
            let entry_ref = self.store.insert(&blob);
            self.bounds_index.insert(hash, internal, entry_ref);
        }

        for (conjunction, intervals) in &annotations.feature_conjunctions {
            let id = self.conjunction_index.insert(conjunction);
            let entry_ref = self.store.insert(intervals);
            self.conjunction_interval_index.insert(id, internal, entry_ref);
        }
    }

    pub fn stats(&self) -> BuilderStats {
        self.stats
    }

    pub fn document_count(&self) -> u32 {
        self.stats.document_count
    }

    pub fn zero_constraint_doc_count(&self) -> u32 {
        self.stats.zero_constraint_doc_count
    }

    /// Freeze everything into an immutable, concurrently readable index.
    pub fn build(self) -> PredicateIndex {
        debug!(
            documents = self.stats.document_count,
            zero_constraint = self.stats.zero_constraint_doc_count,
            highest_interval_end = self.stats.highest_interval_end,
            "freezing predicate index"
        );
        PredicateIndex {
            config: self.config,
            internal_to_external: self.internal_to_external,
            min_feature: self.min_feature,
            interval_ends: self.interval_ends,
            highest_interval_end: self.stats.highest_interval_end,
            zero_constraint_docs: self.zero_constraint_docs.iter().collect(),
            interval_index: self.interval_index.build(),
            bounds_index: self.bounds_index.build(),
            conjunction_interval_index: self.conjunction_interval_index.build(),
            store: self.store.build(),
            conjunction_index: self.conjunction_index.build(),
            usage: UsageCache::new(),
        }
    }
}
