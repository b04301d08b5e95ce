//! Query execution: posting-list assembly and the interval merge engine
//!
//! A search assembles one posting stream per contributing source (plain
//! features, expanded range buckets, the reserved z-star list, satisfied
//! conjunctions, zero-constraint documents), then merges them in ascending
//! internal-id order. Per candidate document the engine runs a coverage
//! DP over the document's slot positions: `covered[0]` starts with all
//! subqueries, every matched interval `[b, e]` propagates
//! `covered[e] |= covered[b - 1] & bitmap`, and the document matches the
//! subqueries left in `covered[interval_end]`. Z-star edges additionally
//! mask out the subqueries that asserted their negated feature.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::index::conjunction::ConjunctionSearcher;
use crate::index::hash;
use crate::index::interval::{self, IntervalWithBounds};
use crate::index::predicate_index::PredicateIndex;
use crate::index::range::RangeBucketer;
use crate::index::simple_index::PostingList;
use crate::query::{PredicateQuery, ALL_SUBQUERIES};

/// A matched document: external id plus the subqueries it matched for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Hit {
    pub doc_id: u32,
    pub subquery_bitmap: u64,
}

impl Hit {
    pub fn new(doc_id: u32, subquery_bitmap: u64) -> Self {
        Self {
            doc_id,
            subquery_bitmap,
        }
    }
}

impl PartialOrd for Hit {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Hit {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // primarily by doc id; the bitmap tiebreak keeps Ord total
        self.doc_id
            .cmp(&other.doc_id)
            .then(self.subquery_bitmap.cmp(&other.subquery_bitmap))
    }
}

#[derive(Clone, Copy, Debug)]
enum StreamKind {
    Interval,
    Bounds { offset: u32 },
    ZStar,
    Conjunction,
    ZeroConstraint,
}

/// Cursor over one posting list, sorted by internal doc id.
struct PostingStream<'a> {
    kind: StreamKind,
    subquery_bitmap: u64,
    doc_ids: &'a [u32],
    entry_refs: &'a [u32],
    pos: usize,
}

impl<'a> PostingStream<'a> {
    fn from_list(kind: StreamKind, subquery_bitmap: u64, list: &'a PostingList) -> Self {
        Self {
            kind,
            subquery_bitmap,
            doc_ids: &list.doc_ids,
            entry_refs: &list.entry_refs,
            pos: 0,
        }
    }

    fn zero_constraint(doc_ids: &'a [u32]) -> Self {
        Self {
            kind: StreamKind::ZeroConstraint,
            subquery_bitmap: ALL_SUBQUERIES,
            doc_ids,
            entry_refs: &[],
            pos: 0,
        }
    }

    fn current(&self) -> Option<u32> {
        self.doc_ids.get(self.pos).copied()
    }

    fn current_ref(&self) -> u32 {
        self.entry_refs.get(self.pos).copied().unwrap_or(0)
    }

    fn advance(&mut self) {
        self.pos += 1;
    }
}

#[derive(Clone, Copy, Debug)]
struct Edge {
    begin: u32,
    end: u32,
    bitmap: u64,
    poison_key: u32,
}

/// Per-thread query executor. Not thread-safe: it owns mutable scratch
/// reused across calls; create one searcher per thread via
/// [`PredicateIndex::searcher`].
pub struct Searcher<'a> {
    index: &'a PredicateIndex,
    bucketer: RangeBucketer,
    conjunction_searcher: ConjunctionSearcher<'a>,
    z_star: u64,
    /// per-document posting-list counts for candidate pruning
    n_posting_lists: Vec<u8>,
    /// coverage DP cells indexed by slot position; cell 0 is pinned to all
    /// subqueries and positions written during evaluation are tracked in
    /// `touched` and zeroed afterwards
    covered: Vec<u64>,
    touched: Vec<u16>,
    edges: Vec<Edge>,
    poison: HashMap<u32, u64>,
}

impl<'a> Searcher<'a> {
    pub(crate) fn new(index: &'a PredicateIndex) -> Self {
        let mut covered = vec![0u64; index.highest_interval_end as usize + 1];
        covered[0] = ALL_SUBQUERIES;
        Self {
            index,
            bucketer: RangeBucketer::new(&index.config),
            conjunction_searcher: index.conjunction_index.searcher(),
            z_star: hash::z_star_hash(),
            n_posting_lists: vec![0; index.internal_to_external.len()],
            covered,
            touched: Vec::new(),
            edges: Vec::new(),
            poison: HashMap::new(),
        }
    }

    /// Execute a query, returning a lazy, single-pass stream of hits in
    /// ascending internal-id order. Dropping the stream early abandons the
    /// remaining merge work.
    pub fn search<'s>(&'s mut self, query: &PredicateQuery) -> Hits<'s, 'a> {
        let index = self.index;
        let mut streams = Vec::new();
        let mut used_hashes = Vec::new();

        for feature in query.features() {
            if let Some(list) = index.interval_index.get(feature.hash) {
                streams.push(PostingStream::from_list(
                    StreamKind::Interval,
                    feature.subquery_bitmap,
                    list,
                ));
                used_hashes.push(feature.hash);
            }
        }

        for range in query.range_features() {
            // must mirror the build-time decomposition exactly; both sides
            // share the bucketer
            for (level, bucket) in self.bucketer.exact_buckets(range.value) {
                let h = hash::range_bucket_hash(&range.key, level, bucket);
                if let Some(list) = index.interval_index.get(h) {
                    streams.push(PostingStream::from_list(
                        StreamKind::Interval,
                        range.subquery_bitmap,
                        list,
                    ));
                    used_hashes.push(h);
                }
            }
            if let Some((bucket, offset)) = self.bucketer.partial_probe(range.value) {
                let h = hash::range_bucket_hash(&range.key, 1, bucket);
                if let Some(list) = index.bounds_index.get(h) {
                    streams.push(PostingStream::from_list(
                        StreamKind::Bounds { offset },
                        range.subquery_bitmap,
                        list,
                    ));
                    used_hashes.push(h);
                }
            }
        }

        // negated constraints ride on one reserved list, probed for every
        // query regardless of its features
        if let Some(list) = index.interval_index.get(self.z_star) {
            streams.push(PostingStream::from_list(
                StreamKind::ZStar,
                ALL_SUBQUERIES,
                list,
            ));
            used_hashes.push(self.z_star);
        }

        for conjunction in self.conjunction_searcher.search(query.features()) {
            if let Some(list) = index.conjunction_interval_index.get(conjunction.id) {
                streams.push(PostingStream::from_list(
                    StreamKind::Conjunction,
                    conjunction.subquery_bitmap,
                    list,
                ));
                used_hashes.push(conjunction.id);
            }
        }

        streams.push(PostingStream::zero_constraint(&index.zero_constraint_docs));

        self.n_posting_lists.fill(0);
        for stream in &streams {
            for &doc in stream.doc_ids {
                let count = &mut self.n_posting_lists[doc as usize];
                *count = count.saturating_add(1);
            }
        }

        index.register_usage(&used_hashes);
        trace!(
            streams = streams.len(),
            features = query.features().len(),
            range_features = query.range_features().len(),
            "assembled posting streams"
        );

        Hits {
            searcher: self,
            streams,
            entries: Vec::new(),
        }
    }

    /// Run the coverage DP for one candidate document.
    fn evaluate(&mut self, doc: u32, entries: &[(StreamKind, u64, u32)]) -> u64 {
        let index = self.index;
        let interval_end = index.interval_ends[doc as usize] as u32;
        if interval_end == 0 {
            return ALL_SUBQUERIES;
        }

        self.edges.clear();
        self.poison.clear();

        for &(kind, bitmap, entry_ref) in entries {
            let blob = index.store.get(entry_ref);
            match kind {
                StreamKind::Interval | StreamKind::Conjunction => {
                    for &iv in blob {
                        if interval::is_z_star(iv) {
                            // poison token: masks the matching z-star edge
                            // for the subqueries asserting this feature
                            *self.poison.entry(iv).or_insert(0) |= bitmap;
                        } else {
                            let (begin, end) = interval::boundaries(iv);
                            self.edges.push(Edge {
                                begin,
                                end,
                                bitmap,
                                poison_key: 0,
                            });
                        }
                    }
                }
                StreamKind::Bounds { offset } => {
                    for pair in blob.chunks_exact(2) {
                        let entry = IntervalWithBounds {
                            interval: pair[0],
                            bounds: pair[1],
                        };
                        if !entry.contains_offset(offset) {
                            continue;
                        }
                        if interval::is_z_star(entry.interval) {
                            *self.poison.entry(entry.interval).or_insert(0) |= bitmap;
                        } else {
                            let (begin, end) = interval::boundaries(entry.interval);
                            self.edges.push(Edge {
                                begin,
                                end,
                                bitmap,
                                poison_key: 0,
                            });
                        }
                    }
                }
                StreamKind::ZStar => {
                    for pair in blob.chunks_exact(2) {
                        let (begin, end) = interval::boundaries(pair[0]);
                        self.edges.push(Edge {
                            begin,
                            end,
                            bitmap,
                            poison_key: pair[1],
                        });
                    }
                }
                StreamKind::ZeroConstraint => unreachable!("handled before evaluation"),
            }
        }

        for edge in &mut self.edges {
            if edge.poison_key != 0 {
                if let Some(&p) = self.poison.get(&edge.poison_key) {
                    edge.bitmap &= !p;
                }
            }
        }
        // ascending begin guarantees covered[begin - 1] is final when read
        self.edges.sort_unstable_by_key(|e| e.begin);

        for i in 0..self.edges.len() {
            let edge = self.edges[i];
            if edge.begin == 0 || edge.end > interval_end {
                continue;
            }
            let reach = self.covered[(edge.begin - 1) as usize] & edge.bitmap;
            if reach != 0 {
                let cell = &mut self.covered[edge.end as usize];
                if *cell == 0 {
                    self.touched.push(edge.end as u16);
                }
                *cell |= reach;
            }
        }

        let result = self.covered[interval_end as usize];
        for &t in &self.touched {
            self.covered[t as usize] = 0;
        }
        self.touched.clear();
        result
    }
}

/// Lazy hit stream; the matching work happens as it is drained.
pub struct Hits<'s, 'a> {
    searcher: &'s mut Searcher<'a>,
    streams: Vec<PostingStream<'a>>,
    entries: Vec<(StreamKind, u64, u32)>,
}

impl Iterator for Hits<'_, '_> {
    type Item = Hit;

    fn next(&mut self) -> Option<Hit> {
        loop {
            let mut doc = u32::MAX;
            for stream in &self.streams {
                if let Some(d) = stream.current() {
                    doc = doc.min(d);
                }
            }
            if doc == u32::MAX {
                return None;
            }

            self.entries.clear();
            let mut zero_constraint = false;
            for stream in &mut self.streams {
                if stream.current() == Some(doc) {
                    match stream.kind {
                        StreamKind::ZeroConstraint => zero_constraint = true,
                        _ => self.entries.push((
                            stream.kind,
                            stream.subquery_bitmap,
                            stream.current_ref(),
                        )),
                    }
                    stream.advance();
                }
            }

            if zero_constraint {
                return Some(Hit::new(
                    self.searcher.index.external_id(doc),
                    ALL_SUBQUERIES,
                ));
            }

            let min_feature = self.searcher.index.min_feature[doc as usize];
            if self.searcher.n_posting_lists[doc as usize] < min_feature {
                continue;
            }

            let bitmap = self.searcher.evaluate(doc, &self.entries);
            if bitmap != 0 {
                return Some(Hit::new(self.searcher.index.external_id(doc), bitmap));
            }
        }
    }
}
