//! Predicate tree to interval compilation
//!
//! Compiles an optimized predicate tree into the per-document annotations
//! the index builder consumes: interval assignments per feature hash,
//! bounds-checked intervals for partially covered range buckets, extracted
//! feature conjunctions, and the `min_feature`/`interval_end` scalars.
//!
//! Interval assignment follows the classic scheme: a document's predicate
//! owns slot positions `1..=interval_end`; AND children split the parent's
//! slot range, OR children each span it fully, and a leaf marks its whole
//! assigned range. At search time a document matches the subqueries whose
//! matched intervals chain from slot 0 to `interval_end`.
//!
//! Negated leaves compile to entries in the reserved z-star posting list:
//! `(edge, poison_key)` pairs where the edge spans the leaf's slot range
//! and the poison key is a per-document token. The negated feature's own
//! posting list carries the same token, so a query asserting the feature
//! "poisons" exactly that edge for the asserting subqueries, while absent
//! features leave the edge unconditionally passable. A negated range is a
//! conjunction of negated buckets, one chained slot per bucket.

use std::collections::HashMap;

use crate::config::Config;
use crate::error::{PredixError, Result};
use crate::index::conjunction::FeatureConjunction;
use crate::index::hash;
use crate::index::interval::{self, IntervalWithBounds, MAX_INTERVAL_END};
use crate::index::range::{RangeBucketer, RangeCover};
use crate::predicate::Predicate;

/// Maximum predicate tree depth accepted for compilation.
pub const MAX_TREE_DEPTH: usize = 128;

/// Output of compiling one document's predicate.
#[derive(Clone, Debug, Default)]
pub struct PredicateTreeAnnotations {
    pub min_feature: u8,
    pub interval_end: u16,
    /// feature hash -> packed intervals. The reserved z-star hash maps to
    /// `(edge, poison_key)` pairs instead of plain intervals.
    pub interval_map: HashMap<u64, Vec<u32>>,
    /// feature hash -> bounds-checked intervals for partial range buckets.
    pub bounds_map: HashMap<u64, Vec<IntervalWithBounds>>,
    pub feature_conjunctions: Vec<(FeatureConjunction, Vec<u32>)>,
}

/// Compiles optimized predicate trees into annotations. One annotator is
/// shared across all documents of a builder; it carries no per-document
/// state.
#[derive(Clone, Debug)]
pub struct TreeAnnotator {
    bucketer: RangeBucketer,
    use_conjunctions: bool,
    z_star: u64,
}

/// Lowered tree: hashes resolved, ranges decomposed, constants folded into
/// `Free` (always satisfiable) / `Dead` (never satisfiable) leaves.
struct LNode {
    kind: LKind,
    children: Vec<LNode>,
    size: u32,
    min_feature: u32,
}

enum LKind {
    Feature(u64),
    Range(HashedCover),
    NotFeature(u64),
    NotRange(HashedCover),
    Conjunction(FeatureConjunction),
    Free,
    Dead,
    And,
    Or,
}

struct HashedCover {
    exacts: Vec<u64>,
    partials: Vec<(u64, u32, u32)>,
}

impl HashedCover {
    fn bucket_count(&self) -> usize {
        self.exacts.len() + self.partials.len()
    }
}

struct AssignCtx {
    interval_map: HashMap<u64, Vec<u32>>,
    bounds_map: HashMap<u64, Vec<IntervalWithBounds>>,
    conjunctions: Vec<(FeatureConjunction, Vec<u32>)>,
    next_poison: u32,
    z_star: u64,
}

impl AssignCtx {
    /// Unique per-document poison token, encoded as a z-star interval so it
    /// is distinguishable from positional entries in any posting blob.
    fn next_poison_key(&mut self) -> Result<u32> {
        let end = self.next_poison;
        if end > MAX_INTERVAL_END {
            return Err(PredixError::PredicateTooComplex(
                "negation key space exhausted".to_string(),
            ));
        }
        self.next_poison += 1;
        Ok(interval::pack_z_star(1, end))
    }
}

impl TreeAnnotator {
    pub fn new(config: &Config) -> Self {
        Self {
            bucketer: RangeBucketer::new(config),
            use_conjunctions: config.use_conjunction_algorithm,
            z_star: hash::z_star_hash(),
        }
    }

    /// Compile an optimized, non-constant predicate. The caller (the index
    /// builder) handles constant-true/false roots before calling this.
    pub fn annotate(&self, predicate: &Predicate) -> Result<PredicateTreeAnnotations> {
        if predicate.depth() > MAX_TREE_DEPTH {
            return Err(PredixError::PredicateTooComplex(format!(
                "tree depth exceeds {MAX_TREE_DEPTH}"
            )));
        }

        let mut root = self.lower(predicate)?;
        analyze(&mut root);

        if root.size > MAX_INTERVAL_END {
            return Err(PredixError::PredicateTooComplex(format!(
                "interval end {} exceeds {}",
                root.size, MAX_INTERVAL_END
            )));
        }
        let min_feature = root.min_feature.max(1);
        if min_feature > u8::MAX as u32 {
            return Err(PredixError::PredicateTooComplex(format!(
                "min feature {min_feature} exceeds {}",
                u8::MAX
            )));
        }

        let mut ctx = AssignCtx {
            interval_map: HashMap::new(),
            bounds_map: HashMap::new(),
            conjunctions: Vec::new(),
            next_poison: 2, // poison keys are z-star packed (1, n) with n >= 2
            z_star: self.z_star,
        };
        self.assign(&root, interval::INTERVAL_BEGIN, root.size, &mut ctx)?;

        Ok(PredicateTreeAnnotations {
            min_feature: min_feature as u8,
            interval_end: root.size as u16,
            interval_map: ctx.interval_map,
            bounds_map: ctx.bounds_map,
            feature_conjunctions: ctx.conjunctions,
        })
    }

    fn hashed_cover(&self, key: &str, cover: &RangeCover) -> Result<HashedCover> {
        for p in &cover.partials {
            if p.high_offset > 0xFFFF {
                return Err(PredixError::PredicateTooComplex(
                    "arity too large for 16-bit bounds offsets".to_string(),
                ));
            }
        }
        Ok(HashedCover {
            exacts: cover
                .exacts
                .iter()
                .map(|&(level, bucket)| hash::range_bucket_hash(key, level, bucket))
                .collect(),
            partials: cover
                .partials
                .iter()
                .map(|p| {
                    (
                        hash::range_bucket_hash(key, 1, p.bucket),
                        p.low_offset,
                        p.high_offset,
                    )
                })
                .collect(),
        })
    }

    fn lower(&self, predicate: &Predicate) -> Result<LNode> {
        match predicate {
            Predicate::True | Predicate::False => Err(PredixError::InvalidPredicate(
                "constant nodes must be folded away before annotation".to_string(),
            )),
            Predicate::Feature { key, value } => {
                Ok(leaf(LKind::Feature(hash::feature_hash(key, value))))
            }
            Predicate::Range { key, from, to } => {
                let cover = self.bucketer.cover(*from, *to);
                if cover.is_empty() {
                    // no representable value can fall inside: unsatisfiable
                    Ok(leaf(LKind::Dead))
                } else {
                    Ok(leaf(LKind::Range(self.hashed_cover(key, &cover)?)))
                }
            }
            Predicate::Not(child) => match child.as_ref() {
                Predicate::Feature { key, value } => {
                    Ok(leaf(LKind::NotFeature(hash::feature_hash(key, value))))
                }
                Predicate::Range { key, from, to } => {
                    let cover = self.bucketer.cover(*from, *to);
                    if cover.is_empty() {
                        // negation of an unsatisfiable range always holds
                        Ok(leaf(LKind::Free))
                    } else {
                        Ok(leaf(LKind::NotRange(self.hashed_cover(key, &cover)?)))
                    }
                }
                _ => Err(PredixError::InvalidPredicate(
                    "negation not pushed down to a leaf".to_string(),
                )),
            },
            Predicate::And(children) => {
                let mut lowered = Vec::with_capacity(children.len());
                for child in children {
                    let node = self.lower(child)?;
                    match node.kind {
                        // a dead conjunct kills the whole conjunction
                        LKind::Dead => return Ok(leaf(LKind::Dead)),
                        LKind::Free => {}
                        _ => lowered.push(node),
                    }
                }
                if self.use_conjunctions {
                    lowered = extract_conjunction(lowered);
                }
                Ok(combine(LKind::And, lowered, LKind::Free))
            }
            Predicate::Or(children) => {
                let mut lowered = Vec::with_capacity(children.len());
                for child in children {
                    let node = self.lower(child)?;
                    match node.kind {
                        // a free disjunct makes the whole disjunction free
                        LKind::Free => return Ok(leaf(LKind::Free)),
                        LKind::Dead => {}
                        _ => lowered.push(node),
                    }
                }
                Ok(combine(LKind::Or, lowered, LKind::Dead))
            }
        }
    }

    fn assign(&self, node: &LNode, begin: u32, end: u32, ctx: &mut AssignCtx) -> Result<()> {
        debug_assert!(begin <= end);
        match &node.kind {
            LKind::Feature(h) => {
                ctx.interval_map
                    .entry(*h)
                    .or_default()
                    .push(interval::pack(begin, end));
            }
            LKind::Range(cover) => {
                // all buckets share the leaf's range: any one matching
                // covers it (OR semantics)
                let iv = interval::pack(begin, end);
                for h in &cover.exacts {
                    ctx.interval_map.entry(*h).or_default().push(iv);
                }
                for &(h, lo, hi) in &cover.partials {
                    ctx.bounds_map
                        .entry(h)
                        .or_default()
                        .push(IntervalWithBounds::new(iv, lo, hi));
                }
            }
            LKind::Conjunction(fc) => {
                let iv = interval::pack(begin, end);
                match ctx.conjunctions.iter_mut().find(|(c, _)| c == fc) {
                    Some((_, intervals)) => intervals.push(iv),
                    None => ctx.conjunctions.push((fc.clone(), vec![iv])),
                }
            }
            LKind::Free => {
                let z = ctx.interval_map.entry(ctx.z_star).or_default();
                z.push(interval::pack(begin, end));
                z.push(0); // unpoisoned edge
            }
            LKind::Dead => {}
            LKind::NotFeature(h) => {
                let key = ctx.next_poison_key()?;
                ctx.interval_map.entry(*h).or_default().push(key);
                let z = ctx.interval_map.entry(ctx.z_star).or_default();
                z.push(interval::pack(begin, end));
                z.push(key);
            }
            LKind::NotRange(cover) => {
                // one chained slot per negated bucket: the edge for bucket i
                // is only passable when that bucket is not asserted
                let count = cover.bucket_count() as u32;
                let mut cur = begin;
                let mut slot = 0u32;
                let emit = |h: u64,
                                partial: Option<(u32, u32)>,
                                cur: &mut u32,
                                slot: &mut u32,
                                ctx: &mut AssignCtx|
                 -> Result<()> {
                    let slot_end = if *slot == count - 1 { end } else { *cur };
                    let key = ctx.next_poison_key()?;
                    match partial {
                        None => ctx.interval_map.entry(h).or_default().push(key),
                        Some((lo, hi)) => ctx
                            .bounds_map
                            .entry(h)
                            .or_default()
                            .push(IntervalWithBounds::new(key, lo, hi)),
                    }
                    let z = ctx.interval_map.entry(ctx.z_star).or_default();
                    z.push(interval::pack(*cur, slot_end));
                    z.push(key);
                    *cur = slot_end + 1;
                    *slot += 1;
                    Ok(())
                };
                for h in &cover.exacts {
                    emit(*h, None, &mut cur, &mut slot, ctx)?;
                }
                for &(h, lo, hi) in &cover.partials {
                    emit(h, Some((lo, hi)), &mut cur, &mut slot, ctx)?;
                }
            }
            LKind::And => {
                let mut cur = begin;
                let last = node.children.len() - 1;
                for (i, child) in node.children.iter().enumerate() {
                    let child_end = if i == last { end } else { cur + child.size - 1 };
                    self.assign(child, cur, child_end, ctx)?;
                    cur = child_end + 1;
                }
            }
            LKind::Or => {
                for child in &node.children {
                    self.assign(child, begin, end, ctx)?;
                }
            }
        }
        Ok(())
    }
}

fn leaf(kind: LKind) -> LNode {
    LNode {
        kind,
        children: Vec::new(),
        size: 0,
        min_feature: 0,
    }
}

/// Collapse an inner node whose children folded away or down to one.
fn combine(kind: LKind, children: Vec<LNode>, empty: LKind) -> LNode {
    match children.len() {
        0 => leaf(empty),
        1 => children.into_iter().next().unwrap(),
        _ => LNode {
            kind,
            children,
            size: 0,
            min_feature: 0,
        },
    }
}

/// Replace two or more plain feature children of an AND with a single
/// conjunction pseudo-leaf.
fn extract_conjunction(children: Vec<LNode>) -> Vec<LNode> {
    let mut features = Vec::new();
    let mut rest = Vec::new();
    for child in children {
        match child.kind {
            LKind::Feature(h) => features.push(h),
            _ => rest.push(child),
        }
    }
    features.sort_unstable();
    features.dedup();
    match features.len() {
        0 => {}
        1 => rest.push(leaf(LKind::Feature(features[0]))),
        _ => rest.push(leaf(LKind::Conjunction(FeatureConjunction::new(features)))),
    }
    rest
}

/// Bottom-up size and min-feature computation.
///
/// `size` is the number of slot positions the subtree occupies: AND sums,
/// OR takes the maximum (children span the parent range), leaves take one
/// slot per required chain step. `min_feature` is a lower bound on the
/// number of posting lists that reference the document for any matching
/// query; negated and free leaves count zero because the z-star list covers
/// them all.
fn analyze(node: &mut LNode) {
    match &node.kind {
        LKind::Feature(_) | LKind::Range(_) | LKind::Conjunction(_) => {
            node.size = 1;
            node.min_feature = 1;
        }
        LKind::NotFeature(_) | LKind::Free | LKind::Dead => {
            node.size = 1;
            node.min_feature = 0;
        }
        LKind::NotRange(cover) => {
            node.size = cover.bucket_count() as u32;
            node.min_feature = 0;
        }
        LKind::And => {
            node.size = 0;
            node.min_feature = 0;
            for child in &mut node.children {
                analyze(child);
                node.size += child.size;
                node.min_feature = node.min_feature.saturating_add(child.min_feature);
            }
        }
        LKind::Or => {
            node.size = 0;
            node.min_feature = u32::MAX;
            for child in &mut node.children {
                analyze(child);
                node.size = node.size.max(child.size);
                node.min_feature = node.min_feature.min(child.min_feature);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::hash::{feature_hash, z_star_hash};
    use crate::predicate::optimize;

    fn annotator() -> TreeAnnotator {
        TreeAnnotator::new(&Config::default())
    }

    fn annotate(p: &Predicate) -> PredicateTreeAnnotations {
        annotator().annotate(&optimize(p)).unwrap()
    }

    #[test]
    fn test_single_feature() {
        let a = annotate(&Predicate::feature("a", "1"));
        assert_eq!(a.min_feature, 1);
        assert_eq!(a.interval_end, 1);
        assert_eq!(
            a.interval_map[&feature_hash("a", "1")],
            vec![interval::pack(1, 1)]
        );
        assert!(a.bounds_map.is_empty());
    }

    #[test]
    fn test_and_splits_or_spans() {
        let p = Predicate::and(vec![
            Predicate::feature("a", "1"),
            Predicate::or(vec![Predicate::feature("b", "2"), Predicate::feature("c", "3")]),
        ]);
        let a = annotate(&p);
        assert_eq!(a.interval_end, 2);
        assert_eq!(a.min_feature, 2);
        assert_eq!(
            a.interval_map[&feature_hash("a", "1")],
            vec![interval::pack(1, 1)]
        );
        // both OR branches span the second slot
        assert_eq!(
            a.interval_map[&feature_hash("b", "2")],
            vec![interval::pack(2, 2)]
        );
        assert_eq!(
            a.interval_map[&feature_hash("c", "3")],
            vec![interval::pack(2, 2)]
        );
    }

    #[test]
    fn test_negated_feature_emits_poisoned_edge() {
        let p = Predicate::and(vec![
            Predicate::feature("a", "1"),
            Predicate::feature("b", "2").negate(),
        ]);
        let a = annotate(&p);
        assert_eq!(a.interval_end, 2);
        assert_eq!(a.min_feature, 1);

        // the negated feature's posting carries a z-star-marked token
        let tokens = &a.interval_map[&feature_hash("b", "2")];
        assert_eq!(tokens.len(), 1);
        assert!(interval::is_z_star(tokens[0]));

        // the reserved list carries (edge, token) with the same token
        let z = &a.interval_map[&z_star_hash()];
        assert_eq!(z.len(), 2);
        assert_eq!(z[0], interval::pack(2, 2));
        assert_eq!(z[1], tokens[0]);
    }

    #[test]
    fn test_or_of_negations_gets_distinct_tokens() {
        let p = Predicate::or(vec![
            Predicate::feature("a", "1").negate(),
            Predicate::feature("b", "2").negate(),
        ]);
        let a = annotate(&p);
        assert_eq!(a.interval_end, 1);
        let ta = a.interval_map[&feature_hash("a", "1")][0];
        let tb = a.interval_map[&feature_hash("b", "2")][0];
        assert_ne!(ta, tb);
        let z = &a.interval_map[&z_star_hash()];
        assert_eq!(z, &vec![interval::pack(1, 1), ta, interval::pack(1, 1), tb]);
    }

    #[test]
    fn test_range_buckets_share_the_leaf_slot() {
        let a = annotate(&Predicate::range("age", 10, 20));
        assert_eq!(a.interval_end, 1);
        assert_eq!(a.min_feature, 1);
        assert!(a.interval_map.is_empty());
        // arity 8: [10,20] is two partial buckets
        let total: usize = a.bounds_map.values().map(Vec::len).sum();
        assert_eq!(total, 2);
        for entries in a.bounds_map.values() {
            for e in entries {
                assert_eq!(interval::boundaries(e.interval), (1, 1));
            }
        }
    }

    #[test]
    fn test_negated_range_chains_buckets() {
        let p = Predicate::range("age", 10, 20).negate();
        let a = annotate(&p);
        // two buckets, one chained slot each
        assert_eq!(a.interval_end, 2);
        let z = &a.interval_map[&z_star_hash()];
        assert_eq!(z.len(), 4);
        assert_eq!(z[0], interval::pack(1, 1));
        assert_eq!(z[2], interval::pack(2, 2));
        // bounds posting entries are poison tokens, not positional intervals
        for entries in a.bounds_map.values() {
            for e in entries {
                assert!(interval::is_z_star(e.interval));
            }
        }
    }

    #[test]
    fn test_conjunction_extraction() {
        let config = Config::builder().use_conjunction_algorithm(true).build();
        let annotator = TreeAnnotator::new(&config);
        let p = optimize(&Predicate::and(vec![
            Predicate::feature("a", "1"),
            Predicate::feature("b", "2"),
            Predicate::range("age", 0, 7),
        ]));
        let a = annotator.annotate(&p).unwrap();
        assert_eq!(a.feature_conjunctions.len(), 1);
        let (fc, intervals) = &a.feature_conjunctions[0];
        assert_eq!(fc.feature_hashes().len(), 2);
        assert_eq!(intervals.len(), 1);
        // the two features moved into the conjunction
        assert!(!a.interval_map.contains_key(&feature_hash("a", "1")));
        // conjunction + range leaf
        assert_eq!(a.interval_end, 2);
    }

    #[test]
    fn test_min_feature_overflow_rejected() {
        let children: Vec<Predicate> = (0..300)
            .map(|i| Predicate::feature("k", i.to_string()))
            .collect();
        let err = annotator()
            .annotate(&optimize(&Predicate::and(children)))
            .unwrap_err();
        assert!(matches!(err, PredixError::PredicateTooComplex(_)));
    }

    #[test]
    fn test_depth_limit() {
        let mut p = Predicate::feature("a", "1");
        for i in 0..(MAX_TREE_DEPTH + 10) {
            p = Predicate::and(vec![p, Predicate::feature("d", i.to_string())]);
        }
        let err = annotator().annotate(&p).unwrap_err();
        assert!(matches!(err, PredixError::PredicateTooComplex(_)));
    }
}
