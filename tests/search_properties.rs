//! End-to-end property tests for the predicate index
//!
//! Covers the externally observable contract: constant predicates,
//! conjunction semantics across subqueries, range matching, and builder
//! error behavior.

use predix::{
    Config, Hit, Predicate, PredicateIndex, PredicateIndexBuilder, PredicateQuery, PredixError,
    ALL_SUBQUERIES,
};

fn collect_hits(index: &PredicateIndex, query: &PredicateQuery) -> Vec<Hit> {
    let mut searcher = index.searcher();
    let mut hits: Vec<Hit> = searcher.search(query).collect();
    hits.sort();
    hits
}

#[test]
fn constant_true_matches_any_query() {
    let mut builder = PredicateIndexBuilder::new(Config::default());
    builder.index_document(42, &Predicate::True).unwrap();
    let index = builder.build();
    assert_eq!(index.zero_constraint_doc_count(), 1);

    let empty = PredicateQuery::new();
    assert_eq!(
        collect_hits(&index, &empty),
        vec![Hit::new(42, ALL_SUBQUERIES)]
    );

    let mut nonsense = PredicateQuery::new();
    nonsense.add_feature("no", "such-feature");
    nonsense.add_range_feature("nothing", 123);
    assert_eq!(
        collect_hits(&index, &nonsense),
        vec![Hit::new(42, ALL_SUBQUERIES)]
    );
}

#[test]
fn constant_false_is_a_no_op() {
    let mut builder = PredicateIndexBuilder::new(Config::default());
    builder.index_document(1, &Predicate::False).unwrap();
    builder
        .index_document(2, &Predicate::feature("a", "1"))
        .unwrap();
    // a tree that folds to false counts too
    builder
        .index_document(
            3,
            &Predicate::and(vec![Predicate::feature("a", "1"), Predicate::False]),
        )
        .unwrap();
    let index = builder.build();

    assert_eq!(index.doc_count(), 1);
    assert_eq!(index.zero_constraint_doc_count(), 0);

    let mut query = PredicateQuery::new();
    query.add_feature("a", "1");
    let hits = collect_hits(&index, &query);
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].doc_id, 2);
}

#[test]
fn duplicate_external_id_is_rejected() {
    let mut builder = PredicateIndexBuilder::new(Config::default());
    builder
        .index_document(9, &Predicate::feature("a", "1"))
        .unwrap();
    let err = builder
        .index_document(9, &Predicate::feature("b", "2"))
        .unwrap_err();
    assert!(matches!(err, PredixError::DuplicateDocId(9)));
}

#[test]
fn conjunction_requires_both_features_in_the_same_subquery() {
    for use_conjunctions in [false, true] {
        let config = Config::builder()
            .use_conjunction_algorithm(use_conjunctions)
            .build();
        let mut builder = PredicateIndexBuilder::new(config);
        builder
            .index_document(
                1,
                &Predicate::and(vec![
                    Predicate::feature("a", "1"),
                    Predicate::feature("b", "2"),
                ]),
            )
            .unwrap();
        let index = builder.build();

        // only a: no match
        let mut only_a = PredicateQuery::new();
        only_a.add_feature("a", "1");
        assert!(
            collect_hits(&index, &only_a).is_empty(),
            "conjunctions={use_conjunctions}"
        );

        // a on bit 0, b on bit 1: no subquery sees both, so no match
        let mut disjoint = PredicateQuery::new();
        disjoint.add_feature_for_subqueries("a", "1", 0b01);
        disjoint.add_feature_for_subqueries("b", "2", 0b10);
        assert!(
            collect_hits(&index, &disjoint).is_empty(),
            "conjunctions={use_conjunctions}"
        );

        // overlap on bit 0 only: exactly bit 0 reported
        let mut overlapping = PredicateQuery::new();
        overlapping.add_feature_for_subqueries("a", "1", 0b01);
        overlapping.add_feature_for_subqueries("b", "2", 0b11);
        assert_eq!(
            collect_hits(&index, &overlapping),
            vec![Hit::new(1, 0b01)],
            "conjunctions={use_conjunctions}"
        );
    }
}

#[test]
fn range_example_from_the_contract() {
    // arity=8, index `age in [10,20]` at doc 1
    let mut builder = PredicateIndexBuilder::with_arity(8);
    builder
        .index_document(1, &Predicate::range("age", 10, 20))
        .unwrap();
    let index = builder.build();

    let mut at_15 = PredicateQuery::new();
    at_15.add_range_feature("age", 15);
    assert_eq!(collect_hits(&index, &at_15).len(), 1);

    let mut at_25 = PredicateQuery::new();
    at_25.add_range_feature("age", 25);
    assert!(collect_hits(&index, &at_25).is_empty());
}

#[test]
fn too_complex_predicate_is_rejected_not_truncated() {
    let mut builder = PredicateIndexBuilder::new(Config::default());
    let children: Vec<Predicate> = (0..256)
        .map(|i| Predicate::feature("k", i.to_string()))
        .collect();
    let err = builder
        .index_document(1, &Predicate::and(children))
        .unwrap_err();
    assert!(matches!(err, PredixError::PredicateTooComplex(_)));
    assert_eq!(builder.document_count(), 0);
}

#[test]
fn mixed_corpus_search() {
    let mut builder = PredicateIndexBuilder::new(Config::default());
    builder
        .index_document(
            10,
            &Predicate::and(vec![
                Predicate::feature("gender", "male"),
                Predicate::range("age", 20, 30),
            ]),
        )
        .unwrap();
    builder
        .index_document(
            20,
            &Predicate::or(vec![
                Predicate::feature("gender", "female"),
                Predicate::range("age", 20, 30),
            ]),
        )
        .unwrap();
    builder.index_document(30, &Predicate::True).unwrap();
    builder
        .index_document(40, &Predicate::feature("gender", "male").negate())
        .unwrap();
    let index = builder.build();

    // male, 25: matches 10 (and), 20 (via age), 30 (always); not 40
    let mut query = PredicateQuery::new();
    query.add_feature("gender", "male");
    query.add_range_feature("age", 25);
    let ids: Vec<u32> = collect_hits(&index, &query)
        .iter()
        .map(|h| h.doc_id)
        .collect();
    assert_eq!(ids, vec![10, 20, 30]);

    // female, 50: matches 20 (gender), 30, 40 (not male)
    let mut query = PredicateQuery::new();
    query.add_feature("gender", "female");
    query.add_range_feature("age", 50);
    let ids: Vec<u32> = collect_hits(&index, &query)
        .iter()
        .map(|h| h.doc_id)
        .collect();
    assert_eq!(ids, vec![20, 30, 40]);

    // empty query: 30 (always) and 40 (absence satisfies the negation)
    let ids: Vec<u32> = collect_hits(&index, &PredicateQuery::new())
        .iter()
        .map(|h| h.doc_id)
        .collect();
    assert_eq!(ids, vec![30, 40]);
}

#[test]
fn batched_subqueries_evaluate_independently() {
    let mut builder = PredicateIndexBuilder::new(Config::default());
    builder
        .index_document(1, &Predicate::feature("color", "red"))
        .unwrap();
    builder
        .index_document(2, &Predicate::feature("color", "blue"))
        .unwrap();
    let index = builder.build();

    // subquery 0 asserts red, subquery 1 asserts blue
    let mut query = PredicateQuery::new();
    query.add_feature_for_subqueries("color", "red", 0b01);
    query.add_feature_for_subqueries("color", "blue", 0b10);
    let hits = collect_hits(&index, &query);
    assert_eq!(hits, vec![Hit::new(1, 0b01), Hit::new(2, 0b10)]);
}

#[test]
fn usage_statistics_accumulate_across_searchers() {
    let mut builder = PredicateIndexBuilder::new(Config::default());
    builder
        .index_document(1, &Predicate::feature("a", "1"))
        .unwrap();
    let index = builder.build();

    let mut query = PredicateQuery::new();
    query.add_feature("a", "1");

    let mut s1 = index.searcher();
    let _: Vec<Hit> = s1.search(&query).collect();
    let mut s2 = index.searcher();
    let _: Vec<Hit> = s2.search(&query).collect();

    let usage = index.posting_usage();
    assert_eq!(usage.total(), 2);

    index.rebuild_posting_list_cache();
    let hot = index.hot_posting_lists();
    assert_eq!(hot.len(), 1);
    assert_eq!(hot[0].1, 2);
}
