//! Query-side value types

use crate::index::hash;

/// Bitmap with all 64 subqueries active, the default for added features.
pub const ALL_SUBQUERIES: u64 = u64::MAX;

/// A boolean feature asserted true by the query. The hash is computed when
/// the feature is added and identifies the posting list to probe.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QueryFeature {
    pub hash: u64,
    pub subquery_bitmap: u64,
}

/// A numeric feature assignment. Hashed per arity level at expansion time,
/// using the index's configured bucketing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QueryRangeFeature {
    pub key: String,
    pub value: i64,
    pub subquery_bitmap: u64,
}

/// A bag of asserted features forming one search request.
///
/// Up to 64 independent boolean evaluations (subqueries) can be batched in
/// one query by tagging features with subquery bitmaps. Duplicate keys are
/// legal; each added feature contributes independently.
#[derive(Clone, Debug, Default)]
pub struct PredicateQuery {
    features: Vec<QueryFeature>,
    range_features: Vec<QueryRangeFeature>,
}

impl PredicateQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_feature(&mut self, key: &str, value: &str) {
        self.add_feature_for_subqueries(key, value, ALL_SUBQUERIES);
    }

    pub fn add_feature_for_subqueries(&mut self, key: &str, value: &str, subquery_bitmap: u64) {
        self.features.push(QueryFeature {
            hash: hash::feature_hash(key, value),
            subquery_bitmap,
        });
    }

    pub fn add_range_feature(&mut self, key: &str, value: i64) {
        self.add_range_feature_for_subqueries(key, value, ALL_SUBQUERIES);
    }

    pub fn add_range_feature_for_subqueries(&mut self, key: &str, value: i64, subquery_bitmap: u64) {
        self.range_features.push(QueryRangeFeature {
            key: key.to_string(),
            value,
            subquery_bitmap,
        });
    }

    pub fn features(&self) -> &[QueryFeature] {
        &self.features
    }

    pub fn range_features(&self) -> &[QueryRangeFeature] {
        &self.range_features
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty() && self.range_features.is_empty()
    }
}
