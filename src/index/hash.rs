//! Stable 64-bit feature hashing
//!
//! Posting lists are keyed by hash, and hashes are persisted inside the
//! serialized index, so the hash function must be identical across
//! processes and crate versions. SeaHash with its default keys is
//! deterministic; std's `DefaultHasher` is not guaranteed to be.

use std::hash::Hasher;

use seahash::SeaHasher;

/// Reserved feature key for the compressed negation posting list.
pub const Z_STAR_FEATURE_KEY: &str = "z-star-compressed";

/// Hash of a boolean feature `(key, value)` pair.
///
/// Key and value are length-delimited so that `("ab","c")` and `("a","bc")`
/// hash differently.
pub fn feature_hash(key: &str, value: &str) -> u64 {
    let mut hasher = SeaHasher::new();
    hasher.write_u64(key.len() as u64);
    hasher.write(key.as_bytes());
    hasher.write_u64(value.len() as u64);
    hasher.write(value.as_bytes());
    hasher.finish()
}

/// Hash of one arity-ary range bucket for a numeric feature.
///
/// Build-time range decomposition and query-time expansion must produce
/// identical hashes, so both go through this single function.
pub fn range_bucket_hash(key: &str, level: u8, bucket: i64) -> u64 {
    let mut hasher = SeaHasher::new();
    hasher.write_u64(key.len() as u64);
    hasher.write(key.as_bytes());
    hasher.write_u8(0x52); // range marker, keeps range buckets apart from boolean features
    hasher.write_u8(level);
    hasher.write_i64(bucket);
    hasher.finish()
}

/// Hash of the reserved z-star posting list.
pub fn z_star_hash() -> u64 {
    feature_hash(Z_STAR_FEATURE_KEY, "")
}

/// Identifier of a feature conjunction: a hash over its sorted member
/// hashes. Order-independent because members are sorted before hashing.
pub fn conjunction_hash(sorted_feature_hashes: &[u64]) -> u64 {
    let mut hasher = SeaHasher::new();
    hasher.write_u8(0x43); // conjunction marker
    hasher.write_u64(sorted_feature_hashes.len() as u64);
    for &h in sorted_feature_hashes {
        hasher.write_u64(h);
    }
    hasher.finish()
}
