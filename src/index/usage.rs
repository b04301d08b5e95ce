//! Lock-free posting-list usage statistics
//!
//! Searchers sharing an index record which posting lists their queries
//! touched. The counters are a purely advisory signal (e.g. for deciding
//! which posting lists deserve a warmed cache); they never affect match
//! results, so concurrent rebuilds may race with last-writer-wins.

use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwap;

/// Immutable usage snapshot. Readers hold an `Arc` and never block writers.
#[derive(Clone, Debug, Default)]
pub struct PostingUsage {
    counts: HashMap<u64, u64>,
    total: u64,
}

impl PostingUsage {
    pub fn count(&self, feature_hash: u64) -> u64 {
        self.counts.get(&feature_hash).copied().unwrap_or(0)
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }
}

/// Read-copy-update cache of posting-list usage across all searchers of an
/// index.
#[derive(Debug, Default)]
pub struct UsageCache {
    usage: ArcSwap<PostingUsage>,
    hot: ArcSwap<Vec<(u64, u64)>>,
}

impl UsageCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge observed usage into a fresh snapshot and swap it in.
    pub fn register_usage(&self, feature_hashes: &[u64]) {
        if feature_hashes.is_empty() {
            return;
        }
        self.usage.rcu(|current| {
            let mut next = PostingUsage::clone(current);
            for &hash in feature_hashes {
                *next.counts.entry(hash).or_insert(0) += 1;
                next.total += 1;
            }
            next
        });
    }

    pub fn snapshot(&self) -> Arc<PostingUsage> {
        self.usage.load_full()
    }

    /// Recompute the hot-list ranking from the current snapshot. Racing
    /// calls are benign: each produces a consistent ranking of *some*
    /// recent snapshot.
    pub fn rebuild_posting_list_cache(&self) {
        let snapshot = self.usage.load();
        let mut ranked: Vec<(u64, u64)> = snapshot
            .counts
            .iter()
            .map(|(&hash, &count)| (hash, count))
            .collect();
        ranked.sort_unstable_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        self.hot.store(Arc::new(ranked));
    }

    /// Posting lists ranked by recorded usage, most used first.
    pub fn hot_posting_lists(&self) -> Arc<Vec<(u64, u64)>> {
        self.hot.load_full()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_register_and_snapshot() {
        let cache = UsageCache::new();
        cache.register_usage(&[1, 2, 1]);
        let snap = cache.snapshot();
        assert_eq!(snap.count(1), 2);
        assert_eq!(snap.count(2), 1);
        assert_eq!(snap.count(3), 0);
        assert_eq!(snap.total(), 3);
    }

    #[test]
    fn test_concurrent_merges_are_lossless() {
        let cache = Arc::new(UsageCache::new());
        let mut handles = Vec::new();
        for i in 0..4u64 {
            let cache = Arc::clone(&cache);
            handles.push(thread::spawn(move || {
                for _ in 0..100 {
                    cache.register_usage(&[i]);
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
        let snap = cache.snapshot();
        for i in 0..4u64 {
            assert_eq!(snap.count(i), 100);
        }
        assert_eq!(snap.total(), 400);
    }

    #[test]
    fn test_hot_list_ranking() {
        let cache = UsageCache::new();
        cache.register_usage(&[7, 7, 7, 9]);
        cache.rebuild_posting_list_cache();
        let hot = cache.hot_posting_lists();
        assert_eq!(hot[0], (7, 3));
        assert_eq!(hot[1], (9, 1));
    }
}
