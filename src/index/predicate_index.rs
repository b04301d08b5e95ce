//! The frozen, immutable predicate index
//!
//! Safe for unsynchronized concurrent reads; every searching thread gets
//! its own [`Searcher`](crate::index::searcher::Searcher). The only shared
//! mutable state is the advisory usage-counter cache, which is updated via
//! atomic snapshot swaps.

use std::io::{Read, Write};
use std::sync::Arc;

use tracing::debug;

use crate::config::Config;
use crate::error::{PredixError, Result};
use crate::index::conjunction::ConjunctionIndex;
use crate::index::searcher::Searcher;
use crate::index::simple_index::SimpleIndex;
use crate::index::store::PredicateIntervalStore;
use crate::index::usage::{PostingUsage, UsageCache};
use crate::persistence::codec::{self, Crc32Reader, Crc32Writer};

/// Version tag of the binary container format. Readers reject any other
/// value before touching the remaining fields.
pub const FORMAT_VERSION: u32 = 1;

#[derive(Debug)]
pub struct PredicateIndex {
    pub(crate) config: Config,
    pub(crate) internal_to_external: Vec<u32>,
    pub(crate) min_feature: Vec<u8>,
    pub(crate) interval_ends: Vec<u16>,
    pub(crate) highest_interval_end: u32,
    pub(crate) zero_constraint_docs: Vec<u32>,
    pub(crate) interval_index: SimpleIndex,
    pub(crate) bounds_index: SimpleIndex,
    pub(crate) conjunction_interval_index: SimpleIndex,
    pub(crate) store: PredicateIntervalStore,
    pub(crate) conjunction_index: ConjunctionIndex,
    pub(crate) usage: UsageCache,
}

impl PredicateIndex {
    /// A fresh per-thread searcher bound to this index.
    pub fn searcher(&self) -> Searcher<'_> {
        Searcher::new(self)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn doc_count(&self) -> u32 {
        (self.internal_to_external.len() - 1) as u32
    }

    pub fn zero_constraint_doc_count(&self) -> u32 {
        self.zero_constraint_docs.len() as u32
    }

    pub fn highest_interval_end(&self) -> u32 {
        self.highest_interval_end
    }

    pub(crate) fn external_id(&self, internal: u32) -> u32 {
        self.internal_to_external[internal as usize]
    }

    pub fn register_usage(&self, feature_hashes: &[u64]) {
        self.usage.register_usage(feature_hashes);
    }

    pub fn posting_usage(&self) -> Arc<PostingUsage> {
        self.usage.snapshot()
    }

    pub fn rebuild_posting_list_cache(&self) {
        self.usage.rebuild_posting_list_cache();
    }

    pub fn hot_posting_lists(&self) -> Arc<Vec<(u64, u64)>> {
        self.usage.hot_posting_lists()
    }

    /// Serialize in the fixed container layout, appending a CRC32 of all
    /// preceding bytes.
    pub fn write_to<W: Write>(&self, writer: W) -> Result<()> {
        let mut w = Crc32Writer::new(writer);
        codec::write_u32(&mut w, FORMAT_VERSION)?;
        self.config.write_to(&mut w)?;
        codec::write_u32_array(&mut w, &self.internal_to_external)?;
        codec::write_u8_array(&mut w, &self.min_feature)?;
        codec::write_u16_array(&mut w, &self.interval_ends)?;
        codec::write_u32(&mut w, self.highest_interval_end)?;
        codec::write_u32_array(&mut w, &self.zero_constraint_docs)?;
        self.interval_index.write_to(&mut w)?;
        self.bounds_index.write_to(&mut w)?;
        self.conjunction_interval_index.write_to(&mut w)?;
        self.store.write_to(&mut w)?;
        self.conjunction_index.write_to(&mut w)?;
        let (mut inner, crc) = w.finalize();
        codec::write_u32(&mut inner, crc)?;
        inner.flush()?;
        debug!(
            documents = self.doc_count(),
            "serialized predicate index"
        );
        Ok(())
    }

    pub fn read_from<R: Read>(reader: R) -> Result<Self> {
        let mut r = Crc32Reader::new(reader);
        let version = codec::read_u32(&mut r)?;
        if version != FORMAT_VERSION {
            return Err(PredixError::UnsupportedFormatVersion {
                expected: FORMAT_VERSION,
                actual: version,
            });
        }
        let config = Config::read_from(&mut r)?;
        let internal_to_external = codec::read_u32_array(&mut r)?;
        let min_feature = codec::read_u8_array(&mut r)?;
        let interval_ends = codec::read_u16_array(&mut r)?;
        let highest_interval_end = codec::read_u32(&mut r)?;
        let zero_constraint_docs = codec::read_u32_array(&mut r)?;
        let interval_index = SimpleIndex::read_from(&mut r)?;
        let bounds_index = SimpleIndex::read_from(&mut r)?;
        let conjunction_interval_index = SimpleIndex::read_from(&mut r)?;
        let store = PredicateIntervalStore::read_from(&mut r)?;
        let conjunction_index = ConjunctionIndex::read_from(&mut r)?;
        let (mut inner, computed) = r.finalize();
        let stored = codec::read_u32(&mut inner)?;
        if stored != computed {
            return Err(PredixError::ChecksumMismatch { stored, computed });
        }

        if internal_to_external.is_empty()
            || internal_to_external.len() != min_feature.len()
            || internal_to_external.len() != interval_ends.len()
        {
            return Err(PredixError::Corrupt(
                "per-document arrays have inconsistent lengths".to_string(),
            ));
        }
        let array_len = internal_to_external.len() as u32;
        if zero_constraint_docs
            .iter()
            .any(|&d| d == 0 || d >= array_len)
        {
            return Err(PredixError::Corrupt(
                "zero-constraint doc id out of range".to_string(),
            ));
        }
        // searcher scratch is sized from the recorded maximum
        if interval_ends
            .iter()
            .any(|&e| e as u32 > highest_interval_end)
        {
            return Err(PredixError::Corrupt(
                "interval end exceeds recorded maximum".to_string(),
            ));
        }

        let index = Self {
            config,
            internal_to_external,
            min_feature,
            interval_ends,
            highest_interval_end,
            zero_constraint_docs,
            interval_index,
            bounds_index,
            conjunction_interval_index,
            store,
            conjunction_index,
            usage: UsageCache::new(),
        };
        debug!(documents = index.doc_count(), "loaded predicate index");
        Ok(index)
    }
}
