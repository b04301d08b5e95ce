use std::io::{Read, Write};

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::persistence::codec;

/// Immutable tuning parameters for a predicate index.
///
/// `arity` controls how finely numeric ranges are discretized into hash
/// features; higher arity means fewer query-time lookups but more posting
/// entries per document. `lower_bound`/`upper_bound` delimit the
/// representable value range for numeric features, which in turn bounds the
/// number of bucket levels. The same `Config` must be used for building and
/// searching an index.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    pub arity: u32,
    pub lower_bound: i64,
    pub upper_bound: i64,
    pub use_conjunction_algorithm: bool,
}

impl Config {
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Fixed binary layout: u32 arity, i64 lower_bound, i64 upper_bound,
    /// u8 use_conjunction_algorithm. Little endian, no padding.
    pub fn write_to<W: Write>(&self, w: &mut W) -> Result<()> {
        codec::write_u32(w, self.arity)?;
        codec::write_i64(w, self.lower_bound)?;
        codec::write_i64(w, self.upper_bound)?;
        codec::write_bool(w, self.use_conjunction_algorithm)?;
        Ok(())
    }

    pub fn read_from<R: Read>(r: &mut R) -> Result<Self> {
        Ok(Self {
            arity: codec::read_u32(r)?,
            lower_bound: codec::read_i64(r)?,
            upper_bound: codec::read_i64(r)?,
            use_conjunction_algorithm: codec::read_bool(r)?,
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            arity: 8,
            lower_bound: i64::MIN,
            upper_bound: i64::MAX,
            use_conjunction_algorithm: false,
        }
    }
}

/// Builder for [`Config`]. All setters accept any value of the right type;
/// `build()` always succeeds.
#[derive(Clone, Debug, Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn arity(mut self, arity: u32) -> Self {
        self.config.arity = arity;
        self
    }

    pub fn lower_bound(mut self, lower_bound: i64) -> Self {
        self.config.lower_bound = lower_bound;
        self
    }

    pub fn upper_bound(mut self, upper_bound: i64) -> Self {
        self.config.upper_bound = upper_bound;
        self
    }

    pub fn use_conjunction_algorithm(mut self, enabled: bool) -> Self {
        self.config.use_conjunction_algorithm = enabled;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
