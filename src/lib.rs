//! predix: an interval-encoded boolean predicate index
//!
//! Indexes boolean predicate expressions (AND/OR/NOT trees over named
//! boolean and numeric-range variables) so that, given the set of features
//! a query asserts true, it returns every indexed predicate the assignment
//! satisfies. Used as the document side of reverse / targeting search:
//! documents are the queries, queries are the documents.
//!
//! ```
//! use predix::{Config, Predicate, PredicateIndexBuilder, PredicateQuery};
//!
//! let mut builder = PredicateIndexBuilder::new(Config::default());
//! builder
//!     .index_document(
//!         7,
//!         &Predicate::and(vec![
//!             Predicate::feature("gender", "male"),
//!             Predicate::range("age", 20, 40),
//!         ]),
//!     )
//!     .unwrap();
//! let index = builder.build();
//!
//! let mut query = PredicateQuery::new();
//! query.add_feature("gender", "male");
//! query.add_range_feature("age", 36);
//!
//! let mut searcher = index.searcher();
//! let hits: Vec<_> = searcher.search(&query).collect();
//! assert_eq!(hits.len(), 1);
//! assert_eq!(hits[0].doc_id, 7);
//! ```

pub mod config;
pub mod error;
pub mod index;
pub mod persistence;
pub mod predicate;
pub mod query;

pub use config::{Config, ConfigBuilder};
pub use error::{PredixError, Result};
pub use index::{
    BuilderStats, Hit, Hits, PredicateIndex, PredicateIndexBuilder, Searcher,
};
pub use predicate::{optimize, Predicate};
pub use query::{PredicateQuery, ALL_SUBQUERIES};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
