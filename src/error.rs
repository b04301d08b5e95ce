use thiserror::Error;

/// Main error type for predix operations
#[derive(Error, Debug)]
pub enum PredixError {
    #[error("Duplicate document id: {0}")]
    DuplicateDocId(u32),

    #[error("Document id space exhausted")]
    DocIdSpaceExhausted,

    #[error("Predicate too complex: {0}")]
    PredicateTooComplex(String),

    #[error("Invalid predicate: {0}")]
    InvalidPredicate(String),

    #[error("Unsupported index format version {actual}, expected {expected}")]
    UnsupportedFormatVersion { expected: u32, actual: u32 },

    #[error("Index checksum mismatch: stored {stored:#010x}, computed {computed:#010x}")]
    ChecksumMismatch { stored: u32, computed: u32 },

    #[error("Corrupt index data: {0}")]
    Corrupt(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for predix operations
pub type Result<T> = std::result::Result<T, PredixError>;
