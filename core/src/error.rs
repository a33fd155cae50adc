use thiserror::Error;

use crate::index::Field;

/// Failure of a single collaborator lookup. The ranking path never propagates these;
/// a failed term or signal contributes nothing.
#[derive(Debug, Clone, Error)]
pub enum LookupError {
    #[error("term {term:?} not found in {field} index")]
    UnknownTerm { field: Field, term: String },
    #[error("{field} index has no postings source")]
    MissingField { field: Field },
    #[error("backend unavailable: {0}")]
    Unavailable(String),
    #[error("failed to decode postings for {term:?}: {reason}")]
    Decode { term: String, reason: String },
}

/// Invalid configuration. This is the one class of error that aborts instead of degrading.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("weight for {signal} must be finite and non-negative, got {value}")]
    InvalidWeight { signal: &'static str, value: f64 },
    #[error("max_workers must be at least 1")]
    NoWorkers,
    #[error("bm25 parameter {name} out of range: {value}")]
    Bm25Param { name: &'static str, value: f64 },
    #[error("corpus statistics are not usable: {0}")]
    Corpus(String),
    #[error("unknown signal {0:?}")]
    UnknownSignal(String),
}
