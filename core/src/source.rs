use crate::error::{ConfigError, LookupError};
use crate::index::{DocId, Field, Posting};

/// Per-term posting lookup. Implementations are shared read-only across every
/// concurrent task of every query.
pub trait PostingSource: Send + Sync {
    fn fetch(&self, field: Field, term: &str) -> Result<Vec<Posting>, LookupError>;

    /// Number of documents containing `term` in `field`, when the backend knows it without
    /// reading the posting list. `None` makes scorers use the fetched list's length.
    fn document_frequency(&self, _field: Field, _term: &str) -> Result<Option<u32>, LookupError> {
        Ok(None)
    }
}

/// O(1) per-document scalars plus corpus-wide statistics. Unknown documents
/// yield zero / empty values rather than errors.
pub trait MetadataStore: Send + Sync {
    fn corpus_size(&self) -> u64;
    fn avg_body_length(&self) -> f64;
    fn inv_doc_length(&self, doc: DocId) -> f64;
    fn doc_norm(&self, doc: DocId) -> f64;
    fn title(&self, doc: DocId) -> String;
    fn page_authority(&self, doc: DocId) -> f64;
    fn page_views(&self, doc: DocId) -> u64;
}

/// Corpus size and average body length, captured once and passed by reference into scorers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CorpusStatistics {
    pub num_docs: u64,
    pub avg_doc_len: f64,
}

impl CorpusStatistics {
    pub fn new(num_docs: u64, avg_doc_len: f64) -> Self { Self { num_docs, avg_doc_len } }

    pub fn from_store(store: &dyn MetadataStore) -> Result<Self, ConfigError> {
        let stats = Self::new(store.corpus_size(), store.avg_body_length());
        if !stats.avg_doc_len.is_finite() {
            return Err(ConfigError::Corpus(format!("average body length is {}", stats.avg_doc_len)));
        }
        tracing::debug!(num_docs = stats.num_docs, avg_doc_len = stats.avg_doc_len, "corpus statistics loaded");
        Ok(stats)
    }
}
