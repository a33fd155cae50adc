//! Hash-map backed collaborators, used by the CLI snapshot loader and by tests.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::LookupError;
use crate::index::{DocId, Field, Posting};
use crate::source::{MetadataStore, PostingSource};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InMemoryPostings {
    #[serde(default)]
    pub fields: HashMap<Field, HashMap<String, Vec<Posting>>>,
}

impl InMemoryPostings {
    pub fn new() -> Self { Self::default() }

    /// Register a posting list; tuples are (doc_id, tf).
    pub fn insert(&mut self, field: Field, term: &str, postings: &[(DocId, u32)]) {
        let list = postings.iter().map(|&(d, tf)| Posting::new(d, tf)).collect();
        self.fields.entry(field).or_default().insert(term.to_string(), list);
    }

    pub fn with(mut self, field: Field, term: &str, postings: &[(DocId, u32)]) -> Self {
        self.insert(field, term, postings);
        self
    }

    pub fn num_terms(&self, field: Field) -> usize { self.fields.get(&field).map_or(0, |m| m.len()) }
}

impl PostingSource for InMemoryPostings {
    fn fetch(&self, field: Field, term: &str) -> Result<Vec<Posting>, LookupError> {
        let terms = self.fields.get(&field).ok_or(LookupError::MissingField { field })?;
        terms
            .get(term)
            .cloned()
            .ok_or_else(|| LookupError::UnknownTerm { field, term: term.to_string() })
    }

    fn document_frequency(&self, field: Field, term: &str) -> Result<Option<u32>, LookupError> {
        let terms = self.fields.get(&field).ok_or(LookupError::MissingField { field })?;
        Ok(Some(terms.get(term).map_or(0, |p| p.len() as u32)))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocRecord {
    pub doc_id: DocId,
    #[serde(default)]
    pub title: String,
    /// Body length in tokens.
    #[serde(default)]
    pub body_len: u32,
    /// Precomputed body vector norm for cosine scoring.
    #[serde(default)]
    pub doc_norm: f64,
    #[serde(default)]
    pub page_authority: f64,
    #[serde(default)]
    pub page_views: u64,
}

impl DocRecord {
    pub fn new(doc_id: DocId, title: &str, body_len: u32) -> Self {
        Self { doc_id, title: title.to_string(), body_len, doc_norm: 1.0, ..Default::default() }
    }
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryMetadata {
    docs: HashMap<DocId, DocRecord>,
    avg_body_length: f64,
}

impl InMemoryMetadata {
    pub fn new(records: impl IntoIterator<Item = DocRecord>) -> Self {
        let docs: HashMap<DocId, DocRecord> = records.into_iter().map(|r| (r.doc_id, r)).collect();
        let avg_body_length = if docs.is_empty() {
            0.0
        } else {
            docs.values().map(|r| r.body_len as f64).sum::<f64>() / docs.len() as f64
        };
        Self { docs, avg_body_length }
    }

    /// Pin the average body length instead of deriving it from the records.
    pub fn with_avg_body_length(mut self, avgdl: f64) -> Self {
        self.avg_body_length = avgdl;
        self
    }

    pub fn get(&self, doc: DocId) -> Option<&DocRecord> { self.docs.get(&doc) }

    pub fn records(&self) -> impl Iterator<Item = &DocRecord> { self.docs.values() }
}

impl MetadataStore for InMemoryMetadata {
    fn corpus_size(&self) -> u64 { self.docs.len() as u64 }

    fn avg_body_length(&self) -> f64 { self.avg_body_length }

    fn inv_doc_length(&self, doc: DocId) -> f64 {
        match self.docs.get(&doc) {
            Some(r) if r.body_len > 0 => 1.0 / r.body_len as f64,
            _ => 0.0,
        }
    }

    fn doc_norm(&self, doc: DocId) -> f64 { self.docs.get(&doc).map_or(0.0, |r| r.doc_norm) }

    fn title(&self, doc: DocId) -> String { self.docs.get(&doc).map(|r| r.title.clone()).unwrap_or_default() }

    fn page_authority(&self, doc: DocId) -> f64 { self.docs.get(&doc).map_or(0.0, |r| r.page_authority) }

    fn page_views(&self, doc: DocId) -> u64 { self.docs.get(&doc).map_or(0, |r| r.page_views) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_term_is_a_lookup_error() {
        let src = InMemoryPostings::new().with(Field::Title, "rust", &[(1, 1)]);
        assert!(matches!(src.fetch(Field::Title, "go"), Err(LookupError::UnknownTerm { .. })));
        assert!(matches!(src.fetch(Field::Body, "rust"), Err(LookupError::MissingField { .. })));
        assert_eq!(src.document_frequency(Field::Title, "go").unwrap(), Some(0));
        assert_eq!(src.document_frequency(Field::Title, "rust").unwrap(), Some(1));
    }

    #[test]
    fn metadata_defaults_for_unknown_docs() {
        let meta = InMemoryMetadata::new(vec![DocRecord::new(1, "One", 4), DocRecord::new(2, "Two", 0)]);
        assert_eq!(meta.corpus_size(), 2);
        assert_eq!(meta.avg_body_length(), 2.0);
        assert_eq!(meta.inv_doc_length(1), 0.25);
        assert_eq!(meta.inv_doc_length(2), 0.0);
        assert_eq!(meta.inv_doc_length(99), 0.0);
        assert_eq!(meta.title(99), "");
        assert_eq!(meta.page_views(99), 0);
        assert_eq!(meta.page_authority(99), 0.0);
    }
}
