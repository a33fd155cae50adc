use std::sync::Arc;

use crate::body::BodyRanking;
use crate::config::{Bm25Params, RankOptions};
use crate::error::ConfigError;
use crate::fusion::HybridRanker;
use crate::index::{DocId, Field, RankedList};
use crate::source::{MetadataStore, PostingSource};
use crate::tokenizer::tokenize;

/// Query-string entry points over one posting source and one metadata store.
#[derive(Clone)]
pub struct SearchEngine {
    ranker: HybridRanker,
    max_workers: usize,
}

impl SearchEngine {
    pub fn new(postings: Arc<dyn PostingSource>, meta: Arc<dyn MetadataStore>) -> Result<Self, ConfigError> {
        Ok(Self { ranker: HybridRanker::new(postings, meta)?, max_workers: RankOptions::default().max_workers })
    }

    /// Concurrency bound for the single-signal searches.
    pub fn with_max_workers(mut self, max_workers: usize) -> Result<Self, ConfigError> {
        if max_workers == 0 {
            return Err(ConfigError::NoWorkers);
        }
        self.max_workers = max_workers;
        Ok(self)
    }

    /// See [`HybridRanker::with_fusion_anchor_field`].
    pub fn with_fusion_anchor_field(mut self, field: Field) -> Self {
        self.ranker = self.ranker.with_fusion_anchor_field(field);
        self
    }

    pub fn ranker(&self) -> &HybridRanker { &self.ranker }

    /// Hybrid search over all five signals.
    pub async fn search(&self, query: &str, options: &RankOptions) -> Result<Vec<(DocId, String)>, ConfigError> {
        let terms = tokenize(query);
        tracing::debug!(query, terms = terms.len(), "hybrid search");
        self.ranker.rank(&terms, options).await
    }

    /// Cosine TF-IDF over the body field.
    pub async fn search_body(&self, query: &str, top_k: usize) -> Vec<(DocId, String)> {
        let terms = tokenize(query);
        if terms.is_empty() {
            return Vec::new();
        }
        let ranked = self.ranker.body().score(&terms, BodyRanking::Cosine, self.max_workers, top_k).await;
        self.with_titles(ranked)
    }

    pub async fn search_body_bm25(&self, query: &str, top_k: usize, params: Bm25Params) -> Result<Vec<(DocId, String)>, ConfigError> {
        params.validate()?;
        let terms = tokenize(query);
        if terms.is_empty() {
            return Ok(Vec::new());
        }
        let ranked = self.ranker.body().score(&terms, BodyRanking::Bm25(params), self.max_workers, top_k).await;
        Ok(self.with_titles(ranked))
    }

    /// Every document whose title matches, by distinct matched terms.
    pub async fn search_title(&self, query: &str) -> Vec<(DocId, String)> {
        let terms = tokenize(query);
        if terms.is_empty() {
            return Vec::new();
        }
        let ranked = self.ranker.title_scorer().score(&terms, self.max_workers).await;
        self.with_titles(ranked)
    }

    /// Every document whose anchor text matches, by distinct matched terms.
    pub async fn search_anchor(&self, query: &str) -> Vec<(DocId, String)> {
        let terms = tokenize(query);
        if terms.is_empty() {
            return Vec::new();
        }
        let ranked = self.ranker.anchor_scorer().score(&terms, self.max_workers).await;
        self.with_titles(ranked)
    }

    pub fn page_authority(&self, ids: &[DocId]) -> Vec<f64> {
        let meta = self.ranker.metadata();
        ids.iter().map(|&d| meta.page_authority(d)).collect()
    }

    pub fn page_views(&self, ids: &[DocId]) -> Vec<u64> {
        let meta = self.ranker.metadata();
        ids.iter().map(|&d| meta.page_views(d)).collect()
    }

    fn with_titles(&self, ranked: RankedList) -> Vec<(DocId, String)> {
        let meta = self.ranker.metadata();
        ranked.into_iter().map(|(doc, _)| (doc, meta.title(doc))).collect()
    }
}
