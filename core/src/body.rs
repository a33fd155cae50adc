//! Body relevance: cosine-style TF-IDF and BM25 / BM25+.
//!
//! Neither mode applies a query-side factor: the cosine variant skips the query vector
//! norm and BM25 ignores query term frequency (k3 = infinity). Both are constant per query.

use std::sync::Arc;

use crate::accumulator::{distinct_terms, term_counts, TermAccumulator};
use crate::config::Bm25Params;
use crate::error::LookupError;
use crate::index::{sort_ranked, Field, PartialScoreMap, Posting, RankedList};
use crate::source::{CorpusStatistics, MetadataStore, PostingSource};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BodyRanking {
    Cosine,
    Bm25(Bm25Params),
}

#[derive(Clone)]
pub struct BodyScorer {
    source: Arc<dyn PostingSource>,
    meta: Arc<dyn MetadataStore>,
    stats: CorpusStatistics,
}

impl BodyScorer {
    pub fn new(source: Arc<dyn PostingSource>, meta: Arc<dyn MetadataStore>, stats: CorpusStatistics) -> Self {
        Self { source, meta, stats }
    }

    pub fn stats(&self) -> &CorpusStatistics { &self.stats }

    /// Ranked body scores; `top_k == 0` keeps everything.
    pub async fn score<S: AsRef<str>>(&self, terms: &[S], ranking: BodyRanking, max_workers: usize, top_k: usize) -> RankedList {
        match ranking {
            BodyRanking::Cosine => self.cosine(terms, max_workers, top_k).await,
            BodyRanking::Bm25(params) => self.bm25(terms, params, max_workers, top_k).await,
        }
    }

    pub async fn cosine<S: AsRef<str>>(&self, terms: &[S], max_workers: usize, top_k: usize) -> RankedList {
        let counted = term_counts(terms);
        if counted.is_empty() {
            return RankedList::new();
        }
        let source = Arc::clone(&self.source);
        let meta = Arc::clone(&self.meta);
        let stats = self.stats;
        let scores = TermAccumulator::new(max_workers)
            .accumulate(counted, move |(term, qtf)| {
                let Some((postings, df)) = body_postings(source.as_ref(), &term)? else {
                    return Ok(PartialScoreMap::new());
                };
                Ok(cosine_term_scores(&postings, qtf, df, &stats, meta.as_ref()))
            })
            .await;
        sort_ranked(scores, top_k)
    }

    pub async fn bm25<S: AsRef<str>>(&self, terms: &[S], params: Bm25Params, max_workers: usize, top_k: usize) -> RankedList {
        let terms = distinct_terms(terms);
        if terms.is_empty() {
            return RankedList::new();
        }
        if self.stats.avg_doc_len <= 0.0 {
            tracing::warn!(avg_doc_len = self.stats.avg_doc_len, "degenerate corpus, skipping bm25");
            return RankedList::new();
        }
        let source = Arc::clone(&self.source);
        let meta = Arc::clone(&self.meta);
        let stats = self.stats;
        let scores = TermAccumulator::new(max_workers)
            .accumulate(terms, move |term| {
                let Some((postings, df)) = body_postings(source.as_ref(), &term)? else {
                    return Ok(PartialScoreMap::new());
                };
                Ok(bm25_term_scores(&postings, df, &stats, &params, meta.as_ref()))
            })
            .await;
        sort_ranked(scores, top_k)
    }
}

/// One posting-list read per term. `None` when the term occurs nowhere.
fn body_postings(source: &dyn PostingSource, term: &str) -> Result<Option<(Vec<Posting>, u32)>, LookupError> {
    let known = source.document_frequency(Field::Body, term)?;
    if known == Some(0) {
        return Ok(None);
    }
    let postings = source.fetch(Field::Body, term)?;
    let df = known.unwrap_or(postings.len() as u32);
    if df == 0 {
        return Ok(None);
    }
    Ok(Some((postings, df)))
}

/// Smoothed idf: ln((N + 1) / (df + 1)).
pub fn cosine_idf(num_docs: u64, df: u32) -> f64 { ((num_docs as f64 + 1.0) / (df as f64 + 1.0)).ln() }

/// ln(1 + (N - df + 0.5) / (df + 0.5)).
pub fn bm25_idf(num_docs: u64, df: u32) -> f64 {
    let (n, df) = (num_docs as f64, df as f64);
    (1.0 + (n - df + 0.5) / (df + 0.5)).ln()
}

pub fn cosine_term_scores(postings: &[Posting], qtf: u32, df: u32, stats: &CorpusStatistics, meta: &dyn MetadataStore) -> PartialScoreMap {
    let idf = cosine_idf(stats.num_docs, df);
    let qw = qtf as f64;
    let mut out = PartialScoreMap::new();
    for p in postings {
        let inv_len = meta.inv_doc_length(p.doc_id);
        if inv_len == 0.0 {
            continue;
        }
        let norm = meta.doc_norm(p.doc_id);
        if norm == 0.0 {
            continue;
        }
        let dw = p.tf as f64 * inv_len * idf;
        *out.entry(p.doc_id).or_insert(0.0) += qw * dw / norm;
    }
    out
}

pub fn bm25_term_scores(postings: &[Posting], df: u32, stats: &CorpusStatistics, params: &Bm25Params, meta: &dyn MetadataStore) -> PartialScoreMap {
    let idf = bm25_idf(stats.num_docs, df);
    let mut out = PartialScoreMap::new();
    for p in postings {
        let inv_len = meta.inv_doc_length(p.doc_id);
        if inv_len <= 0.0 {
            continue;
        }
        if let Some(score) = bm25_contribution(p.tf as f64, 1.0 / inv_len, stats.avg_doc_len, idf, params) {
            *out.entry(p.doc_id).or_insert(0.0) += score;
        }
    }
    out
}

/// One posting's contribution, or `None` when the saturation denominator is not positive.
pub fn bm25_contribution(tf: f64, dl: f64, avgdl: f64, idf: f64, params: &Bm25Params) -> Option<f64> {
    let norm = (1.0 - params.b) + params.b * (dl / avgdl);
    let denom = tf + params.k1 * norm;
    if denom <= 0.0 {
        return None;
    }
    let base = tf * (params.k1 + 1.0) / denom;
    Some(if params.plus { idf * (base + params.delta) } else { idf * base })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{DocRecord, InMemoryMetadata, InMemoryPostings};
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

    fn everest() -> (BodyScorer, Arc<InMemoryMetadata>) {
        let mut docs: Vec<DocRecord> = (0..1000).map(|d| DocRecord::new(d, "", 500)).collect();
        docs[5].title = "Mount Everest".into();
        let meta = Arc::new(InMemoryMetadata::new(docs).with_avg_body_length(500.0));
        // df comes from posting-list length, so pad with other docs.
        let mount: Vec<(u32, u32)> = std::iter::once((5, 3)).chain((100..109).map(|d| (d, 1))).collect();
        let postings = InMemoryPostings::new()
            .with(Field::Body, "mount", &mount)
            .with(Field::Body, "everest", &[(5, 2), (200, 1)]);
        let stats = CorpusStatistics::from_store(meta.as_ref()).unwrap();
        (BodyScorer::new(Arc::new(postings), meta.clone(), stats), meta)
    }

    #[tokio::test]
    async fn bm25_everest_scenario() {
        let (scorer, _) = everest();
        let params = Bm25Params { k1: 1.8, b: 0.1, plus: false, delta: 1.0 };
        let ranked = scorer.bm25(&["mount", "everest"], params, 4, 0).await;
        let score5 = ranked.iter().find(|(d, _)| *d == 5).map(|(_, s)| *s).unwrap();

        let n = 1000.0f64;
        let idf_mount = (1.0 + (n - 10.0 + 0.5) / 10.5f64).ln();
        let idf_everest = (1.0 + (n - 2.0 + 0.5) / 2.5f64).ln();
        // dl == avgdl, so norm == 1.
        let expected = idf_mount * 3.0 * 2.8 / (3.0 + 1.8) + idf_everest * 2.0 * 2.8 / (2.0 + 1.8);
        assert!((score5 - expected).abs() < 1e-9, "{score5} vs {expected}");
        assert_eq!(ranked[0].0, 5);
    }

    #[tokio::test]
    async fn bm25_plus_adds_delta_per_term() {
        let (scorer, _) = everest();
        let plain = Bm25Params { k1: 1.8, b: 0.1, plus: false, delta: 1.0 };
        let plus = Bm25Params { plus: true, ..plain };
        let a = scorer.bm25(&["everest"], plain, 2, 0).await;
        let b = scorer.bm25(&["everest"], plus, 2, 0).await;
        let idf = bm25_idf(1000, 2);
        assert!((b[0].1 - a[0].1 - idf).abs() < 1e-9);
    }

    #[tokio::test]
    async fn bm25_degenerate_avgdl_is_empty() {
        let meta = Arc::new(InMemoryMetadata::new(vec![DocRecord::new(1, "", 0)]));
        let postings = Arc::new(InMemoryPostings::new().with(Field::Body, "x", &[(1, 1)]));
        let stats = CorpusStatistics::from_store(meta.as_ref()).unwrap();
        let scorer = BodyScorer::new(postings, meta, stats);
        assert!(scorer.bm25(&["x"], Bm25Params::default(), 2, 0).await.is_empty());
    }

    #[tokio::test]
    async fn cosine_uses_query_multiplicity() {
        let (scorer, _) = everest();
        let once = scorer.cosine(&["everest"], 2, 0).await;
        let twice = scorer.cosine(&["everest", "everest"], 2, 0).await;
        let s1 = once.iter().find(|(d, _)| *d == 5).unwrap().1;
        let s2 = twice.iter().find(|(d, _)| *d == 5).unwrap().1;
        assert!((s2 - 2.0 * s1).abs() < 1e-12);
        let expected = 2.0 / 500.0 * cosine_idf(1000, 2);
        assert!((s1 - expected).abs() < 1e-12);
    }

    /// Implements only `fetch` and counts the reads.
    struct FetchOnly {
        inner: InMemoryPostings,
        fetches: AtomicUsize,
    }

    impl PostingSource for FetchOnly {
        fn fetch(&self, field: Field, term: &str) -> Result<Vec<Posting>, LookupError> {
            self.fetches.fetch_add(1, AtomicOrdering::SeqCst);
            self.inner.fetch(field, term)
        }
    }

    #[tokio::test]
    async fn each_term_is_fetched_once() {
        let meta = Arc::new(InMemoryMetadata::new((1..=3).map(|d| DocRecord::new(d, "", 10))));
        let source = Arc::new(FetchOnly {
            inner: InMemoryPostings::new().with(Field::Body, "x", &[(1, 2), (3, 1)]).with(Field::Body, "y", &[(2, 1)]),
            fetches: AtomicUsize::new(0),
        });
        let stats = CorpusStatistics::from_store(meta.as_ref()).unwrap();
        let scorer = BodyScorer::new(source.clone(), meta, stats);

        let ranked = scorer.cosine(&["x"], 2, 0).await;
        assert_eq!(source.fetches.load(AtomicOrdering::SeqCst), 1);
        let expected = 2.0 / 10.0 * cosine_idf(3, 2);
        assert!((ranked[0].1 - expected).abs() < 1e-12);

        scorer.bm25(&["x", "y"], Bm25Params::default(), 2, 0).await;
        assert_eq!(source.fetches.load(AtomicOrdering::SeqCst), 3);
    }

    #[test]
    fn cosine_skips_docs_without_length_or_norm() {
        let mut zero_norm = DocRecord::new(2, "", 10);
        zero_norm.doc_norm = 0.0;
        let meta = InMemoryMetadata::new(vec![DocRecord::new(1, "", 0), zero_norm, DocRecord::new(3, "", 10)]);
        let stats = CorpusStatistics::new(3, 10.0);
        let postings = [Posting::new(1, 1), Posting::new(2, 1), Posting::new(3, 1)];
        let out = cosine_term_scores(&postings, 1, 3, &stats, &meta);
        assert_eq!(out.keys().copied().collect::<Vec<_>>(), vec![3]);
    }

    #[test]
    fn bm25_is_monotone_in_tf() {
        let params = Bm25Params::default();
        let idf = bm25_idf(1000, 10);
        let mut last = 0.0;
        for tf in 0..50 {
            let s = bm25_contribution(tf as f64, 800.0, 500.0, idf, &params).unwrap();
            assert!(s >= last);
            last = s;
        }
    }

    #[test]
    fn non_positive_denominator_is_skipped() {
        let params = Bm25Params { k1: 0.0, b: 0.5, plus: false, delta: 0.0 };
        assert_eq!(bm25_contribution(0.0, 10.0, 10.0, 1.0, &params), None);
    }
}
