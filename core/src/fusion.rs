//! Hybrid ranking: body (BM25), title and anchor match counts, authority and popularity,
//! each min-max normalised over the candidate set and linearly combined.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio::task::JoinError;

use crate::accumulator::distinct_terms;
use crate::body::BodyScorer;
use crate::config::{RankOptions, Weights};
use crate::error::ConfigError;
use crate::index::{DocId, Field, RankedList};
use crate::match_count::MatchCountScorer;
use crate::normalize::{min_max, select_top_k};
use crate::source::{CorpusStatistics, MetadataStore, PostingSource};

/// Raw per-signal scores for one query, keyed by document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SignalScores {
    pub body: HashMap<DocId, f64>,
    pub title: HashMap<DocId, f64>,
    pub anchor: HashMap<DocId, f64>,
    pub authority: HashMap<DocId, f64>,
    pub popularity: HashMap<DocId, f64>,
}

impl SignalScores {
    /// Union of the documents retrieved by the three text signals, ascending.
    pub fn candidates(&self) -> Vec<DocId> {
        let set: BTreeSet<DocId> = self.body.keys().chain(self.title.keys()).chain(self.anchor.keys()).copied().collect();
        set.into_iter().collect()
    }
}

#[derive(Clone)]
pub struct HybridRanker {
    body: BodyScorer,
    title: MatchCountScorer,
    anchor: MatchCountScorer,
    /// Anchor signal used inside fusion; the plain anchor scorer unless overridden.
    fusion_anchor: MatchCountScorer,
    meta: Arc<dyn MetadataStore>,
}

impl HybridRanker {
    /// One posting source serving all three fields.
    pub fn new(postings: Arc<dyn PostingSource>, meta: Arc<dyn MetadataStore>) -> Result<Self, ConfigError> {
        let stats = CorpusStatistics::from_store(meta.as_ref())?;
        let body = BodyScorer::new(Arc::clone(&postings), Arc::clone(&meta), stats);
        let title = MatchCountScorer::title(Arc::clone(&postings));
        Ok(Self::from_parts(body, title, MatchCountScorer::anchor(postings), meta))
    }

    pub fn from_parts(body: BodyScorer, title: MatchCountScorer, anchor: MatchCountScorer, meta: Arc<dyn MetadataStore>) -> Self {
        let fusion_anchor = anchor.clone();
        Self { body, title, anchor, fusion_anchor, meta }
    }

    /// Fuse the anchor signal from `field` (e.g. [`Field::LinkedAnchor`]) instead of the
    /// plain anchor field. Single-signal anchor search is unaffected.
    pub fn with_fusion_anchor_field(mut self, field: Field) -> Self {
        self.fusion_anchor = self.anchor.with_field(field);
        self
    }

    pub fn body(&self) -> &BodyScorer { &self.body }

    pub fn title_scorer(&self) -> &MatchCountScorer { &self.title }

    pub fn anchor_scorer(&self) -> &MatchCountScorer { &self.anchor }

    pub fn fusion_anchor_scorer(&self) -> &MatchCountScorer { &self.fusion_anchor }

    pub fn metadata(&self) -> &Arc<dyn MetadataStore> { &self.meta }

    /// Top `options.top_k` documents with their titles.
    pub async fn rank<S: AsRef<str>>(&self, terms: &[S], options: &RankOptions) -> Result<Vec<(DocId, String)>, ConfigError> {
        let scored = self.rank_scored(terms, options).await?;
        Ok(scored.into_iter().map(|(doc, _)| (doc, self.meta.title(doc))).collect())
    }

    /// Top `options.top_k` documents with their fused scores.
    pub async fn rank_scored<S: AsRef<str>>(&self, terms: &[S], options: &RankOptions) -> Result<RankedList, ConfigError> {
        let weights = options.validate()?;
        let terms = distinct_terms(terms);
        if terms.is_empty() {
            return Ok(RankedList::new());
        }
        let signals = self.collect_signals(terms, options).await;
        let candidates = signals.candidates();
        let fused = fuse(&signals, &candidates, &weights, options.top_k);
        tracing::debug!(candidates = candidates.len(), returned = fused.len(), "hybrid ranking done");
        Ok(fused)
    }

    /// Run the two retrieval stages and return every raw signal.
    pub async fn collect_signals(&self, terms: Vec<String>, options: &RankOptions) -> SignalScores {
        let workers = options.max_workers;

        let body_task = {
            let scorer = self.body.clone();
            let terms = terms.clone();
            let (params, k) = (options.bm25, options.body_k);
            tokio::spawn(async move { scorer.bm25(&terms, params, workers, k).await })
        };
        let title_task = {
            let scorer = self.title.clone();
            let terms = terms.clone();
            tokio::spawn(async move { scorer.score(&terms, workers).await })
        };
        let anchor_task = {
            let scorer = self.fusion_anchor.clone();
            tokio::spawn(async move { scorer.score(&terms, workers).await })
        };
        let (body, title, anchor) = tokio::join!(body_task, title_task, anchor_task);

        let body = signal_or_empty("body", body);
        let mut title = signal_or_empty("title", title);
        let mut anchor = signal_or_empty("anchor", anchor);
        if options.title_k > 0 {
            title.truncate(options.title_k);
        }
        if options.anchor_k > 0 {
            anchor.truncate(options.anchor_k);
        }

        let mut signals = SignalScores {
            body: body.into_iter().collect(),
            title: title.into_iter().collect(),
            anchor: anchor.into_iter().collect(),
            ..Default::default()
        };
        let candidates = signals.candidates();
        if candidates.is_empty() {
            return signals;
        }

        let candidates = Arc::new(candidates);
        let authority_task = {
            let meta = Arc::clone(&self.meta);
            let ids = Arc::clone(&candidates);
            tokio::task::spawn_blocking(move || authority_scores(meta.as_ref(), &ids))
        };
        let popularity_task = {
            let meta = Arc::clone(&self.meta);
            let ids = Arc::clone(&candidates);
            let use_log = options.use_log_for_views;
            tokio::task::spawn_blocking(move || popularity_scores(meta.as_ref(), &ids, use_log))
        };
        let (authority, popularity) = tokio::join!(authority_task, popularity_task);
        signals.authority = signal_or_empty("authority", authority);
        signals.popularity = signal_or_empty("popularity", popularity);
        signals
    }
}

fn signal_or_empty<T: Default>(signal: &str, joined: Result<T, JoinError>) -> T {
    joined.unwrap_or_else(|err| {
        tracing::warn!(signal, error = %err, "signal failed, treating as empty");
        T::default()
    })
}

/// ln(1 + authority) for every candidate. Values where the log is undefined or
/// infinite (authority <= -1, NaN, infinity) score 0.0.
pub fn authority_scores(meta: &dyn MetadataStore, candidates: &[DocId]) -> HashMap<DocId, f64> {
    candidates.iter().map(|&d| (d, log_authority(meta.page_authority(d)))).collect()
}

fn log_authority(authority: f64) -> f64 {
    let score = authority.ln_1p();
    if score.is_finite() { score } else { 0.0 }
}

/// Page views for every candidate, optionally ln(1 + x) compressed.
pub fn popularity_scores(meta: &dyn MetadataStore, candidates: &[DocId], use_log: bool) -> HashMap<DocId, f64> {
    candidates
        .iter()
        .map(|&d| {
            let views = meta.page_views(d) as f64;
            (d, if use_log { views.ln_1p() } else { views })
        })
        .collect()
}

/// Normalise each signal, combine with `weights`, keep the best `top_k`.
/// A signal that did not retrieve a candidate contributes 0.0 for it.
pub fn fuse(signals: &SignalScores, candidates: &[DocId], weights: &Weights, top_k: usize) -> RankedList {
    if candidates.is_empty() {
        return RankedList::new();
    }
    let normalized = [
        (weights.body, min_max(&signals.body)),
        (weights.title, min_max(&signals.title)),
        (weights.anchor, min_max(&signals.anchor)),
        (weights.authority, min_max(&signals.authority)),
        (weights.popularity, min_max(&signals.popularity)),
    ];
    let fused = candidates.iter().map(|&doc| {
        let score = normalized
            .iter()
            .map(|(w, values)| w * values.get(&doc).copied().unwrap_or(0.0))
            .sum::<f64>();
        (doc, score)
    });
    select_top_k(fused, top_k)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{DocRecord, InMemoryMetadata};

    fn map(entries: &[(DocId, f64)]) -> HashMap<DocId, f64> { entries.iter().copied().collect() }

    #[test]
    fn anchor_only_candidate_scores_anchor_weight() {
        let signals = SignalScores {
            anchor: map(&[(3, 2.0), (9, 1.0)]),
            authority: map(&[(3, 0.0), (9, 0.0)]),
            popularity: map(&[(3, 0.0), (9, 0.0)]),
            ..Default::default()
        };
        let weights = Weights::default();
        let fused = fuse(&signals, &signals.candidates(), &weights, 10);
        assert_eq!(fused, vec![(3, weights.anchor * 1.0), (9, 0.0)]);
    }

    #[test]
    fn missing_signal_counts_as_zero() {
        let signals = SignalScores {
            body: map(&[(1, 10.0), (2, 5.0)]),
            title: map(&[(2, 2.0), (3, 1.0)]),
            ..Default::default()
        };
        let w = Weights { body: 1.0, title: 1.0, anchor: 0.0, authority: 0.0, popularity: 0.0 };
        let fused = fuse(&signals, &signals.candidates(), &w, 10);
        // doc1: body 1.0; doc2: body 0.0 + title 1.0; doc3: title 0.0
        assert_eq!(fused, vec![(1, 1.0), (2, 1.0), (3, 0.0)]);
    }

    #[test]
    fn metadata_signals_are_log_compressed() {
        let mut a = DocRecord::new(1, "a", 10);
        a.page_authority = std::f64::consts::E - 1.0;
        a.page_views = 99;
        let meta = InMemoryMetadata::new(vec![a]);
        assert!((authority_scores(&meta, &[1])[&1] - 1.0).abs() < 1e-12);
        assert!((popularity_scores(&meta, &[1], true)[&1] - 100f64.ln()).abs() < 1e-12);
        assert_eq!(popularity_scores(&meta, &[1, 2], false), map(&[(1, 99.0), (2, 0.0)]));
    }

    #[test]
    fn authority_log_keeps_small_negatives() {
        let records = [(1, -0.5), (2, -1.0), (3, -4.0), (4, f64::NAN), (5, f64::INFINITY), (6, 0.0)].map(|(d, pr)| {
            let mut r = DocRecord::new(d, "", 10);
            r.page_authority = pr;
            r
        });
        let meta = InMemoryMetadata::new(records);
        let scores = authority_scores(&meta, &[1, 2, 3, 4, 5, 6]);
        assert!((scores[&1] - 0.5f64.ln()).abs() < 1e-12);
        assert!(scores[&1] < 0.0);
        for d in 2..=6 {
            assert_eq!(scores[&d], 0.0, "doc {d}");
        }
    }

    #[test]
    fn candidates_are_the_sorted_union() {
        let signals = SignalScores {
            body: map(&[(5, 1.0)]),
            title: map(&[(2, 1.0), (5, 1.0)]),
            anchor: map(&[(9, 1.0)]),
            authority: map(&[(100, 1.0)]),
            ..Default::default()
        };
        assert_eq!(signals.candidates(), vec![2, 5, 9]);
    }
}
