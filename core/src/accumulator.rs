//! Per-term scatter-gather.
//!
//! Every term is scored on its own blocking task into a private [`PartialScoreMap`].
//! The awaiting task drains finished tasks in completion order and folds each map into
//! the aggregate, so no map is ever written by more than one task and nothing is locked.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::error::LookupError;
use crate::index::{AggregateScoreMap, PartialScoreMap};

#[derive(Debug, Clone, Copy)]
pub struct TermAccumulator {
    max_workers: usize,
}

impl TermAccumulator {
    pub fn new(max_workers: usize) -> Self { Self { max_workers: max_workers.max(1) } }

    pub fn max_workers(&self) -> usize { self.max_workers }

    /// Score every term concurrently and return the additive merge.
    ///
    /// A term whose evaluation errors or panics contributes an empty map; the
    /// remaining terms are unaffected.
    pub async fn accumulate<T, F>(&self, terms: Vec<T>, score_term: F) -> AggregateScoreMap
    where
        T: Send + 'static,
        F: Fn(T) -> Result<PartialScoreMap, LookupError> + Send + Sync + 'static,
    {
        let mut scores = AggregateScoreMap::new();
        if terms.is_empty() {
            return scores;
        }
        let score_term = Arc::new(score_term);
        let permits = Arc::new(Semaphore::new(self.max_workers));
        let mut tasks = JoinSet::new();

        for term in terms {
            let permit = match Arc::clone(&permits).acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => break,
            };
            let score_term = Arc::clone(&score_term);
            tasks.spawn_blocking(move || {
                let _permit = permit;
                score_term(term)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(partial)) => merge_partial(&mut scores, partial),
                Ok(Err(err @ LookupError::UnknownTerm { .. })) => tracing::debug!(error = %err, "term skipped"),
                Ok(Err(err)) => tracing::warn!(error = %err, "term lookup failed, contributing nothing"),
                Err(err) => tracing::warn!(error = %err, "term task did not complete"),
            }
        }
        scores
    }
}

/// `scores[doc] += partial[doc]` for every entry of `partial`.
pub fn merge_partial(scores: &mut AggregateScoreMap, partial: PartialScoreMap) {
    for (doc_id, value) in partial {
        *scores.entry(doc_id).or_insert(0.0) += value;
    }
}

/// Distinct non-empty terms in first-occurrence order.
pub fn distinct_terms<S: AsRef<str>>(terms: &[S]) -> Vec<String> {
    let mut seen: HashSet<&str> = HashSet::new();
    let mut out = Vec::new();
    for t in terms {
        let t = t.as_ref();
        if t.is_empty() || !seen.insert(t) {
            continue;
        }
        out.push(t.to_string());
    }
    out
}

/// Query term frequencies, in first-occurrence order.
pub fn term_counts<S: AsRef<str>>(terms: &[S]) -> Vec<(String, u32)> {
    let mut counts: HashMap<&str, u32> = HashMap::new();
    let mut order: Vec<&str> = Vec::new();
    for t in terms {
        let t = t.as_ref();
        if t.is_empty() {
            continue;
        }
        let c = counts.entry(t).or_insert(0);
        if *c == 0 {
            order.push(t);
        }
        *c += 1;
    }
    order.into_iter().map(|t| (t.to_string(), counts[t])).collect()
}
