use std::sync::Arc;

use crate::accumulator::{distinct_terms, TermAccumulator};
use crate::index::{sort_ranked, Field, PartialScoreMap, RankedList};
use crate::source::PostingSource;

/// Ranks documents by how many distinct query terms appear in one field.
///
/// Title and anchor scoring are two instances of this type pointed at different fields.
#[derive(Clone)]
pub struct MatchCountScorer {
    field: Field,
    source: Arc<dyn PostingSource>,
}

impl MatchCountScorer {
    pub fn new(field: Field, source: Arc<dyn PostingSource>) -> Self { Self { field, source } }

    pub fn title(source: Arc<dyn PostingSource>) -> Self { Self::new(Field::Title, source) }

    pub fn anchor(source: Arc<dyn PostingSource>) -> Self { Self::new(Field::Anchor, source) }

    pub fn field(&self) -> Field { self.field }

    /// Same posting source, another field.
    pub fn with_field(&self, field: Field) -> Self { Self::new(field, Arc::clone(&self.source)) }

    /// Full ranking by (match count desc, doc id asc). No truncation.
    pub async fn score<S: AsRef<str>>(&self, terms: &[S], max_workers: usize) -> RankedList {
        let terms = distinct_terms(terms);
        if terms.is_empty() {
            return RankedList::new();
        }
        let field = self.field;
        let source = Arc::clone(&self.source);
        let scores = TermAccumulator::new(max_workers)
            .accumulate(terms, move |term| {
                let postings = source.fetch(field, &term)?;
                // Presence only: tf is ignored.
                let partial: PartialScoreMap = postings.iter().map(|p| (p.doc_id, 1.0)).collect();
                Ok(partial)
            })
            .await;
        tracing::debug!(field = %field, docs = scores.len(), "match-count scoring done");
        sort_ranked(scores, 0)
    }
}
