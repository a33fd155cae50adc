use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;

pub type DocId = u32;

/// Sparse per-term scores; only documents the term actually scores are present.
pub type PartialScoreMap = HashMap<DocId, f64>;
/// Additive merge of every term's partial map for one query.
pub type AggregateScoreMap = HashMap<DocId, f64>;
/// (doc, score) pairs, score descending then doc ascending.
pub type RankedList = Vec<(DocId, f64)>;

/// Which posting list a term is looked up in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Field {
    Body,
    Title,
    Anchor,
    /// Anchor text aggregated onto the page it links to.
    #[serde(rename = "linked_anchor")]
    LinkedAnchor,
}

impl Field {
    pub fn as_str(&self) -> &'static str {
        match self {
            Field::Body => "body",
            Field::Title => "title",
            Field::Anchor => "anchor",
            Field::LinkedAnchor => "linked_anchor",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Posting {
    pub doc_id: DocId,
    pub tf: u32,
}

impl Posting {
    pub fn new(doc_id: DocId, tf: u32) -> Self { Self { doc_id, tf } }
}

/// Score descending, ties broken by ascending doc id.
pub fn rank_order(a: &(DocId, f64), b: &(DocId, f64)) -> Ordering {
    b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0))
}

/// Turn an aggregate map into a ranked list, truncated to `k` when `k > 0`.
pub fn sort_ranked(scores: AggregateScoreMap, k: usize) -> RankedList {
    let mut ranked: RankedList = scores.into_iter().collect();
    ranked.sort_by(rank_order);
    if k > 0 {
        ranked.truncate(k);
    }
    ranked
}
