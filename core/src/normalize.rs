use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashMap};

use crate::index::{rank_order, DocId};

/// Min-max rescale of one signal to [0, 1]. If every value is equal, every document maps to 0.0.
pub fn min_max(scores: &HashMap<DocId, f64>) -> HashMap<DocId, f64> {
    if scores.is_empty() {
        return HashMap::new();
    }
    let (lo, hi) = scores
        .values()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    if hi == lo {
        return scores.keys().map(|&d| (d, 0.0)).collect();
    }
    let span = hi - lo;
    scores.iter().map(|(&d, &v)| (d, (v - lo) / span)).collect()
}

/// Heap entry ordered so that the "best" entry (higher score, then lower id) is greatest.
#[derive(Debug, Clone, Copy)]
struct Candidate(DocId, f64);

impl PartialEq for Candidate {
    fn eq(&self, o: &Self) -> bool { self.cmp(o) == Ordering::Equal }
}
impl Eq for Candidate {}
impl PartialOrd for Candidate {
    fn partial_cmp(&self, o: &Self) -> Option<Ordering> { Some(self.cmp(o)) }
}
impl Ord for Candidate {
    fn cmp(&self, o: &Self) -> Ordering { rank_order(&(o.0, o.1), &(self.0, self.1)) }
}

/// Best `k` entries by (score desc, doc id asc) using a bounded min-heap.
pub fn select_top_k(scores: impl IntoIterator<Item = (DocId, f64)>, k: usize) -> Vec<(DocId, f64)> {
    if k == 0 {
        return Vec::new();
    }
    let mut heap: BinaryHeap<Reverse<Candidate>> = BinaryHeap::with_capacity(k + 1);
    for (doc, score) in scores {
        let c = Candidate(doc, score);
        if heap.len() < k {
            heap.push(Reverse(c));
        } else if heap.peek().is_some_and(|worst| c > worst.0) {
            heap.pop();
            heap.push(Reverse(c));
        }
    }
    let mut top: Vec<(DocId, f64)> = heap.into_iter().map(|Reverse(c)| (c.0, c.1)).collect();
    top.sort_by(rank_order);
    top
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rescales_into_unit_interval() {
        let raw: HashMap<DocId, f64> = [(1, 2.0), (2, 4.0), (3, 3.0)].into_iter().collect();
        let n = min_max(&raw);
        assert_eq!(n[&1], 0.0);
        assert_eq!(n[&2], 1.0);
        assert_eq!(n[&3], 0.5);
    }

    #[test]
    fn flat_signal_maps_to_zero() {
        let raw: HashMap<DocId, f64> = [(1, 7.0), (2, 7.0)].into_iter().collect();
        assert!(min_max(&raw).values().all(|&v| v == 0.0));
        let single: HashMap<DocId, f64> = [(4, 3.5)].into_iter().collect();
        assert_eq!(min_max(&single)[&4], 0.0);
        assert!(min_max(&HashMap::new()).is_empty());
    }

    #[test]
    fn top_k_matches_full_sort() {
        let scores: Vec<(DocId, f64)> = (0..200).map(|d| (d, ((d * 37) % 11) as f64)).collect();
        let mut full = scores.clone();
        full.sort_by(rank_order);
        full.truncate(15);
        assert_eq!(select_top_k(scores, 15), full);
    }

    #[test]
    fn equal_scores_prefer_smaller_ids() {
        let top = select_top_k(vec![(9, 1.0), (4, 1.0), (6, 1.0), (2, 0.5)], 2);
        assert_eq!(top, vec![(4, 1.0), (6, 1.0)]);
    }

    #[test]
    fn k_larger_than_input_returns_everything() {
        let top = select_top_k(vec![(1, 0.1), (2, 0.2)], 10);
        assert_eq!(top, vec![(2, 0.2), (1, 0.1)]);
        assert!(select_top_k(vec![(1, 0.1)], 0).is_empty());
    }
}
