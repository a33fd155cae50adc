//! Retrieval metrics, plus hybrid-weight and BM25-parameter grid searches over labeled queries.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::time::Instant;

use crate::config::{Bm25Params, RankOptions, WeightVector, Weights};
use crate::engine::SearchEngine;
use crate::error::ConfigError;
use crate::index::DocId;

pub fn precision_at_k(ranked: &[DocId], relevant: &HashSet<DocId>, k: usize) -> f64 {
    if k == 0 || ranked.is_empty() {
        return 0.0;
    }
    hits(ranked, relevant, k) as f64 / k as f64
}

pub fn recall_at_k(ranked: &[DocId], relevant: &HashSet<DocId>, k: usize) -> f64 {
    if k == 0 || relevant.is_empty() {
        return 0.0;
    }
    hits(ranked, relevant, k) as f64 / relevant.len() as f64
}

pub fn f1_at_k(ranked: &[DocId], relevant: &HashSet<DocId>, k: usize) -> f64 {
    let p = precision_at_k(ranked, relevant, k);
    let r = recall_at_k(ranked, relevant, k);
    if p + r > 0.0 { 2.0 * p * r / (p + r) } else { 0.0 }
}

pub fn average_precision_at_k(ranked: &[DocId], relevant: &HashSet<DocId>, k: usize) -> f64 {
    if k == 0 || relevant.is_empty() {
        return 0.0;
    }
    let mut found = 0usize;
    let mut sum = 0.0;
    for (i, doc) in ranked.iter().take(k).enumerate() {
        if relevant.contains(doc) {
            found += 1;
            sum += found as f64 / (i + 1) as f64;
        }
    }
    sum / relevant.len().min(k) as f64
}

/// 0 unless both inputs are positive.
pub fn harmonic_mean(a: f64, b: f64) -> f64 {
    if a <= 0.0 || b <= 0.0 {
        return 0.0;
    }
    2.0 * a * b / (a + b)
}

fn hits(ranked: &[DocId], relevant: &HashSet<DocId>, k: usize) -> usize {
    ranked.iter().take(k).filter(|d| relevant.contains(d)).count()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabeledQuery {
    pub query: String,
    pub relevant: Vec<DocId>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Num(DocId),
    Text(String),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawQueries {
    List(Vec<LabeledQuery>),
    Map(BTreeMap<String, Vec<RawId>>),
}

/// Accepts `[{"query": .., "relevant": [..]}]` or `{"query": ["id", ..]}`; string ids are parsed.
pub fn parse_queries(json: &str) -> Result<Vec<LabeledQuery>> {
    let raw: RawQueries = serde_json::from_str(json)?;
    let queries = match raw {
        RawQueries::List(list) => list,
        RawQueries::Map(map) => map
            .into_iter()
            .map(|(query, ids)| {
                let relevant = ids
                    .into_iter()
                    .map(|id| match id {
                        RawId::Num(n) => Ok(n),
                        RawId::Text(s) => s.trim().parse::<DocId>(),
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(LabeledQuery { query, relevant })
            })
            .collect::<Result<Vec<_>>>()?,
    };
    Ok(queries)
}

/// Metrics of one query's ranking.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct QueryScores {
    pub precision_at_5: f64,
    pub f1_at_30: f64,
    pub average_precision_at_10: f64,
    /// harmonic_mean(precision@5, F1@30) of this query alone.
    pub hmean: f64,
    pub latency_ms: f64,
}

impl QueryScores {
    pub fn new(ranked: &[DocId], relevant: &HashSet<DocId>, latency_ms: f64) -> Self {
        let precision_at_5 = precision_at_k(ranked, relevant, 5);
        let f1_at_30 = f1_at_k(ranked, relevant, 30);
        Self {
            precision_at_5,
            f1_at_30,
            average_precision_at_10: average_precision_at_k(ranked, relevant, 10),
            hmean: harmonic_mean(precision_at_5, f1_at_30),
            latency_ms,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct EvalSummary {
    pub queries: usize,
    pub precision_at_5: f64,
    pub f1_at_30: f64,
    pub map_at_10: f64,
    /// Mean of the per-query harmonic_mean(precision@5, F1@30). Grid searches maximise this.
    pub objective: f64,
    /// harmonic_mean of the two macro averages.
    pub hmean_of_means: f64,
    pub mean_latency_ms: f64,
}

impl EvalSummary {
    /// Macro averages over per-query scores.
    pub fn from_queries(scores: &[QueryScores]) -> Self {
        if scores.is_empty() {
            return Self::default();
        }
        let n = scores.len() as f64;
        let mean = |f: fn(&QueryScores) -> f64| scores.iter().map(f).sum::<f64>() / n;
        let precision_at_5 = mean(|q| q.precision_at_5);
        let f1_at_30 = mean(|q| q.f1_at_30);
        Self {
            queries: scores.len(),
            precision_at_5,
            f1_at_30,
            map_at_10: mean(|q| q.average_precision_at_10),
            objective: mean(|q| q.hmean),
            hmean_of_means: harmonic_mean(precision_at_5, f1_at_30),
            mean_latency_ms: mean(|q| q.latency_ms),
        }
    }
}

/// What a query is run through during evaluation.
#[derive(Debug, Clone, Copy)]
enum Target<'a> {
    Hybrid(&'a RankOptions),
    Bm25 { params: Bm25Params, top_k: usize },
}

async fn run_queries(engine: &SearchEngine, queries: &[LabeledQuery], target: Target<'_>) -> Result<EvalSummary, ConfigError> {
    let mut scores = Vec::with_capacity(queries.len());
    for q in queries {
        let relevant: HashSet<DocId> = q.relevant.iter().copied().collect();
        let start = Instant::now();
        let results = match target {
            Target::Hybrid(options) => engine.search(&q.query, options).await?,
            Target::Bm25 { params, top_k } => engine.search_body_bm25(&q.query, top_k, params).await?,
        };
        let latency_ms = start.elapsed().as_secs_f64() * 1000.0;
        let ranked: Vec<DocId> = results.into_iter().map(|(d, _)| d).collect();
        scores.push(QueryScores::new(&ranked, &relevant, latency_ms));
    }
    Ok(EvalSummary::from_queries(&scores))
}

/// Macro-averaged metrics of hybrid search over `queries`.
pub async fn evaluate(engine: &SearchEngine, queries: &[LabeledQuery], options: &RankOptions) -> Result<EvalSummary, ConfigError> {
    options.validate()?;
    run_queries(engine, queries, Target::Hybrid(options)).await
}

/// Macro-averaged metrics of body-only BM25 search over `queries`.
pub async fn evaluate_bm25(engine: &SearchEngine, queries: &[LabeledQuery], params: Bm25Params, top_k: usize) -> Result<EvalSummary, ConfigError> {
    params.validate()?;
    run_queries(engine, queries, Target::Bm25 { params, top_k }).await
}

/// Candidate values per signal; an empty list keeps the signal at its default.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WeightGrid {
    pub body: Vec<f64>,
    pub title: Vec<f64>,
    pub anchor: Vec<f64>,
    pub authority: Vec<f64>,
    pub popularity: Vec<f64>,
}

impl WeightGrid {
    /// Cartesian product, body varying slowest.
    pub fn combinations(&self) -> Vec<WeightVector> {
        fn axis(values: &[f64]) -> Vec<Option<f64>> {
            if values.is_empty() { vec![None] } else { values.iter().copied().map(Some).collect() }
        }
        let mut out = Vec::new();
        for &body in &axis(&self.body) {
            for &title in &axis(&self.title) {
                for &anchor in &axis(&self.anchor) {
                    for &authority in &axis(&self.authority) {
                        for &popularity in &axis(&self.popularity) {
                            out.push(WeightVector { body, title, anchor, authority, popularity });
                        }
                    }
                }
            }
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridRow {
    pub weights: Weights,
    #[serde(flatten)]
    pub summary: EvalSummary,
}

pub async fn grid_search(engine: &SearchEngine, queries: &[LabeledQuery], base: &RankOptions, grid: &WeightGrid) -> Result<Vec<GridRow>, ConfigError> {
    let combos = grid.combinations();
    let mut rows = Vec::with_capacity(combos.len());
    for (i, weights) in combos.into_iter().enumerate() {
        let options = base.clone().with_weights(base.weights.overlay(weights));
        let summary = evaluate(engine, queries, &options).await?;
        tracing::info!(config = i, objective = summary.objective, "evaluated weight configuration");
        rows.push(GridRow { weights: options.weights.resolve(), summary });
    }
    Ok(rows)
}

/// BM25 parameter candidates. An empty axis keeps the default value. Plain BM25 rows
/// cover `k1 x b`; with `plus` set, BM25+ rows over `k1 x b x delta` follow them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Bm25Grid {
    pub k1: Vec<f64>,
    pub b: Vec<f64>,
    pub delta: Vec<f64>,
    pub plus: bool,
}

impl Bm25Grid {
    pub fn combinations(&self, base: Bm25Params) -> Vec<Bm25Params> {
        fn axis(values: &[f64], default: f64) -> Vec<f64> {
            if values.is_empty() { vec![default] } else { values.to_vec() }
        }
        let (k1s, bs) = (axis(&self.k1, base.k1), axis(&self.b, base.b));
        let mut out = Vec::new();
        for &k1 in &k1s {
            for &b in &bs {
                out.push(Bm25Params { k1, b, plus: false, delta: 0.0 });
            }
        }
        if self.plus {
            let deltas = axis(&self.delta, base.delta);
            for &k1 in &k1s {
                for &b in &bs {
                    for &delta in &deltas {
                        out.push(Bm25Params { k1, b, plus: true, delta });
                    }
                }
            }
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bm25Row {
    pub params: Bm25Params,
    #[serde(flatten)]
    pub summary: EvalSummary,
}

pub async fn bm25_grid_search(engine: &SearchEngine, queries: &[LabeledQuery], base: Bm25Params, grid: &Bm25Grid, top_k: usize) -> Result<Vec<Bm25Row>, ConfigError> {
    let combos = grid.combinations(base);
    let mut rows = Vec::with_capacity(combos.len());
    for params in combos {
        let summary = evaluate_bm25(engine, queries, params, top_k).await?;
        tracing::info!(k1 = params.k1, b = params.b, plus = params.plus, delta = params.delta, objective = summary.objective, "evaluated bm25 configuration");
        rows.push(Bm25Row { params, summary });
    }
    Ok(rows)
}

/// Highest objective; the earliest row wins ties.
pub fn best(rows: &[GridRow]) -> Option<&GridRow> { first_max(rows, |r| r.summary.objective) }

pub fn best_bm25(rows: &[Bm25Row]) -> Option<&Bm25Row> { first_max(rows, |r| r.summary.objective) }

fn first_max<T>(rows: &[T], objective: impl Fn(&T) -> f64) -> Option<&T> {
    rows.iter().fold(None, |best: Option<&T>, row| match best {
        Some(b) if objective(b) >= objective(row) => Some(b),
        _ => Some(row),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(ids: &[DocId]) -> HashSet<DocId> { ids.iter().copied().collect() }

    #[test]
    fn precision_recall_f1() {
        let ranked = [1, 2, 3, 4, 5];
        let rel = set(&[2, 4, 9, 10]);
        assert_eq!(precision_at_k(&ranked, &rel, 5), 0.4);
        assert_eq!(recall_at_k(&ranked, &rel, 5), 0.5);
        let f1 = f1_at_k(&ranked, &rel, 5);
        assert!((f1 - 2.0 * 0.4 * 0.5 / 0.9).abs() < 1e-12);
        assert_eq!(precision_at_k(&[], &rel, 5), 0.0);
        assert_eq!(recall_at_k(&ranked, &set(&[]), 5), 0.0);
        assert_eq!(precision_at_k(&ranked, &rel, 0), 0.0);
    }

    #[test]
    fn average_precision() {
        let rel = set(&[1, 3]);
        assert!((average_precision_at_k(&[1, 2, 3], &rel, 10) - (1.0 + 2.0 / 3.0) / 2.0).abs() < 1e-12);
        assert_eq!(average_precision_at_k(&[2, 4], &rel, 10), 0.0);
    }

    #[test]
    fn harmonic_mean_needs_both_positive() {
        assert_eq!(harmonic_mean(0.0, 1.0), 0.0);
        assert_eq!(harmonic_mean(0.5, 0.5), 0.5);
    }

    #[test]
    fn parses_both_query_layouts() {
        let list = parse_queries(r#"[{"query": "mount everest", "relevant": [5, 7]}]"#).unwrap();
        assert_eq!(list, vec![LabeledQuery { query: "mount everest".into(), relevant: vec![5, 7] }]);
        let map = parse_queries(r#"{"k2": ["12", 13]}"#).unwrap();
        assert_eq!(map, vec![LabeledQuery { query: "k2".into(), relevant: vec![12, 13] }]);
        assert!(parse_queries(r#"{"k2": ["abc"]}"#).is_err());
    }

    #[test]
    fn grid_is_cartesian_with_defaults_for_empty_axes() {
        let grid = WeightGrid { body: vec![1.0, 2.0], title: vec![0.0, 0.5, 1.0], ..Default::default() };
        let combos = grid.combinations();
        assert_eq!(combos.len(), 6);
        assert_eq!(combos[0], WeightVector { body: Some(1.0), title: Some(0.0), ..Default::default() });
        assert_eq!(combos[5].body, Some(2.0));
        assert_eq!(combos[5].anchor, None);
        assert_eq!(WeightGrid::default().combinations().len(), 1);
    }

    #[test]
    fn best_prefers_first_on_ties() {
        let row = |o: f64, body: f64| GridRow {
            weights: Weights { body, ..Weights::default() },
            summary: EvalSummary { objective: o, ..Default::default() },
        };
        let rows = vec![row(0.2, 1.0), row(0.5, 2.0), row(0.5, 3.0)];
        assert_eq!(best(&rows).unwrap().weights.body, 2.0);
        assert!(best(&[]).is_none());
    }

    #[test]
    fn objective_is_mean_of_per_query_hmeans() {
        // One relevant doc found first; five relevant docs found at ranks 1-5.
        let one = QueryScores::new(&[1, 2, 3, 4, 5], &set(&[1]), 2.0);
        let five = QueryScores::new(&[1, 2, 3, 4, 5], &set(&[1, 2, 3, 4, 5]), 4.0);
        assert!((one.precision_at_5 - 0.2).abs() < 1e-12);
        assert!((one.f1_at_30 - 2.0 / 31.0).abs() < 1e-12);
        assert!((five.f1_at_30 - 2.0 / 7.0).abs() < 1e-12);

        let summary = EvalSummary::from_queries(&[one, five]);
        let per_query = (harmonic_mean(0.2, 2.0 / 31.0) + harmonic_mean(1.0, 2.0 / 7.0)) / 2.0;
        assert!((summary.objective - per_query).abs() < 1e-12);
        let of_means = harmonic_mean(0.6, (2.0 / 31.0 + 2.0 / 7.0) / 2.0);
        assert!((summary.hmean_of_means - of_means).abs() < 1e-12);
        assert!((summary.objective - summary.hmean_of_means).abs() > 1e-5);
        assert_eq!(summary.queries, 2);
        assert_eq!(summary.mean_latency_ms, 3.0);
        assert_eq!(EvalSummary::from_queries(&[]), EvalSummary::default());
    }

    #[test]
    fn bm25_grid_lists_plain_then_plus() {
        let base = Bm25Params::default();
        let grid = Bm25Grid { k1: vec![1.2, 1.8], b: vec![0.0, 0.5], delta: vec![0.5, 1.0, 2.0], plus: false };
        let plain = grid.combinations(base);
        assert_eq!(plain.len(), 4);
        assert!(plain.iter().all(|p| !p.plus));
        assert_eq!(plain[1], Bm25Params { k1: 1.2, b: 0.5, plus: false, delta: 0.0 });

        let combos = Bm25Grid { plus: true, ..grid }.combinations(base);
        assert_eq!(combos.len(), 4 + 12);
        assert_eq!(combos[4], Bm25Params { k1: 1.2, b: 0.0, plus: true, delta: 0.5 });
        assert_eq!(combos[15], Bm25Params { k1: 1.8, b: 0.5, plus: true, delta: 2.0 });

        let defaults = Bm25Grid { plus: true, ..Default::default() }.combinations(base);
        assert_eq!(defaults, vec![
            Bm25Params { k1: 1.8, b: 0.1, plus: false, delta: 0.0 },
            Bm25Params { k1: 1.8, b: 0.1, plus: true, delta: 1.0 },
        ]);
    }

    #[test]
    fn best_bm25_prefers_first_on_ties() {
        let row = |o: f64, k1: f64| Bm25Row {
            params: Bm25Params { k1, ..Bm25Params::default() },
            summary: EvalSummary { objective: o, ..Default::default() },
        };
        let rows = vec![row(0.4, 1.0), row(0.4, 2.0), row(0.1, 3.0)];
        assert_eq!(best_bm25(&rows).unwrap().params.k1, 1.0);
    }
}
