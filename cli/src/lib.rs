use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use rank_core::eval::{best, best_bm25, bm25_grid_search, grid_search, parse_queries, Bm25Grid, LabeledQuery, WeightGrid};
use rank_core::persist::load_snapshot;
use rank_core::{DocId, RankOptions, SearchEngine, WeightVector};
use serde::Serialize;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use time::format_description::well_known::Rfc3339;

#[derive(Parser)]
#[command(name = "ranker")]
#[command(about = "Multi-signal document ranking over a corpus snapshot", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Rank documents for one query
    Search(SearchArgs),
    /// Grid-search fusion weights against labeled queries
    Tune(TuneArgs),
    /// Grid-search BM25 parameters of body-only search against labeled queries
    TuneBm25(TuneBm25Args),
}

#[derive(Args, Clone)]
pub struct RankArgs {
    /// Corpus snapshot (JSON)
    #[arg(long)]
    pub snapshot: PathBuf,
    /// Rank options file (JSON); flags override it
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Maximum results
    #[arg(long)]
    pub top_k: Option<usize>,
    /// Concurrent posting lookups per signal
    #[arg(long)]
    pub max_workers: Option<usize>,
    /// Weight override, e.g. --weight title=0.8 (repeatable)
    #[arg(long = "weight", value_parser = parse_weight)]
    pub weights: Vec<(String, f64)>,
    /// Use raw page views instead of ln(1 + views)
    #[arg(long, default_value_t = false)]
    pub raw_views: bool,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum Mode {
    Hybrid,
    Body,
    Bm25,
    Title,
    Anchor,
}

#[derive(Args)]
pub struct SearchArgs {
    #[command(flatten)]
    pub rank: RankArgs,
    #[arg(long, value_enum, default_value_t = Mode::Hybrid)]
    pub mode: Mode,
    /// Query text
    pub query: String,
}

#[derive(Args)]
pub struct TuneArgs {
    #[command(flatten)]
    pub rank: RankArgs,
    /// Labeled queries (JSON list or query -> ids map)
    #[arg(long)]
    pub queries: PathBuf,
    /// Only use the first N queries
    #[arg(long)]
    pub limit: Option<usize>,
    /// Comma-separated candidate weights for the body signal
    #[arg(long, default_value = "")]
    pub w_body: String,
    #[arg(long, default_value = "")]
    pub w_title: String,
    #[arg(long, default_value = "")]
    pub w_anchor: String,
    #[arg(long, default_value = "")]
    pub w_authority: String,
    #[arg(long, default_value = "")]
    pub w_popularity: String,
    /// JSONL output; stdout when omitted
    #[arg(long)]
    pub out: Option<PathBuf>,
}

#[derive(Args)]
pub struct TuneBm25Args {
    #[command(flatten)]
    pub rank: RankArgs,
    /// Labeled queries (JSON list or query -> ids map)
    #[arg(long)]
    pub queries: PathBuf,
    #[arg(long)]
    pub limit: Option<usize>,
    /// Comma-separated k1 candidates
    #[arg(long, default_value = "0.6,0.9,1.2,1.5,1.8,2.1,2.4")]
    pub k1: String,
    #[arg(long, default_value = "0.0,0.1,0.2,0.3,0.4,0.5")]
    pub b: String,
    /// BM25+ delta candidates, used with --plus
    #[arg(long, default_value = "0.0,0.5,1.0,1.5,2.0,3.0")]
    pub delta: String,
    /// Also evaluate BM25+ over k1 x b x delta
    #[arg(long, default_value_t = false)]
    pub plus: bool,
    #[arg(long)]
    pub out: Option<PathBuf>,
}

/// `signal=value`
pub fn parse_weight(s: &str) -> Result<(String, f64), String> {
    let (name, value) = s.split_once('=').ok_or_else(|| format!("expected signal=value, got {s:?}"))?;
    let value: f64 = value.trim().parse().map_err(|e| format!("bad weight {value:?}: {e}"))?;
    Ok((name.trim().to_string(), value))
}

/// "0.1,0.2" or "0.1 0.2"; empty input is an empty list.
pub fn parse_float_list(s: &str) -> Result<Vec<f64>, String> {
    s.split([',', ' '])
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(|p| p.parse::<f64>().map_err(|e| format!("bad number {p:?}: {e}")))
        .collect()
}

pub fn load_options(args: &RankArgs) -> Result<RankOptions> {
    let mut options = match &args.config {
        Some(path) => {
            let text = fs::read_to_string(path).with_context(|| format!("reading config {}", path.display()))?;
            serde_json::from_str::<RankOptions>(&text).with_context(|| format!("parsing config {}", path.display()))?
        }
        None => RankOptions::default(),
    };
    if let Some(k) = args.top_k {
        options.top_k = k;
    }
    if let Some(w) = args.max_workers {
        options.max_workers = w;
    }
    if args.raw_views {
        options.use_log_for_views = false;
    }
    let mut overrides = WeightVector::default();
    for (signal, value) in &args.weights {
        overrides.set(signal, *value)?;
    }
    options.weights = options.weights.overlay(overrides);
    options.validate()?;
    Ok(options)
}

pub fn open_engine(snapshot: &Path, options: &RankOptions) -> Result<SearchEngine> {
    let snapshot = load_snapshot(snapshot)?;
    let anchor_field = snapshot.fusion_anchor_field();
    let (postings, meta) = snapshot.into_backends();
    let engine = SearchEngine::new(postings, meta)?
        .with_max_workers(options.max_workers)?
        .with_fusion_anchor_field(anchor_field);
    Ok(engine)
}

pub async fn run(cli: Cli, out: &mut dyn Write) -> Result<()> {
    match cli.command {
        Commands::Search(args) => run_search(args, out).await,
        Commands::Tune(args) => run_tune(args, out).await,
        Commands::TuneBm25(args) => run_tune_bm25(args, out).await,
    }
}

pub async fn run_search(args: SearchArgs, out: &mut dyn Write) -> Result<()> {
    let options = load_options(&args.rank)?;
    let engine = open_engine(&args.rank.snapshot, &options)?;
    let start = std::time::Instant::now();
    let results: Vec<(DocId, String)> = match args.mode {
        Mode::Hybrid => engine.search(&args.query, &options).await?,
        Mode::Body => engine.search_body(&args.query, options.top_k).await,
        Mode::Bm25 => engine.search_body_bm25(&args.query, options.top_k, options.bm25).await?,
        Mode::Title => engine.search_title(&args.query).await,
        Mode::Anchor => engine.search_anchor(&args.query).await,
    };
    tracing::info!(query = %args.query, hits = results.len(), took_s = start.elapsed().as_secs_f64(), "search complete");
    for (doc_id, title) in results {
        writeln!(out, "{doc_id}\t{title}")?;
    }
    Ok(())
}

#[derive(Serialize)]
struct TuneLine<'a, R> {
    created_at: &'a str,
    best: bool,
    #[serde(flatten)]
    row: &'a R,
}

fn load_queries(path: &Path, limit: Option<usize>) -> Result<Vec<LabeledQuery>> {
    let text = fs::read_to_string(path).with_context(|| format!("reading queries {}", path.display()))?;
    let mut queries = parse_queries(&text)?;
    if let Some(n) = limit {
        queries.truncate(n);
    }
    Ok(queries)
}

/// One JSON line per row, then the best row again with `best: true`.
fn write_rows<R: Serialize>(rows: &[R], top: &R, path: Option<&Path>, out: &mut dyn Write) -> Result<()> {
    let created_at = time::OffsetDateTime::now_utc().format(&Rfc3339).unwrap_or_default();
    let mut file_out = match path {
        Some(path) => Some(BufWriter::new(File::create(path).with_context(|| format!("creating {}", path.display()))?)),
        None => None,
    };
    let sink: &mut dyn Write = match file_out.as_mut() {
        Some(f) => f as &mut dyn Write,
        None => out,
    };
    for row in rows {
        serde_json::to_writer(&mut *sink, &TuneLine { created_at: &created_at, best: false, row })?;
        sink.write_all(b"\n")?;
    }
    serde_json::to_writer(&mut *sink, &TuneLine { created_at: &created_at, best: true, row: top })?;
    sink.write_all(b"\n")?;
    sink.flush()?;
    Ok(())
}

pub async fn run_tune(args: TuneArgs, out: &mut dyn Write) -> Result<()> {
    let options = load_options(&args.rank)?;
    let engine = open_engine(&args.rank.snapshot, &options)?;
    let queries = load_queries(&args.queries, args.limit)?;
    let grid = WeightGrid {
        body: parse_float_list(&args.w_body).map_err(|e| anyhow!("--w-body: {e}"))?,
        title: parse_float_list(&args.w_title).map_err(|e| anyhow!("--w-title: {e}"))?,
        anchor: parse_float_list(&args.w_anchor).map_err(|e| anyhow!("--w-anchor: {e}"))?,
        authority: parse_float_list(&args.w_authority).map_err(|e| anyhow!("--w-authority: {e}"))?,
        popularity: parse_float_list(&args.w_popularity).map_err(|e| anyhow!("--w-popularity: {e}"))?,
    };
    tracing::info!(queries = queries.len(), configs = grid.combinations().len(), "starting weight grid search");
    let rows = grid_search(&engine, &queries, &options, &grid).await?;
    let top = best(&rows).ok_or_else(|| anyhow!("grid produced no configurations"))?;
    write_rows(&rows, top, args.out.as_deref(), out)?;
    tracing::info!(objective = top.summary.objective, "best configuration");
    Ok(())
}

pub async fn run_tune_bm25(args: TuneBm25Args, out: &mut dyn Write) -> Result<()> {
    let options = load_options(&args.rank)?;
    let engine = open_engine(&args.rank.snapshot, &options)?;
    let queries = load_queries(&args.queries, args.limit)?;
    let grid = Bm25Grid {
        k1: parse_float_list(&args.k1).map_err(|e| anyhow!("--k1: {e}"))?,
        b: parse_float_list(&args.b).map_err(|e| anyhow!("--b: {e}"))?,
        delta: parse_float_list(&args.delta).map_err(|e| anyhow!("--delta: {e}"))?,
        plus: args.plus,
    };
    tracing::info!(queries = queries.len(), configs = grid.combinations(options.bm25).len(), "starting bm25 grid search");
    let rows = bm25_grid_search(&engine, &queries, options.bm25, &grid, options.top_k).await?;
    let top = best_bm25(&rows).ok_or_else(|| anyhow!("grid produced no configurations"))?;
    write_rows(&rows, top, args.out.as_deref(), out)?;
    tracing::info!(k1 = top.params.k1, b = top.params.b, plus = top.params.plus, delta = top.params.delta, objective = top.summary.objective, "best bm25 parameters");
    Ok(())
}
