pub mod accumulator;
pub mod body;
pub mod config;
pub mod engine;
pub mod error;
pub mod eval;
pub mod fusion;
pub mod index;
pub mod match_count;
pub mod memory;
pub mod normalize;
pub mod persist;
pub mod source;
pub mod tokenizer;

pub use config::{Bm25Params, RankOptions, WeightVector, Weights};
pub use engine::SearchEngine;
pub use error::{ConfigError, LookupError};
pub use fusion::HybridRanker;
pub use index::{sort_ranked, AggregateScoreMap, DocId, Field, PartialScoreMap, Posting, RankedList};
pub use source::{CorpusStatistics, MetadataStore, PostingSource};
