use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub const SIGNALS: [&str; 5] = ["body", "title", "anchor", "authority", "popularity"];

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Bm25Params {
    /// Term-frequency saturation.
    pub k1: f64,
    /// Length-normalisation strength in [0, 1].
    pub b: f64,
    /// Use BM25+ (adds `delta` per matching term).
    pub plus: bool,
    pub delta: f64,
}

impl Default for Bm25Params {
    fn default() -> Self { Self { k1: 1.8, b: 0.1, plus: false, delta: 1.0 } }
}

impl Bm25Params {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.k1.is_finite() || self.k1 < 0.0 {
            return Err(ConfigError::Bm25Param { name: "k1", value: self.k1 });
        }
        if !(0.0..=1.0).contains(&self.b) {
            return Err(ConfigError::Bm25Param { name: "b", value: self.b });
        }
        if !self.delta.is_finite() || self.delta < 0.0 {
            return Err(ConfigError::Bm25Param { name: "delta", value: self.delta });
        }
        Ok(())
    }
}

/// Partial per-signal weight override; unset signals keep their defaults.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WeightVector {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub anchor: Option<f64>,
    #[serde(alias = "pagerank", skip_serializing_if = "Option::is_none")]
    pub authority: Option<f64>,
    #[serde(alias = "pageviews", skip_serializing_if = "Option::is_none")]
    pub popularity: Option<f64>,
}

impl WeightVector {
    /// Set one signal by name (`pagerank`/`pageviews` accepted as aliases).
    pub fn set(&mut self, signal: &str, value: f64) -> Result<(), ConfigError> {
        let slot = match signal {
            "body" => &mut self.body,
            "title" => &mut self.title,
            "anchor" => &mut self.anchor,
            "authority" | "pagerank" => &mut self.authority,
            "popularity" | "pageviews" => &mut self.popularity,
            other => return Err(ConfigError::UnknownSignal(other.to_string())),
        };
        *slot = Some(value);
        Ok(())
    }

    /// Fields set in `other` win.
    pub fn overlay(self, other: WeightVector) -> WeightVector {
        WeightVector {
            body: other.body.or(self.body),
            title: other.title.or(self.title),
            anchor: other.anchor.or(self.anchor),
            authority: other.authority.or(self.authority),
            popularity: other.popularity.or(self.popularity),
        }
    }

    pub fn resolve(&self) -> Weights {
        let d = Weights::default();
        Weights {
            body: self.body.unwrap_or(d.body),
            title: self.title.unwrap_or(d.title),
            anchor: self.anchor.unwrap_or(d.anchor),
            authority: self.authority.unwrap_or(d.authority),
            popularity: self.popularity.unwrap_or(d.popularity),
        }
    }
}

/// Fully resolved fusion weights.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Weights {
    pub body: f64,
    pub title: f64,
    pub anchor: f64,
    pub authority: f64,
    pub popularity: f64,
}

impl Default for Weights {
    fn default() -> Self { Self { body: 1.5, title: 0.6, anchor: 0.25, authority: 0.1, popularity: 0.5 } }
}

impl Weights {
    pub fn as_array(&self) -> [f64; 5] { [self.body, self.title, self.anchor, self.authority, self.popularity] }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (&signal, value) in SIGNALS.iter().zip(self.as_array()) {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::InvalidWeight { signal, value });
            }
        }
        Ok(())
    }
}

/// Per-query options for hybrid ranking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RankOptions {
    pub top_k: usize,
    pub body_k: usize,
    pub title_k: usize,
    pub anchor_k: usize,
    pub max_workers: usize,
    pub weights: WeightVector,
    pub use_log_for_views: bool,
    pub bm25: Bm25Params,
}

impl Default for RankOptions {
    fn default() -> Self {
        Self {
            top_k: 100,
            body_k: 400,
            title_k: 400,
            anchor_k: 400,
            max_workers: 16,
            weights: WeightVector::default(),
            use_log_for_views: true,
            bm25: Bm25Params::default(),
        }
    }
}

impl RankOptions {
    pub fn validate(&self) -> Result<Weights, ConfigError> {
        if self.max_workers == 0 {
            return Err(ConfigError::NoWorkers);
        }
        self.bm25.validate()?;
        let weights = self.weights.resolve();
        weights.validate()?;
        Ok(weights)
    }

    pub fn with_weights(mut self, weights: WeightVector) -> Self {
        self.weights = weights;
        self
    }
}
