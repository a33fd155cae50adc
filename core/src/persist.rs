use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs::{create_dir_all, File};
use std::io::{Read, Write};
use std::path::Path;
use std::sync::Arc;

use crate::index::Field;
use crate::memory::{DocRecord, InMemoryMetadata, InMemoryPostings};

pub const SNAPSHOT_VERSION: u32 = 1;

/// Everything the in-memory collaborators need, as one JSON document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CorpusSnapshot {
    #[serde(default = "default_version")]
    pub version: u32,
    /// Overrides the mean of `docs[*].body_len` when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avg_body_length: Option<f64>,
    pub docs: Vec<DocRecord>,
    #[serde(default)]
    pub postings: InMemoryPostings,
}
fn default_version() -> u32 { SNAPSHOT_VERSION }

impl CorpusSnapshot {
    /// `linked_anchor` when the snapshot carries those posting lists, else `anchor`.
    pub fn fusion_anchor_field(&self) -> Field {
        if self.postings.num_terms(Field::LinkedAnchor) > 0 { Field::LinkedAnchor } else { Field::Anchor }
    }

    pub fn into_backends(self) -> (Arc<InMemoryPostings>, Arc<InMemoryMetadata>) {
        let mut meta = InMemoryMetadata::new(self.docs);
        if let Some(avgdl) = self.avg_body_length {
            meta = meta.with_avg_body_length(avgdl);
        }
        (Arc::new(self.postings), Arc::new(meta))
    }
}

pub fn save_snapshot(path: &Path, snapshot: &CorpusSnapshot) -> Result<()> {
    if let Some(dir) = path.parent() {
        create_dir_all(dir)?;
    }
    let mut f = File::create(path)?;
    let json = serde_json::to_string_pretty(snapshot)?;
    f.write_all(json.as_bytes())?;
    Ok(())
}

pub fn load_snapshot(path: &Path) -> Result<CorpusSnapshot> {
    let mut f = File::open(path).with_context(|| format!("opening snapshot {}", path.display()))?;
    let mut buf = String::new();
    f.read_to_string(&mut buf)?;
    let snapshot: CorpusSnapshot = serde_json::from_str(&buf).with_context(|| format!("parsing snapshot {}", path.display()))?;
    if snapshot.version != SNAPSHOT_VERSION {
        bail!("unsupported snapshot version {} (expected {})", snapshot.version, SNAPSHOT_VERSION);
    }
    tracing::info!(docs = snapshot.docs.len(), path = %path.display(), "snapshot loaded");
    Ok(snapshot)
}
