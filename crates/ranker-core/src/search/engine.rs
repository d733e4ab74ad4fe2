//! Query engine over a loaded artifact set
//!
//! An engine is created once per process. `load` moves it through
//! `Loading` to `Ready` or `Failed`; `Failed` is terminal and every search
//! answers `ServiceUnavailable`. A ready engine is immutable, so searches run
//! without locking.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use super::artifacts::{load_artifacts, ArtifactSet};
use super::encoder::{Encoder, EncoderError};
use super::index::l2_normalize;
use super::MAX_TOP_K;
use crate::error::{RankerError, Result};
use crate::obs;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexStatus {
    Unloaded,
    Loading,
    Ready,
    Failed(String),
}

impl IndexStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IndexStatus::Unloaded => "unloaded",
            IndexStatus::Loading => "loading",
            IndexStatus::Ready => "ready",
            IndexStatus::Failed(_) => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: String,
    pub did: String,
    pub name: String,
    pub description: String,
    /// Raw inner product between query and agent vectors
    pub score: f32,
}

pub struct QueryEngine {
    encoder: Arc<dyn Encoder>,
    status: IndexStatus,
    artifacts: Option<ArtifactSet>,
}

impl QueryEngine {
    /// An engine with nothing loaded.
    pub fn unloaded(encoder: Arc<dyn Encoder>) -> Self {
        Self {
            encoder,
            status: IndexStatus::Unloaded,
            artifacts: None,
        }
    }

    /// Load artifacts from `dir`. Never fails: problems leave the engine
    /// in `Failed`.
    #[instrument(skip(encoder), fields(dir = %dir.display()))]
    pub fn load(dir: &Path, encoder: Arc<dyn Encoder>) -> Self {
        let mut engine = Self::unloaded(encoder);
        engine.status = IndexStatus::Loading;
        obs::emit_index_state(&engine.status, 0);

        match load_artifacts(dir) {
            Ok(set) => engine.accept(set),
            Err(e) => engine.status = IndexStatus::Failed(e.to_string()),
        }

        let vectors = engine.len();
        obs::emit_index_state(&engine.status, vectors);
        engine
    }

    /// Serve an in-memory artifact set (e.g. one just built).
    pub fn from_artifacts(set: ArtifactSet, encoder: Arc<dyn Encoder>) -> Self {
        let mut engine = Self::unloaded(encoder);
        engine.accept(set);
        obs::emit_index_state(&engine.status, engine.len());
        engine
    }

    fn accept(&mut self, set: ArtifactSet) {
        let expected = self.encoder.dimension();
        if set.index.dimension() != expected {
            self.status = IndexStatus::Failed(format!(
                "index dimension {} does not match encoder dimension {}",
                set.index.dimension(),
                expected
            ));
            return;
        }
        if set.manifest.model != self.encoder.model_id() {
            warn!(
                index_model = %set.manifest.model,
                encoder_model = %self.encoder.model_id(),
                "index was built with a different model"
            );
        }
        if set.index.len() != set.metadata.len() {
            warn!(
                vectors = set.index.len(),
                metadata = set.metadata.len(),
                "vector count does not match metadata count"
            );
        }
        self.artifacts = Some(set);
        self.status = IndexStatus::Ready;
    }

    pub fn status(&self) -> &IndexStatus {
        &self.status
    }

    pub fn is_ready(&self) -> bool {
        self.status == IndexStatus::Ready
    }

    /// Number of vectors served.
    pub fn len(&self) -> usize {
        self.artifacts.as_ref().map(|a| a.index.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Up to `top_k` agents most similar to `query`, best first.
    #[instrument(skip(self, query))]
    pub async fn search(&self, query: &str, top_k: usize) -> Result<Vec<SearchHit>> {
        if !(1..=MAX_TOP_K).contains(&top_k) {
            return Err(RankerError::validation(format!(
                "top_k must be between 1 and {MAX_TOP_K}"
            )));
        }
        if query.trim().is_empty() {
            return Err(RankerError::validation("query must not be empty"));
        }

        let set = match (&self.status, &self.artifacts) {
            (IndexStatus::Ready, Some(set)) => set,
            (IndexStatus::Failed(reason), _) => {
                return Err(RankerError::ServiceUnavailable(format!(
                    "search index failed to load: {reason}"
                )))
            }
            (status, _) => {
                return Err(RankerError::ServiceUnavailable(format!(
                    "search index is {}",
                    status.as_str()
                )))
            }
        };

        let started = Instant::now();
        if set.index.is_empty() {
            obs::emit_search_completed(top_k, 0, 0, 0);
            return Ok(Vec::new());
        }

        let encoded = self.encoder.encode(&[query.to_string()]).await?;
        let [mut vector] = <[Vec<f32>; 1]>::try_from(encoded).map_err(|extra| {
            EncoderError::Count {
                expected: 1,
                actual: extra.len(),
            }
        })?;
        l2_normalize(&mut vector);

        let mut hits = Vec::with_capacity(top_k);
        let mut dropped = 0;
        for neighbor in set.index.search(&vector, top_k) {
            let record = neighbor.position.and_then(|p| set.metadata.get(p));
            match record {
                Some(meta) => hits.push(SearchHit {
                    id: meta.id.clone(),
                    did: meta.did.clone(),
                    name: meta.name.clone(),
                    description: meta.description.clone(),
                    score: neighbor.score,
                }),
                None => {
                    dropped += 1;
                    warn!(position = ?neighbor.position, "dropping search hit without metadata");
                }
            }
        }

        let elapsed_ms = started.elapsed().as_millis() as u64;
        obs::emit_search_completed(top_k, hits.len(), dropped, elapsed_ms);
        info!(returned = hits.len(), "search served");
        Ok(hits)
    }
}
