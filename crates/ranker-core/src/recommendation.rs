//! Recommendation log service
//!
//! The recommendation store is a separate instance from the catalog. A DID is
//! checked against the catalog first, so an unknown DID is `NotFound` even
//! while the log is down. Then the event is written; the two steps do
//! not share a transaction, so an agent removed in between still gets its
//! event recorded.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use ranker_state::{CatalogStore, RecommendationLog, RecommendedAgent, StorageError};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::error::{RankerError, Result};
use crate::obs;

pub const MIN_DID_CHARS: usize = 3;

/// Acknowledgement returned by [`RecommendationService::add_recommendation`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationAck {
    pub status: String,
    pub did: String,
    pub timestamp: DateTime<Utc>,
}

pub struct RecommendationService {
    catalog: Arc<dyn CatalogStore>,
    log: Option<Arc<dyn RecommendationLog>>,
}

impl RecommendationService {
    /// `log` is `None` when the recommendation store was unreachable at startup.
    pub fn new(catalog: Arc<dyn CatalogStore>, log: Option<Arc<dyn RecommendationLog>>) -> Self {
        Self { catalog, log }
    }

    pub fn is_available(&self) -> bool {
        self.log.is_some()
    }

    fn log(&self) -> Result<&Arc<dyn RecommendationLog>> {
        self.log.as_ref().ok_or_else(|| {
            RankerError::ServiceUnavailable("recommendation store is not configured".into())
        })
    }

    /// Record that `did` was recommended.
    #[instrument(skip(self))]
    pub async fn add_recommendation(&self, did: &str) -> Result<RecommendationAck> {
        if did.chars().count() < MIN_DID_CHARS {
            return Err(RankerError::validation(format!(
                "did must have at least {MIN_DID_CHARS} characters"
            )));
        }
        let known = self
            .catalog
            .resolve_id_by_did(did)
            .await
            .map_err(obs::storage_failure("recommendation.resolve_did"))?;
        if known.is_none() {
            return Err(RankerError::not_found("agent did", did));
        }

        let event = self
            .log()?
            .append_event(did, Utc::now())
            .await
            .map_err(unavailable)?;
        obs::emit_recommendation_logged(did);

        Ok(RecommendationAck {
            status: "success".to_string(),
            did: event.did,
            timestamp: event.timestamp,
        })
    }

    /// Every DID ever recommended, deduplicated and ascending.
    pub async fn list_recommended_dids(&self) -> Result<Vec<String>> {
        self.log()?.distinct_dids().await.map_err(unavailable)
    }

    /// Insert or re-rank a curated entry.
    pub async fn set_curated(
        &self,
        did: &str,
        rank: i64,
        note: Option<String>,
    ) -> Result<RecommendedAgent> {
        if did.chars().count() < MIN_DID_CHARS {
            return Err(RankerError::validation(format!(
                "did must have at least {MIN_DID_CHARS} characters"
            )));
        }
        let entry = RecommendedAgent {
            did: did.to_string(),
            rank,
            note,
        };
        self.log()?
            .upsert_curated(entry.clone())
            .await
            .map_err(unavailable)?;
        info!(did = %did, rank, "curated entry saved");
        Ok(entry)
    }

    pub async fn remove_curated(&self, did: &str) -> Result<()> {
        let removed = self
            .log()?
            .remove_curated(did)
            .await
            .map_err(unavailable)?;
        if !removed {
            return Err(RankerError::not_found("curated entry", did));
        }
        Ok(())
    }

    pub async fn curated(&self) -> Result<Vec<RecommendedAgent>> {
        self.log()?.curated().await.map_err(unavailable)
    }
}

/// Unreachable-store errors become `ServiceUnavailable`; the rest stay storage errors.
fn unavailable(err: StorageError) -> RankerError {
    match err {
        StorageError::Unavailable(msg) => RankerError::ServiceUnavailable(msg),
        other => {
            obs::emit_storage_failure("recommendation", &other);
            RankerError::Storage(other)
        }
    }
}
