//! SurrealDB-backed RecommendationLog
//!
//! Lives on its own store instance; nothing here reads the catalog.

use std::collections::BTreeSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use surrealdb::engine::any::Any;
use surrealdb::Surreal;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::connect::{connect, StoreConfig};
use crate::error::StorageError;
use crate::migrations;
use crate::schema::{CuratedRow, EventRow};
use crate::storage_traits::{
    RecommendationEvent, RecommendationLog, RecommendedAgent, StorageResult,
};

/// Query errors against a dropped remote connection surface as `Unavailable`.
fn map_err(e: surrealdb::Error) -> StorageError {
    let msg = e.to_string();
    if msg.to_lowercase().contains("connection") {
        StorageError::Unavailable(msg)
    } else {
        StorageError::Backend(msg)
    }
}

/// SurrealDB-backed implementation of [`RecommendationLog`].
#[derive(Clone)]
pub struct SurrealRecommendationLog {
    db: Surreal<Any>,
}

impl SurrealRecommendationLog {
    /// Connect and run the recommendation migrations.
    pub async fn connect(config: &StoreConfig) -> crate::Result<Self> {
        let db = connect(config).await?;
        migrations::init_recommendation_schema(&db).await?;
        info!(url = %config.url, "SurrealRecommendationLog connected");
        Ok(Self { db })
    }

    /// Create an in-memory instance for testing.
    pub async fn in_memory() -> crate::Result<Self> {
        Self::connect(&StoreConfig::in_memory().with_database("recommendations")).await
    }
}

#[async_trait]
impl RecommendationLog for SurrealRecommendationLog {
    #[instrument(skip(self))]
    async fn append_event(
        &self,
        did: &str,
        timestamp: DateTime<Utc>,
    ) -> StorageResult<RecommendationEvent> {
        let row = EventRow {
            event_id: Uuid::new_v4().to_string(),
            did: did.to_string(),
            timestamp,
        };

        let mut res = self
            .db
            .query("CREATE recommendation_events CONTENT $row")
            .bind(("row", row))
            .await
            .map_err(map_err)?;
        let created: Vec<EventRow> = res.take(0).map_err(map_err)?;
        let event = created
            .into_iter()
            .next()
            .ok_or_else(|| StorageError::Backend("recommendation event not created".into()))?;

        debug!(event_id = %event.event_id, "recommendation event recorded");
        Ok(event.into())
    }

    async fn distinct_dids(&self) -> StorageResult<Vec<String>> {
        let mut res = self
            .db
            .query("SELECT VALUE did FROM recommendation_events")
            .await
            .map_err(map_err)?;
        let dids: Vec<String> = res.take(0).map_err(map_err)?;
        Ok(dids.into_iter().collect::<BTreeSet<_>>().into_iter().collect())
    }

    async fn events_for(&self, did: &str) -> StorageResult<Vec<RecommendationEvent>> {
        let mut res = self
            .db
            .query("SELECT * FROM recommendation_events WHERE did = $did ORDER BY timestamp ASC")
            .bind(("did", did.to_string()))
            .await
            .map_err(map_err)?;
        let rows: Vec<EventRow> = res.take(0).map_err(map_err)?;
        Ok(rows.into_iter().map(RecommendationEvent::from).collect())
    }

    async fn upsert_curated(&self, entry: RecommendedAgent) -> StorageResult<()> {
        let did = entry.did.clone();
        self.db
            .query("UPSERT type::thing('recommended_agents', $did) CONTENT $row")
            .bind(("did", did))
            .bind(("row", CuratedRow::from(entry)))
            .await
            .map_err(map_err)?
            .check()
            .map_err(map_err)?;
        Ok(())
    }

    async fn remove_curated(&self, did: &str) -> StorageResult<bool> {
        let mut res = self
            .db
            .query("DELETE type::thing('recommended_agents', $did) RETURN BEFORE")
            .bind(("did", did.to_string()))
            .await
            .map_err(map_err)?;
        let removed: Vec<CuratedRow> = res.take(0).map_err(map_err)?;
        Ok(!removed.is_empty())
    }

    async fn curated(&self) -> StorageResult<Vec<RecommendedAgent>> {
        let mut res = self
            .db
            .query("SELECT * FROM recommended_agents ORDER BY rank ASC, did ASC")
            .await
            .map_err(map_err)?;
        let rows: Vec<CuratedRow> = res.take(0).map_err(map_err)?;
        Ok(rows.into_iter().map(RecommendedAgent::from).collect())
    }
}
