//! SurrealDB-backed CatalogStore and RatingLedger
//!
//! Agents, ratings and registry documents share one store so a rating insert
//! and its aggregate update commit in a single transaction.

use std::sync::Arc;

use async_trait::async_trait;
use surrealdb::engine::any::Any;
use surrealdb::Surreal;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::connect::{connect, StoreConfig};
use crate::error::StorageError;
use crate::migrations;
use crate::pagination::{Page, PageRequest};
use crate::schema::{AgentRow, CountRow, RatingRow, RegistryRow};
use crate::storage_traits::{
    Agent, AgentQuery, AggregateUpdate, CatalogStore, NewRating, RatingLedger, RatingRecord,
    RegistryEntry, StorageResult,
};

const AGGREGATE_CONFLICT: &str = "aggregate_conflict";

const APPEND_RATING_SQL: &str = r#"
    BEGIN TRANSACTION;
    LET $updated = (UPDATE type::thing('agents', $agent_id)
        SET avg_score = $avg_score, num_ratings = $num_ratings, score_total = $score_total
        WHERE num_ratings = $expected_ratings
        RETURN AFTER);
    IF array::len($updated) = 0 { THROW "aggregate_conflict" };
    LET $counter = (UPSERT ONLY counters:ratings SET value = (value ?? 0) + 1 RETURN AFTER);
    CREATE ratings CONTENT {
        seq: $counter.value,
        agent_id: $agent_id,
        user_id: $user_id,
        score: $score,
        comment: $comment,
        timestamp: $timestamp,
        hash: $hash
    };
    COMMIT TRANSACTION;
"#;

fn backend(e: surrealdb::Error) -> StorageError {
    StorageError::Backend(e.to_string())
}

/// Lost CAS guard or an engine-level transaction conflict; both are retryable.
fn is_write_conflict(msg: &str) -> bool {
    msg.contains(AGGREGATE_CONFLICT) || msg.contains("read or write conflict")
}

/// SurrealDB-backed implementation of [`CatalogStore`] and [`RatingLedger`].
#[derive(Clone)]
pub struct SurrealCatalogStore {
    db: Surreal<Any>,
    /// Serializes rating transactions issued through this handle.
    append_lock: Arc<Mutex<()>>,
}

impl SurrealCatalogStore {
    /// Connect and run the catalog migrations.
    pub async fn connect(config: &StoreConfig) -> crate::Result<Self> {
        let db = connect(config).await?;
        migrations::init_catalog_schema(&db).await?;
        info!(url = %config.url, "SurrealCatalogStore connected");
        Ok(Self {
            db,
            append_lock: Arc::new(Mutex::new(())),
        })
    }

    /// Create an in-memory instance for testing.
    pub async fn in_memory() -> crate::Result<Self> {
        Self::connect(&StoreConfig::in_memory()).await
    }

    async fn fetch_agent(&self, id: &str) -> StorageResult<Option<AgentRow>> {
        let mut res = self
            .db
            .query("SELECT * FROM type::thing('agents', $id)")
            .bind(("id", id.to_string()))
            .await
            .map_err(backend)?;
        let rows: Vec<AgentRow> = res.take(0).map_err(backend)?;
        Ok(rows.into_iter().next())
    }
}

#[async_trait]
impl CatalogStore for SurrealCatalogStore {
    #[instrument(skip(self, agent), fields(agent_id = %agent.id))]
    async fn upsert_agent(&self, agent: Agent) -> StorageResult<()> {
        let id = agent.id.clone();
        let did = agent.did.clone();
        let row = AgentRow::from(agent);

        let result = self
            .db
            .query("UPSERT type::thing('agents', $id) CONTENT $row")
            .bind(("id", id.clone()))
            .bind(("row", row))
            .await
            .map_err(backend)?
            .check();

        match result {
            Ok(_) => {
                debug!("agent upserted");
                Ok(())
            }
            Err(e) if e.to_string().contains("idx_agent_did") => {
                warn!(did = %did, "did already bound to another agent");
                Err(StorageError::Conflict {
                    entity: "agent did",
                    key: did,
                })
            }
            Err(e) => Err(backend(e)),
        }
    }

    async fn get_agent(&self, id: &str) -> StorageResult<Option<Agent>> {
        Ok(self.fetch_agent(id).await?.map(Agent::from))
    }

    async fn resolve_id_by_did(&self, did: &str) -> StorageResult<Option<String>> {
        let mut res = self
            .db
            .query("SELECT VALUE agent_id FROM agents WHERE did = $did LIMIT 1")
            .bind(("did", did.to_string()))
            .await
            .map_err(backend)?;
        let ids: Vec<String> = res.take(0).map_err(backend)?;
        Ok(ids.into_iter().next())
    }

    #[instrument(skip(self), fields(sort_by = %query.sort_by))]
    async fn list_agents(&self, query: &AgentQuery) -> StorageResult<Page<Agent>> {
        let filter = if query.category.is_some() {
            " WHERE category = $category"
        } else {
            ""
        };
        let sql = format!(
            "SELECT * FROM agents{filter} ORDER BY {key} DESC, agent_id ASC LIMIT $limit START $start; \
             SELECT count() FROM agents{filter} GROUP ALL;",
            key = query.sort_by.as_str(),
        );

        let mut q = self
            .db
            .query(sql)
            .bind(("limit", query.page.limit() as u64))
            .bind(("start", query.page.offset() as u64));
        if let Some(category) = &query.category {
            q = q.bind(("category", category.clone()));
        }
        let mut res = q.await.map_err(backend)?;

        let rows: Vec<AgentRow> = res.take(0).map_err(backend)?;
        let counts: Vec<CountRow> = res.take(1).map_err(backend)?;
        let total = counts.first().map(|c| c.count).unwrap_or(0);

        debug!(returned = rows.len(), total, "listed agents");
        Ok(Page::new(
            rows.into_iter().map(Agent::from).collect(),
            query.page,
            total,
        ))
    }

    async fn all_agents(&self) -> StorageResult<Vec<Agent>> {
        let mut res = self
            .db
            .query("SELECT * FROM agents ORDER BY agent_id ASC")
            .await
            .map_err(backend)?;
        let rows: Vec<AgentRow> = res.take(0).map_err(backend)?;
        Ok(rows.into_iter().map(Agent::from).collect())
    }

    async fn put_registry_entry(&self, entry: RegistryEntry) -> StorageResult<()> {
        let row = RegistryRow {
            entry_id: entry.id.clone(),
            document: entry.full_json,
        };
        self.db
            .query("UPSERT type::thing('registry', $id) CONTENT $row")
            .bind(("id", entry.id))
            .bind(("row", row))
            .await
            .map_err(backend)?
            .check()
            .map_err(backend)?;
        Ok(())
    }

    async fn get_registry_entry(&self, id: &str) -> StorageResult<Option<RegistryEntry>> {
        let mut res = self
            .db
            .query("SELECT * FROM type::thing('registry', $id)")
            .bind(("id", id.to_string()))
            .await
            .map_err(backend)?;
        let rows: Vec<RegistryRow> = res.take(0).map_err(backend)?;
        Ok(rows.into_iter().next().map(|r| RegistryEntry {
            id: r.entry_id,
            full_json: r.document,
        }))
    }

    async fn list_registry_entries(&self, limit: usize) -> StorageResult<Vec<RegistryEntry>> {
        let mut res = self
            .db
            .query("SELECT * FROM registry ORDER BY entry_id ASC LIMIT $limit")
            .bind(("limit", limit as u64))
            .await
            .map_err(backend)?;
        let rows: Vec<RegistryRow> = res.take(0).map_err(backend)?;
        Ok(rows
            .into_iter()
            .map(|r| RegistryEntry {
                id: r.entry_id,
                full_json: r.document,
            })
            .collect())
    }
}

#[async_trait]
impl RatingLedger for SurrealCatalogStore {
    #[instrument(skip(self, rating, update), fields(agent_id = %update.agent_id))]
    async fn append_rating(
        &self,
        rating: NewRating,
        update: AggregateUpdate,
    ) -> StorageResult<RatingRecord> {
        let _guard = self.append_lock.lock().await;

        let current = self
            .fetch_agent(&update.agent_id)
            .await?
            .ok_or_else(|| StorageError::not_found("agent", update.agent_id.clone()))?;
        if current.num_ratings != update.expected_ratings {
            return Err(StorageError::Conflict {
                entity: "agent",
                key: update.agent_id,
            });
        }

        let agent_id = update.agent_id.clone();
        let hash = rating.hash.clone();

        let result = self
            .db
            .query(APPEND_RATING_SQL)
            .bind(("agent_id", update.agent_id))
            .bind(("expected_ratings", update.expected_ratings))
            .bind(("num_ratings", update.num_ratings))
            .bind(("score_total", update.score_total))
            .bind(("avg_score", update.avg_score))
            .bind(("user_id", rating.user_id))
            .bind(("score", rating.score))
            .bind(("comment", rating.comment))
            .bind(("timestamp", rating.timestamp))
            .bind(("hash", rating.hash))
            .await
            .map_err(backend)?
            .check();

        if let Err(e) = result {
            let msg = e.to_string();
            if is_write_conflict(&msg) {
                debug!("aggregate update lost a race");
                return Err(StorageError::Conflict {
                    entity: "agent",
                    key: agent_id,
                });
            }
            return Err(StorageError::Backend(msg));
        }

        let mut res = self
            .db
            .query(
                "SELECT * FROM ratings WHERE agent_id = $agent_id AND hash = $hash \
                 ORDER BY seq DESC LIMIT 1",
            )
            .bind(("agent_id", agent_id.clone()))
            .bind(("hash", hash))
            .await
            .map_err(backend)?;
        let rows: Vec<RatingRow> = res.take(0).map_err(backend)?;
        let row = rows.into_iter().next().ok_or_else(|| {
            StorageError::Backend(format!("committed rating for {agent_id} not readable"))
        })?;

        debug!(rating_id = row.seq, "rating appended");
        Ok(row.into())
    }

    async fn list_ratings(
        &self,
        agent_id: &str,
        page: PageRequest,
    ) -> StorageResult<Page<RatingRecord>> {
        let mut res = self
            .db
            .query(
                "SELECT * FROM ratings WHERE agent_id = $agent_id \
                 ORDER BY timestamp DESC, seq DESC LIMIT $limit START $start; \
                 SELECT count() FROM ratings WHERE agent_id = $agent_id GROUP ALL;",
            )
            .bind(("agent_id", agent_id.to_string()))
            .bind(("limit", page.limit() as u64))
            .bind(("start", page.offset() as u64))
            .await
            .map_err(backend)?;

        let rows: Vec<RatingRow> = res.take(0).map_err(backend)?;
        let counts: Vec<CountRow> = res.take(1).map_err(backend)?;
        let total = counts.first().map(|c| c.count).unwrap_or(0);

        Ok(Page::new(
            rows.into_iter().map(RatingRecord::from).collect(),
            page,
            total,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflict_detection_matches_guard_and_engine_errors() {
        assert!(is_write_conflict("An error occurred: aggregate_conflict"));
        assert!(is_write_conflict(
            "Failed to commit transaction due to a read or write conflict"
        ));
        assert!(!is_write_conflict("Parse error"));
    }
}
