//! Row shapes for the SurrealDB tables
//!
//! Tables:
//! - agents: catalog entries with their rating aggregates
//! - ratings: append-only rating ledger
//! - registry: opaque registry documents
//! - recommendation_events / recommended_agents: recommendation store
//!
//! Rows convert to and from the `storage_traits` types at the boundary so the
//! public types never carry engine-specific fields.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::storage_traits::{Agent, RatingRecord, RecommendationEvent, RecommendedAgent};

/// Module for serializing chrono DateTime to SurrealDB datetime format
pub(crate) mod surreal_datetime {
    use chrono::{DateTime, Utc};
    use serde::{self, Deserialize, Deserializer, Serializer};
    use surrealdb::sql::Datetime as SurrealDatetime;

    pub fn serialize<S>(date: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let sd = SurrealDatetime::from(*date);
        serde::Serialize::serialize(&sd, serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let sd = SurrealDatetime::deserialize(deserializer)?;
        Ok(DateTime::from(sd))
    }
}

/// `agents` row. The record id is `agents:⟨agent_id⟩`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct AgentRow {
    pub agent_id: String,
    pub name: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub description: String,
    pub did: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub price_usd: f64,
    #[serde(default)]
    pub avg_score: f64,
    #[serde(default)]
    pub num_ratings: u64,
    #[serde(default)]
    pub img_url: Option<String>,
    #[serde(default)]
    pub score_total: Option<f64>,
}

impl From<Agent> for AgentRow {
    fn from(a: Agent) -> Self {
        Self {
            agent_id: a.id,
            name: a.name,
            category: a.category,
            description: a.description,
            did: a.did,
            url: a.url,
            price_usd: a.price_usd,
            avg_score: a.avg_score,
            num_ratings: a.num_ratings,
            img_url: a.img_url,
            score_total: a.score_total,
        }
    }
}

impl From<AgentRow> for Agent {
    fn from(r: AgentRow) -> Self {
        Self {
            id: r.agent_id,
            name: r.name,
            category: r.category,
            description: r.description,
            did: r.did,
            url: r.url,
            price_usd: r.price_usd,
            avg_score: r.avg_score,
            num_ratings: r.num_ratings,
            img_url: r.img_url,
            score_total: r.score_total,
        }
    }
}

/// `ratings` row; `seq` comes from the `counters:ratings` record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct RatingRow {
    pub seq: u64,
    pub agent_id: String,
    #[serde(default)]
    pub user_id: Option<String>,
    pub score: u8,
    #[serde(default)]
    pub comment: String,
    pub timestamp: String,
    pub hash: String,
}

impl From<RatingRow> for RatingRecord {
    fn from(r: RatingRow) -> Self {
        Self {
            id: r.seq,
            agent_id: r.agent_id,
            user_id: r.user_id,
            score: r.score,
            comment: r.comment,
            timestamp: r.timestamp,
            hash: r.hash,
            did: None,
        }
    }
}

/// `registry` row holding one opaque document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct RegistryRow {
    pub entry_id: String,
    pub document: serde_json::Value,
}

/// `count()` projection.
#[derive(Debug, Deserialize)]
pub(crate) struct CountRow {
    pub count: u64,
}

/// `recommendation_events` row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct EventRow {
    pub event_id: String,
    pub did: String,
    #[serde(with = "surreal_datetime")]
    pub timestamp: DateTime<Utc>,
}

impl From<EventRow> for RecommendationEvent {
    fn from(r: EventRow) -> Self {
        Self {
            id: r.event_id,
            did: r.did,
            timestamp: r.timestamp,
        }
    }
}

/// `recommended_agents` row. The record id is `recommended_agents:⟨did⟩`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct CuratedRow {
    pub did: String,
    #[serde(default)]
    pub rank: i64,
    #[serde(default)]
    pub note: Option<String>,
}

impl From<RecommendedAgent> for CuratedRow {
    fn from(e: RecommendedAgent) -> Self {
        Self {
            did: e.did,
            rank: e.rank,
            note: e.note,
        }
    }
}

impl From<CuratedRow> for RecommendedAgent {
    fn from(r: CuratedRow) -> Self {
        Self {
            did: r.did,
            rank: r.rank,
            note: r.note,
        }
    }
}
