//! Storage trait definitions for the ranker
//!
//! These traits define the repository boundaries:
//! - `CatalogStore`: agent records, derived aggregates, opaque registry documents
//! - `RatingLedger`: append-only ratings applied atomically with the aggregate update
//! - `RecommendationLog`: recommendation events and the curated list
//!
//! `CatalogStore` and `RatingLedger` live on one storage engine instance.
//! `RecommendationLog` lives on a second, independent instance; nothing in
//! these traits spans both. In-memory fakes are provided via the `fakes`
//! module.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StorageError;
use crate::pagination::{Page, PageRequest};

/// Result type for storage operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

/// A catalog entry together with its rating aggregates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    pub id: String,
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
    /// Sum of all rating scores. Absent for agents ingested with only a mean
    /// and a count, in which case it is derived from those two.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score_total: Option<f64>,
}

impl Agent {
    /// A fresh, unrated agent.
    pub fn new(id: impl Into<String>, name: impl Into<String>, did: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            category: None,
            description: String::new(),
            did: did.into(),
            url: None,
            price_usd: 0.0,
            avg_score: 0.0,
            num_ratings: 0,
            img_url: None,
            score_total: None,
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Seed aggregates, e.g. when ingesting an agent rated elsewhere.
    pub fn with_ratings(mut self, avg_score: f64, num_ratings: u64) -> Self {
        self.avg_score = avg_score;
        self.num_ratings = num_ratings;
        self.score_total = None;
        self
    }

    /// Running sum of scores backing `avg_score`.
    pub fn rating_total(&self) -> f64 {
        self.score_total
            .unwrap_or(self.avg_score * self.num_ratings as f64)
    }

    /// Web path of the agent image, served from `/images/<file name>`.
    pub fn image_path(&self) -> Option<String> {
        let raw = self.img_url.as_deref()?.trim();
        let file = raw.rsplit(['/', '\\']).next().unwrap_or(raw);
        if file.is_empty() {
            return None;
        }
        Some(format!("/images/{file}"))
    }
}

/// Column a catalog listing is ordered by (always descending).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    #[default]
    AvgScore,
    NumRatings,
}

impl SortKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortKey::AvgScore => "avg_score",
            SortKey::NumRatings => "num_ratings",
        }
    }
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SortKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "avg_score" => Ok(SortKey::AvgScore),
            "num_ratings" => Ok(SortKey::NumRatings),
            other => Err(format!(
                "unsupported sort key '{other}' (expected avg_score or num_ratings)"
            )),
        }
    }
}

/// Filter, order and window of a catalog listing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AgentQuery {
    pub category: Option<String>,
    pub sort_by: SortKey,
    pub page: PageRequest,
}

/// Opaque registry document keyed by agent id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistryEntry {
    pub id: String,
    pub full_json: serde_json::Value,
}

/// Agent catalog persistence.
///
/// Guarantees:
/// - `did` is unique across agents.
/// - `list_agents` orders by the sort key descending, then id ascending, and
///   reports `total_items` for the filtered set before pagination.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Insert or replace an agent record.
    async fn upsert_agent(&self, agent: Agent) -> StorageResult<()>;

    /// Fetch an agent by primary key.
    async fn get_agent(&self, id: &str) -> StorageResult<Option<Agent>>;

    /// Map an external DID to the internal id.
    async fn resolve_id_by_did(&self, did: &str) -> StorageResult<Option<String>>;

    /// One page of the filtered, ordered catalog.
    async fn list_agents(&self, query: &AgentQuery) -> StorageResult<Page<Agent>>;

    /// Point-in-time read of every agent, ordered by id.
    async fn all_agents(&self) -> StorageResult<Vec<Agent>>;

    /// Store an opaque registry document, replacing any previous one.
    async fn put_registry_entry(&self, entry: RegistryEntry) -> StorageResult<()>;

    /// Fetch a registry document by id.
    async fn get_registry_entry(&self, id: &str) -> StorageResult<Option<RegistryEntry>>;

    /// Up to `limit` registry documents ordered by id.
    async fn list_registry_entries(&self, limit: usize) -> StorageResult<Vec<RegistryEntry>>;
}

// ---------------------------------------------------------------------------
// RatingLedger
// ---------------------------------------------------------------------------

/// A rating ready to be persisted; every field is final except the id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewRating {
    pub agent_id: String,
    pub user_id: Option<String>,
    pub score: u8,
    pub comment: String,
    pub timestamp: String,
    pub hash: String,
}

/// A persisted rating.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatingRecord {
    pub id: u64,
    pub agent_id: String,
    pub user_id: Option<String>,
    pub score: u8,
    pub comment: String,
    pub timestamp: String,
    pub hash: String,
    /// Owner DID, filled in by did-based listings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub did: Option<String>,
}

impl RatingRecord {
    pub fn from_new(id: u64, rating: NewRating) -> Self {
        Self {
            id,
            agent_id: rating.agent_id,
            user_id: rating.user_id,
            score: rating.score,
            comment: rating.comment,
            timestamp: rating.timestamp,
            hash: rating.hash,
            did: None,
        }
    }
}

/// Compare-and-swap aggregate write applied together with a rating insert.
///
/// The store applies it only while the agent still has `expected_ratings`
/// ratings; otherwise the whole write is rejected with a conflict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateUpdate {
    pub agent_id: String,
    pub expected_ratings: u64,
    pub num_ratings: u64,
    pub score_total: f64,
    pub avg_score: f64,
}

/// Append-only rating ledger.
///
/// Guarantees:
/// - `append_rating` inserts the rating and applies the aggregate update in
///   one transaction: both become visible or neither does.
/// - Missing agent → `StorageError::NotFound`; stale `expected_ratings` →
///   `StorageError::Conflict`.
/// - Rating ids increase monotonically.
#[async_trait]
pub trait RatingLedger: Send + Sync {
    async fn append_rating(
        &self,
        rating: NewRating,
        update: AggregateUpdate,
    ) -> StorageResult<RatingRecord>;

    /// Ratings of one agent, newest first (timestamp desc, id desc).
    async fn list_ratings(
        &self,
        agent_id: &str,
        page: PageRequest,
    ) -> StorageResult<Page<RatingRecord>>;
}

// ---------------------------------------------------------------------------
// RecommendationLog
// ---------------------------------------------------------------------------

/// A curated, hand-ranked agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecommendedAgent {
    pub did: String,
    #[serde(default)]
    pub rank: i64,
    #[serde(default)]
    pub note: Option<String>,
}

/// One "this DID was recommended" event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecommendationEvent {
    pub id: String,
    pub did: String,
    pub timestamp: DateTime<Utc>,
}

/// Recommendation event log and curated list.
///
/// Guarantees:
/// - Events are append-only; every append creates a distinct event.
/// - `distinct_dids` is deduplicated and ascending.
/// - `curated` is ordered by rank ascending, then did ascending.
/// - A store that cannot be reached reports `StorageError::Unavailable`.
#[async_trait]
pub trait RecommendationLog: Send + Sync {
    async fn append_event(
        &self,
        did: &str,
        timestamp: DateTime<Utc>,
    ) -> StorageResult<RecommendationEvent>;

    async fn distinct_dids(&self) -> StorageResult<Vec<String>>;

    /// Every event recorded for one DID, oldest first.
    async fn events_for(&self, did: &str) -> StorageResult<Vec<RecommendationEvent>>;

    async fn upsert_curated(&self, entry: RecommendedAgent) -> StorageResult<()>;

    /// Remove a curated entry. Returns whether it existed.
    async fn remove_curated(&self, did: &str) -> StorageResult<bool>;

    async fn curated(&self) -> StorageResult<Vec<RecommendedAgent>>;
}

/// Sort curated entries into their canonical order.
pub fn sort_curated(entries: &mut [RecommendedAgent]) {
    entries.sort_by(|a, b| a.rank.cmp(&b.rank).then_with(|| a.did.cmp(&b.did)));
}

/// Order agents for a listing: `sort_by` descending, then id ascending.
pub fn sort_agents(agents: &mut [Agent], sort_by: SortKey) {
    agents.sort_by(|a, b| {
        let primary = match sort_by {
            SortKey::AvgScore => b.avg_score.total_cmp(&a.avg_score),
            SortKey::NumRatings => b.num_ratings.cmp(&a.num_ratings),
        };
        primary.then_with(|| a.id.cmp(&b.id))
    });
}
