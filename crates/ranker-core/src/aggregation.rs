//! Rating aggregation
//!
//! Every rating moves its agent's aggregate by one step:
//!
//! ```text
//! score_total' = score_total + s
//! num_ratings' = num_ratings + 1
//! avg_score'   = round(score_total' / num_ratings', 2)
//! ```
//!
//! The store applies the step only while `num_ratings` is still the value the
//! step was computed from; a lost race is retried from a fresh read.

use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use ranker_state::{
    AggregateUpdate, Agent, CatalogStore, NewRating, Page, PageRequest, RatingLedger,
    RatingRecord, StorageError,
};
use sha2::{Digest, Sha256};
use tracing::{debug, instrument, warn};

use crate::catalog::validate_page;
use crate::error::{RankerError, Result};
use crate::obs;

pub const MIN_SCORE: u8 = 1;
pub const MAX_SCORE: u8 = 5;
pub const MAX_COMMENT_CHARS: usize = 1000;
pub const DEFAULT_MAX_ATTEMPTS: u32 = 8;

/// Round half away from zero to two decimals.
pub fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

/// Hex SHA-256 over `agent_id ‖ user_id ‖ timestamp ‖ score ‖ comment`.
pub fn rating_hash(
    agent_id: &str,
    user_id: Option<&str>,
    timestamp: &str,
    score: u8,
    comment: &str,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(agent_id.as_bytes());
    hasher.update(user_id.unwrap_or("").as_bytes());
    hasher.update(timestamp.as_bytes());
    hasher.update(score.to_string().as_bytes());
    hasher.update(comment.as_bytes());
    hex::encode(hasher.finalize())
}

/// Aggregate after adding `score` to `agent`.
pub fn next_aggregate(agent: &Agent, score: u8) -> AggregateUpdate {
    let num_ratings = agent.num_ratings + 1;
    let score_total = agent.rating_total() + f64::from(score);
    AggregateUpdate {
        agent_id: agent.id.clone(),
        expected_ratings: agent.num_ratings,
        num_ratings,
        score_total,
        avg_score: round2(score_total / num_ratings as f64),
    }
}

fn utc_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false)
}

/// A rating submission before validation.
#[derive(Debug, Clone, Default)]
pub struct RatingInput {
    pub user_id: Option<String>,
    pub score: u8,
    pub comment: Option<String>,
}

impl RatingInput {
    pub fn new(score: u8) -> Self {
        Self {
            score,
            ..Default::default()
        }
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    fn validate(&self) -> Result<()> {
        if !(MIN_SCORE..=MAX_SCORE).contains(&self.score) {
            return Err(RankerError::validation(format!(
                "score must be between {MIN_SCORE} and {MAX_SCORE}, got {}",
                self.score
            )));
        }
        if let Some(comment) = &self.comment {
            let chars = comment.chars().count();
            if chars > MAX_COMMENT_CHARS {
                return Err(RankerError::validation(format!(
                    "comment must be at most {MAX_COMMENT_CHARS} characters, got {chars}"
                )));
            }
        }
        Ok(())
    }
}

/// Applies ratings to the ledger and catalog aggregates.
pub struct AggregationEngine {
    catalog: Arc<dyn CatalogStore>,
    ledger: Arc<dyn RatingLedger>,
    max_attempts: u32,
}

impl AggregationEngine {
    pub fn new(catalog: Arc<dyn CatalogStore>, ledger: Arc<dyn RatingLedger>) -> Self {
        Self {
            catalog,
            ledger,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Validate, persist and fold one rating into its agent's aggregate.
    #[instrument(skip(self, input), fields(score = input.score))]
    pub async fn submit_rating(&self, agent_id: &str, input: RatingInput) -> Result<RatingRecord> {
        input.validate()?;
        let comment = input.comment.unwrap_or_default();

        let mut attempt = 0;
        loop {
            attempt += 1;

            let agent = self
                .catalog
                .get_agent(agent_id)
                .await
                .map_err(obs::storage_failure("rating.lookup"))?
                .ok_or_else(|| RankerError::not_found("agent", agent_id))?;

            let update = next_aggregate(&agent, input.score);
            let timestamp = utc_timestamp();
            let hash = rating_hash(
                agent_id,
                input.user_id.as_deref(),
                &timestamp,
                input.score,
                &comment,
            );
            let rating = NewRating {
                agent_id: agent_id.to_string(),
                user_id: input.user_id.clone(),
                score: input.score,
                comment: comment.clone(),
                timestamp,
                hash,
            };

            let num_ratings = update.num_ratings;
            let avg_score = update.avg_score;
            match self.ledger.append_rating(rating, update).await {
                Ok(record) => {
                    obs::emit_rating_submitted(
                        agent_id,
                        record.id,
                        num_ratings,
                        avg_score,
                        attempt,
                    );
                    return Ok(record);
                }
                Err(e) if e.is_conflict() && attempt < self.max_attempts => {
                    debug!(attempt, "aggregate moved underneath us, retrying");
                    tokio::task::yield_now().await;
                }
                Err(StorageError::NotFound { .. }) => {
                    return Err(RankerError::not_found("agent", agent_id));
                }
                Err(e) => {
                    if e.is_conflict() {
                        warn!(attempts = attempt, "giving up after repeated conflicts");
                    }
                    obs::emit_storage_failure("rating.append", &e);
                    return Err(e.into());
                }
            }
        }
    }

    /// Same as [`submit_rating`](Self::submit_rating), addressed by DID.
    pub async fn submit_rating_by_did(&self, did: &str, input: RatingInput) -> Result<RatingRecord> {
        let agent_id = self.resolve_did(did).await?;
        self.submit_rating(&agent_id, input).await
    }

    /// Ratings of one agent, newest first.
    pub async fn ratings_for_agent(
        &self,
        agent_id: &str,
        page: PageRequest,
    ) -> Result<Page<RatingRecord>> {
        validate_page(page)?;
        let agent = self
            .catalog
            .get_agent(agent_id)
            .await
            .map_err(obs::storage_failure("rating.lookup"))?;
        if agent.is_none() {
            return Err(RankerError::not_found("agent", agent_id));
        }
        self.ledger
            .list_ratings(agent_id, page)
            .await
            .map_err(obs::storage_failure("rating.list"))
    }

    /// Ratings of the agent owning `did`, newest first, annotated with the did.
    pub async fn ratings_for_did(&self, did: &str, page: PageRequest) -> Result<Page<RatingRecord>> {
        validate_page(page)?;
        let agent_id = self.resolve_did(did).await?;
        let ratings = self
            .ledger
            .list_ratings(&agent_id, page)
            .await
            .map_err(obs::storage_failure("rating.list"))?;
        Ok(ratings.map(|mut r| {
            r.did = Some(did.to_string());
            r
        }))
    }

    async fn resolve_did(&self, did: &str) -> Result<String> {
        self.catalog
            .resolve_id_by_did(did)
            .await
            .map_err(obs::storage_failure("rating.lookup"))?
            .ok_or_else(|| RankerError::not_found("agent did", did))
    }
}
