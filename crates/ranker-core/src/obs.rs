//! Structured lifecycle events.
//!
//! Every event carries an `event = "<domain>.<what>"` field so log pipelines
//! can filter on it. Set `RUST_LOG` for verbosity and `[logging] json = true`
//! for JSON output.

use ranker_state::StorageError;
use tracing::{error, info, warn};

use crate::error::RankerError;
use crate::search::IndexStatus;

/// Emit event: a rating was persisted and the aggregate moved.
pub fn emit_rating_submitted(
    agent_id: &str,
    rating_id: u64,
    num_ratings: u64,
    avg_score: f64,
    attempts: u32,
) {
    info!(
        event = "rating.submitted",
        agent_id = %agent_id,
        rating_id = rating_id,
        num_ratings = num_ratings,
        avg_score = avg_score,
        attempts = attempts,
    );
}

/// Emit event: a recommendation event was written.
pub fn emit_recommendation_logged(did: &str) {
    info!(event = "recommendation.logged", did = %did);
}

/// Emit event: a search completed.
pub fn emit_search_completed(top_k: usize, returned: usize, dropped: usize, elapsed_ms: u64) {
    info!(
        event = "search.completed",
        top_k = top_k,
        returned = returned,
        dropped = dropped,
        elapsed_ms = elapsed_ms,
    );
}

/// Emit event: the index changed state.
pub fn emit_index_state(status: &IndexStatus, vectors: usize) {
    match status {
        IndexStatus::Failed(reason) => {
            warn!(event = "index.state", state = "failed", reason = %reason)
        }
        other => info!(event = "index.state", state = other.as_str(), vectors = vectors),
    }
}

/// Emit event: a store operation failed (error level).
pub fn emit_storage_failure(operation: &str, error: &dyn std::fmt::Display) {
    error!(event = "storage.failure", operation = %operation, error = %error);
}

/// `map_err` adapter: log the failure under `operation`, then lift it into [`RankerError`].
pub(crate) fn storage_failure(
    operation: &'static str,
) -> impl FnOnce(StorageError) -> RankerError {
    move |err| {
        emit_storage_failure(operation, &err);
        RankerError::Storage(err)
    }
}
