//! Structured lifecycle events emitted by the services.

use std::sync::Arc;

use ranker_core::aggregation::{AggregationEngine, RatingInput};
use ranker_core::catalog::CatalogService;
use ranker_core::obs::{
    emit_index_state, emit_rating_submitted, emit_recommendation_logged, emit_search_completed,
    emit_storage_failure,
};
use ranker_core::recommendation::RecommendationService;
use ranker_core::search::{HashingEncoder, QueryEngine};
use ranker_core::{Agent, ErrorKind, IndexStatus};
use ranker_state::{AgentQuery, PageRequest};
use ranker_state::fakes::{MemoryCatalogStore, MemoryRecommendationLog};
use tempfile::TempDir;
use tracing_test::traced_test;

#[traced_test]
#[test]
fn rating_event_carries_aggregate() {
    emit_rating_submitted("a1", 17, 3, 4.33, 2);

    assert!(logs_contain("rating.submitted"));
    assert!(logs_contain("agent_id=a1"));
    assert!(logs_contain("avg_score=4.33"));
}

#[traced_test]
#[test]
fn failed_index_logs_reason() {
    emit_index_state(&IndexStatus::Failed("vectors.bin missing".into()), 0);
    assert!(logs_contain("index.state"));
    assert!(logs_contain("vectors.bin missing"));
}

#[traced_test]
#[test]
fn remaining_emitters_log_their_event_names() {
    emit_recommendation_logged("did:masumi:x");
    emit_search_completed(3, 2, 1, 0);
    emit_storage_failure("rating.append", &"boom");

    assert!(logs_contain("recommendation.logged"));
    assert!(logs_contain("search.completed"));
    assert!(logs_contain("storage.failure"));
}

#[traced_test]
#[tokio::test]
async fn services_emit_events_on_success() {
    let store = Arc::new(MemoryCatalogStore::with_agents(vec![Agent::new(
        "a1",
        "Alpha",
        "did:masumi:alpha",
    )]));
    let engine = AggregationEngine::new(store.clone(), store.clone());
    engine
        .submit_rating("a1", RatingInput::new(4))
        .await
        .unwrap();
    assert!(logs_contain("rating.submitted"));

    let recs = RecommendationService::new(store, Some(Arc::new(MemoryRecommendationLog::new())));
    recs.add_recommendation("did:masumi:alpha").await.unwrap();
    assert!(logs_contain("recommendation.logged"));
}

#[traced_test]
#[tokio::test]
async fn failed_reads_are_logged_with_their_operation() {
    let store = Arc::new(MemoryCatalogStore::with_agents(vec![Agent::new(
        "a1",
        "Alpha",
        "did:masumi:alpha",
    )]));
    store.fail_reads(true);

    let catalog = CatalogService::new(store.clone());
    let err = catalog
        .list_agents(&AgentQuery::default())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Internal);
    assert!(logs_contain("storage.failure"));
    assert!(logs_contain("catalog.list"));

    let engine = AggregationEngine::new(store.clone(), store.clone());
    engine
        .ratings_for_agent("a1", PageRequest::new(1, 10))
        .await
        .unwrap_err();
    assert!(logs_contain("rating.lookup"));

    let recs = RecommendationService::new(store, Some(Arc::new(MemoryRecommendationLog::new())));
    recs.add_recommendation("did:masumi:alpha")
        .await
        .unwrap_err();
    assert!(logs_contain("recommendation.resolve_did"));
}

#[traced_test]
#[test]
fn loading_a_missing_index_is_logged() {
    let dir = TempDir::new().unwrap();
    let engine = QueryEngine::load(&dir.path().join("absent"), Arc::new(HashingEncoder::new(8)));

    assert!(!engine.is_ready());
    assert!(logs_contain("state=\"loading\""));
    assert!(logs_contain("failed"));
}
