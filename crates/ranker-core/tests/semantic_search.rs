//! Index build, artifact round trip through disk and query resolution.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use ranker_core::search::artifacts::{MetadataRecord, METADATA_FILE, VECTORS_FILE};
use ranker_core::search::{
    build_artifacts, write_artifacts, Encoder, HashingEncoder, IndexStatus, QueryEngine,
};
use ranker_core::{Agent, RankerError};
use tempfile::TempDir;

const DIM: usize = 512;

fn encoder() -> Arc<dyn Encoder> {
    Arc::new(HashingEncoder::new(DIM))
}

fn catalog() -> Vec<Agent> {
    vec![
        Agent::new("books", "Ledger Bot", "did:masumi:books")
            .with_description("invoice accounting and ledger reconciliation"),
        Agent::new("weather", "Weather Oracle", "did:masumi:weather")
            .with_description("forecasts rain wind and storms"),
        Agent::new("travel", "Trip Planner", "did:masumi:travel")
            .with_description("finds flights hotels and trains"),
    ]
}

async fn built_dir(agents: &[Agent]) -> TempDir {
    let dir = TempDir::new().unwrap();
    let (set, report) = build_artifacts(agents, encoder().as_ref()).await.unwrap();
    assert!(report.skipped.is_empty());
    write_artifacts(dir.path(), &set).unwrap();
    dir
}

fn load(dir: &Path) -> QueryEngine {
    QueryEngine::load(dir, encoder())
}

#[tokio::test]
async fn relevant_agent_ranks_first() {
    let dir = built_dir(&catalog()).await;
    let engine = load(dir.path());
    assert_eq!(engine.status(), &IndexStatus::Ready);
    assert_eq!(engine.len(), 3);

    let hits = engine
        .search("invoice accounting reconciliation", 3)
        .await
        .unwrap();
    assert_eq!(hits.len(), 3);
    assert_eq!(hits[0].id, "books");
    assert_eq!(hits[0].did, "did:masumi:books");
    assert_eq!(hits[0].name, "Ledger Bot");
    assert!(hits.windows(2).all(|w| w[0].score >= w[1].score));

    let hits = engine.search("rain storms forecasts", 1).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].id, "weather");
}

#[tokio::test]
async fn top_k_beyond_index_size_returns_what_exists() {
    let dir = built_dir(&catalog()).await;
    let engine = load(dir.path());

    let hits = engine.search("anything at all", 50).await.unwrap();
    assert_eq!(hits.len(), 3);
    assert!(hits.windows(2).all(|w| w[0].score >= w[1].score));
}

#[tokio::test]
async fn missing_artifacts_fail_the_engine() {
    let dir = TempDir::new().unwrap();
    let engine = load(&dir.path().join("never-built"));

    assert!(matches!(engine.status(), IndexStatus::Failed(_)));
    let err = engine.search("ledger", 3).await.unwrap_err();
    assert!(matches!(err, RankerError::ServiceUnavailable(_)));
}

#[tokio::test]
async fn tampered_vectors_fail_the_engine() {
    let dir = built_dir(&catalog()).await;
    let path = dir.path().join(VECTORS_FILE);
    let mut bytes = fs::read(&path).unwrap();
    let last = bytes.len() - 1;
    bytes[last] ^= 0xFF;
    fs::write(&path, bytes).unwrap();

    let engine = load(dir.path());
    match engine.status() {
        IndexStatus::Failed(reason) => assert!(reason.contains("digest"), "{reason}"),
        other => panic!("expected failed engine, got {other:?}"),
    }
}

#[tokio::test]
async fn encoder_with_other_dimension_fails_the_engine() {
    let dir = built_dir(&catalog()).await;
    let engine = QueryEngine::load(dir.path(), Arc::new(HashingEncoder::new(64)));
    assert!(matches!(engine.status(), IndexStatus::Failed(_)));
}

#[tokio::test]
async fn short_metadata_is_served_without_orphans() {
    let dir = built_dir(&catalog()).await;
    let path = dir.path().join(METADATA_FILE);
    let mut metadata: Vec<MetadataRecord> =
        serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
    metadata.truncate(2);
    fs::write(&path, serde_json::to_vec(&metadata).unwrap()).unwrap();

    let engine = load(dir.path());
    assert!(engine.is_ready());

    let hits = engine.search("trains hotels flights", 50).await.unwrap();
    assert!(hits.len() <= 2);
    assert!(hits.iter().all(|h| h.id != "travel"));
}

#[tokio::test]
async fn empty_catalog_builds_an_empty_but_ready_index() {
    let dir = built_dir(&[]).await;
    let engine = load(dir.path());
    assert!(engine.is_ready());
    assert!(engine.is_empty());
    assert!(engine.search("anything", 3).await.unwrap().is_empty());
}

#[tokio::test]
async fn rebuilding_replaces_artifacts_in_place() {
    let dir = built_dir(&catalog()).await;

    let mut more = catalog();
    more.push(
        Agent::new("legal", "Contract Clerk", "did:masumi:legal")
            .with_description("drafts contracts and clauses"),
    );
    let (set, _) = build_artifacts(&more, encoder().as_ref()).await.unwrap();
    write_artifacts(dir.path(), &set).unwrap();

    let engine = load(dir.path());
    assert_eq!(engine.len(), 4);
    let hits = engine.search("contracts clauses", 1).await.unwrap();
    assert_eq!(hits[0].id, "legal");
}
