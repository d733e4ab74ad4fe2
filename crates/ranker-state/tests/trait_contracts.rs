//! Trait contract tests for CatalogStore, RatingLedger and RecommendationLog.
//!
//! Each contract is a generic async fn run against the in-memory fakes and
//! the SurrealDB backends (`mem://`). Any conforming implementation must pass.

use chrono::{Duration, TimeZone, Utc};
use ranker_state::fakes::{MemoryCatalogStore, MemoryRecommendationLog};
use ranker_state::storage_traits::*;
use ranker_state::{PageRequest, StorageError, SurrealCatalogStore, SurrealRecommendationLog};

fn agent(id: &str, category: &str, avg: f64, n: u64) -> Agent {
    Agent::new(id, format!("Agent {id}"), format!("did:masumi:{id}"))
        .with_category(category)
        .with_ratings(avg, n)
}

fn rating(agent_id: &str, score: u8, timestamp: &str) -> NewRating {
    NewRating {
        agent_id: agent_id.to_string(),
        user_id: Some("user-1".into()),
        score,
        comment: format!("scored {score}"),
        timestamp: timestamp.to_string(),
        hash: format!("{agent_id}-{timestamp}-{score}"),
    }
}

fn update(agent_id: &str, expected: u64, total: f64) -> AggregateUpdate {
    let n = expected + 1;
    AggregateUpdate {
        agent_id: agent_id.to_string(),
        expected_ratings: expected,
        num_ratings: n,
        score_total: total,
        avg_score: ((total / n as f64) * 100.0).round() / 100.0,
    }
}

// ===========================================================================
// CatalogStore contracts
// ===========================================================================

async fn contract_upsert_and_get<S: CatalogStore>(store: &S) {
    store.upsert_agent(agent("a1", "Finance", 4.5, 2)).await.unwrap();

    let fetched = store.get_agent("a1").await.unwrap().unwrap();
    assert_eq!(fetched.name, "Agent a1");
    assert_eq!(fetched.num_ratings, 2);
    assert!(store.get_agent("missing").await.unwrap().is_none());

    assert_eq!(
        store.resolve_id_by_did("did:masumi:a1").await.unwrap(),
        Some("a1".to_string())
    );
    assert_eq!(store.resolve_id_by_did("did:unknown").await.unwrap(), None);
}

async fn contract_did_is_unique<S: CatalogStore>(store: &S) {
    store.upsert_agent(agent("a1", "Finance", 0.0, 0)).await.unwrap();
    let mut clash = agent("a2", "Finance", 0.0, 0);
    clash.did = "did:masumi:a1".into();

    let err = store.upsert_agent(clash).await.unwrap_err();
    assert!(err.is_conflict(), "expected conflict, got {err:?}");

    // Re-upserting the same agent keeps its did.
    store.upsert_agent(agent("a1", "Legal", 0.0, 0)).await.unwrap();
    let fetched = store.get_agent("a1").await.unwrap().unwrap();
    assert_eq!(fetched.category.as_deref(), Some("Legal"));
}

async fn contract_list_orders_filters_and_counts<S: CatalogStore>(store: &S) {
    for a in [
        agent("f1", "Finance", 4.0, 10),
        agent("f2", "Finance", 5.0, 8),
        agent("f3", "Finance", 3.0, 8),
        agent("f4", "Finance", 2.0, 5),
        agent("f5", "Finance", 1.0, 1),
        agent("x1", "Travel", 5.0, 100),
    ] {
        store.upsert_agent(a).await.unwrap();
    }

    let query = AgentQuery {
        category: Some("Finance".into()),
        sort_by: SortKey::NumRatings,
        page: PageRequest::new(1, 2),
    };
    let page = store.list_agents(&query).await.unwrap();
    let ids: Vec<_> = page.items.iter().map(|a| a.id.as_str()).collect();
    assert_eq!(ids, vec!["f1", "f2"]);
    assert_eq!(page.total_items, 5);

    let page2 = store
        .list_agents(&AgentQuery {
            page: PageRequest::new(2, 2),
            ..query.clone()
        })
        .await
        .unwrap();
    let ids: Vec<_> = page2.items.iter().map(|a| a.id.as_str()).collect();
    assert_eq!(ids, vec!["f3", "f4"]);

    let beyond = store
        .list_agents(&AgentQuery {
            page: PageRequest::new(9, 2),
            ..query.clone()
        })
        .await
        .unwrap();
    assert!(beyond.items.is_empty());
    assert_eq!(beyond.total_items, 5);

    let by_score = store
        .list_agents(&AgentQuery {
            category: None,
            sort_by: SortKey::AvgScore,
            page: PageRequest::new(1, 3),
        })
        .await
        .unwrap();
    let ids: Vec<_> = by_score.items.iter().map(|a| a.id.as_str()).collect();
    assert_eq!(ids, vec!["f2", "x1", "f1"]);
    assert_eq!(by_score.total_items, 6);

    let none = store
        .list_agents(&AgentQuery {
            category: Some("Nope".into()),
            ..AgentQuery::default()
        })
        .await
        .unwrap();
    assert!(none.items.is_empty());
    assert_eq!(none.total_items, 0);
}

async fn contract_all_agents_ordered_by_id<S: CatalogStore>(store: &S) {
    for id in ["c", "a", "b"] {
        store.upsert_agent(agent(id, "Misc", 0.0, 0)).await.unwrap();
    }
    let ids: Vec<_> = store
        .all_agents()
        .await
        .unwrap()
        .into_iter()
        .map(|a| a.id)
        .collect();
    assert_eq!(ids, vec!["a", "b", "c"]);
}

async fn contract_registry_documents<S: CatalogStore>(store: &S) {
    let doc = serde_json::json!({"name": "Alpha", "capabilities": ["x"]});
    store
        .put_registry_entry(RegistryEntry {
            id: "b".into(),
            full_json: doc.clone(),
        })
        .await
        .unwrap();
    store
        .put_registry_entry(RegistryEntry {
            id: "a".into(),
            full_json: serde_json::json!("not an object"),
        })
        .await
        .unwrap();

    let fetched = store.get_registry_entry("b").await.unwrap().unwrap();
    assert_eq!(fetched.full_json, doc);
    assert!(store.get_registry_entry("zzz").await.unwrap().is_none());

    let listed = store.list_registry_entries(10).await.unwrap();
    let ids: Vec<_> = listed.iter().map(|e| e.id.as_str()).collect();
    assert_eq!(ids, vec!["a", "b"]);
    assert_eq!(store.list_registry_entries(1).await.unwrap().len(), 1);
}

// ===========================================================================
// RatingLedger contracts
// ===========================================================================

async fn contract_append_updates_aggregate<S: CatalogStore + RatingLedger>(store: &S) {
    store.upsert_agent(agent("a1", "Finance", 0.0, 0)).await.unwrap();

    let r1 = store
        .append_rating(rating("a1", 5, "2024-01-01T00:00:00.000001+00:00"), update("a1", 0, 5.0))
        .await
        .unwrap();
    let r2 = store
        .append_rating(rating("a1", 4, "2024-01-01T00:00:00.000002+00:00"), update("a1", 1, 9.0))
        .await
        .unwrap();
    assert!(r2.id > r1.id, "ids must increase");
    assert_eq!(r2.score, 4);
    assert_eq!(r2.user_id.as_deref(), Some("user-1"));

    let a = store.get_agent("a1").await.unwrap().unwrap();
    assert_eq!(a.num_ratings, 2);
    assert_eq!(a.avg_score, 4.5);
    assert_eq!(a.rating_total(), 9.0);
}

async fn contract_stale_expectation_conflicts<S: CatalogStore + RatingLedger>(store: &S) {
    store.upsert_agent(agent("a1", "Finance", 4.0, 3)).await.unwrap();

    let err = store
        .append_rating(rating("a1", 5, "2024-01-01T00:00:00+00:00"), update("a1", 2, 17.0))
        .await
        .unwrap_err();
    assert!(err.is_conflict());

    let a = store.get_agent("a1").await.unwrap().unwrap();
    assert_eq!(a.num_ratings, 3, "rejected write must not touch the aggregate");
    let page = store.list_ratings("a1", PageRequest::default()).await.unwrap();
    assert_eq!(page.total_items, 0, "rejected write must not insert a rating");
}

async fn contract_missing_agent_not_found<S: RatingLedger>(store: &S) {
    let err = store
        .append_rating(rating("ghost", 3, "2024-01-01T00:00:00+00:00"), update("ghost", 0, 3.0))
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::NotFound { entity: "agent", .. }));
}

async fn contract_list_ratings_newest_first<S: CatalogStore + RatingLedger>(store: &S) {
    store.upsert_agent(agent("a1", "Finance", 0.0, 0)).await.unwrap();
    store.upsert_agent(agent("a2", "Finance", 0.0, 0)).await.unwrap();

    let stamps = [
        "2024-03-01T00:00:00.000000+00:00",
        "2024-01-01T00:00:00.000000+00:00",
        "2024-02-01T00:00:00.000000+00:00",
    ];
    let mut total = 0.0;
    for (i, ts) in stamps.iter().enumerate() {
        total += 3.0;
        store
            .append_rating(rating("a1", 3, ts), update("a1", i as u64, total))
            .await
            .unwrap();
    }
    store
        .append_rating(rating("a2", 1, stamps[0]), update("a2", 0, 1.0))
        .await
        .unwrap();

    let page = store.list_ratings("a1", PageRequest::new(1, 2)).await.unwrap();
    assert_eq!(page.total_items, 3);
    let got: Vec<_> = page.items.iter().map(|r| r.timestamp.as_str()).collect();
    assert_eq!(got, vec![stamps[0], stamps[2]]);

    let rest = store.list_ratings("a1", PageRequest::new(2, 2)).await.unwrap();
    assert_eq!(rest.items.len(), 1);
    assert_eq!(rest.items[0].timestamp, stamps[1]);
}

// ===========================================================================
// RecommendationLog contracts
// ===========================================================================

async fn contract_events_append_and_dedupe<L: RecommendationLog>(log: &L) {
    let t0 = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
    let e1 = log.append_event("did:b", t0).await.unwrap();
    let e2 = log.append_event("did:b", t0 + Duration::seconds(5)).await.unwrap();
    log.append_event("did:a", t0).await.unwrap();

    assert_ne!(e1.id, e2.id, "every append is a distinct event");
    assert_eq!(log.distinct_dids().await.unwrap(), vec!["did:a", "did:b"]);

    let events = log.events_for("did:b").await.unwrap();
    assert_eq!(events.len(), 2);
    assert!(events[0].timestamp <= events[1].timestamp);
    assert_eq!(events[0].timestamp, t0);
}

async fn contract_curated_list<L: RecommendationLog>(log: &L) {
    for (did, rank) in [("did:z", 1), ("did:b", 2), ("did:a", 1)] {
        log.upsert_curated(RecommendedAgent {
            did: did.into(),
            rank,
            note: None,
        })
        .await
        .unwrap();
    }
    log.upsert_curated(RecommendedAgent {
        did: "did:b".into(),
        rank: 0,
        note: Some("promoted".into()),
    })
    .await
    .unwrap();

    let dids: Vec<_> = log
        .curated()
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.did)
        .collect();
    assert_eq!(dids, vec!["did:b", "did:a", "did:z"]);

    assert!(log.remove_curated("did:a").await.unwrap());
    assert!(!log.remove_curated("did:a").await.unwrap());
    assert_eq!(log.curated().await.unwrap().len(), 2);
}

// ===========================================================================
// Runners
// ===========================================================================

macro_rules! catalog_contracts {
    ($modname:ident, $ctor:expr) => {
        mod $modname {
            use super::*;

            #[tokio::test]
            async fn upsert_and_get() {
                contract_upsert_and_get(&$ctor).await;
            }

            #[tokio::test]
            async fn did_is_unique() {
                contract_did_is_unique(&$ctor).await;
            }

            #[tokio::test]
            async fn list_orders_filters_and_counts() {
                contract_list_orders_filters_and_counts(&$ctor).await;
            }

            #[tokio::test]
            async fn all_agents_ordered_by_id() {
                contract_all_agents_ordered_by_id(&$ctor).await;
            }

            #[tokio::test]
            async fn registry_documents() {
                contract_registry_documents(&$ctor).await;
            }

            #[tokio::test]
            async fn append_updates_aggregate() {
                contract_append_updates_aggregate(&$ctor).await;
            }

            #[tokio::test]
            async fn stale_expectation_conflicts() {
                contract_stale_expectation_conflicts(&$ctor).await;
            }

            #[tokio::test]
            async fn missing_agent_not_found() {
                contract_missing_agent_not_found(&$ctor).await;
            }

            #[tokio::test]
            async fn list_ratings_newest_first() {
                contract_list_ratings_newest_first(&$ctor).await;
            }
        }
    };
}

macro_rules! recommendation_contracts {
    ($modname:ident, $ctor:expr) => {
        mod $modname {
            use super::*;

            #[tokio::test]
            async fn events_append_and_dedupe() {
                contract_events_append_and_dedupe(&$ctor).await;
            }

            #[tokio::test]
            async fn curated_list() {
                contract_curated_list(&$ctor).await;
            }
        }
    };
}

catalog_contracts!(memory_catalog, MemoryCatalogStore::new());
catalog_contracts!(
    surreal_catalog,
    SurrealCatalogStore::in_memory().await.unwrap()
);
recommendation_contracts!(memory_recommendations, MemoryRecommendationLog::new());
recommendation_contracts!(
    surreal_recommendations,
    SurrealRecommendationLog::in_memory().await.unwrap()
);

// ===========================================================================
// Fake-only behavior
// ===========================================================================

#[tokio::test]
async fn memory_log_reports_unavailable_when_offline() {
    let log = MemoryRecommendationLog::new();
    log.set_available(false);
    let err = log.append_event("did:a", Utc::now()).await.unwrap_err();
    assert!(matches!(err, StorageError::Unavailable(_)));

    log.set_available(true);
    log.append_event("did:a", Utc::now()).await.unwrap();
    assert_eq!(log.event_count(), 1);
}

#[tokio::test]
async fn memory_catalog_forced_conflicts_drain() {
    let store = MemoryCatalogStore::with_agents([agent("a1", "Finance", 0.0, 0)]);
    store.force_conflicts(1);

    let first = store
        .append_rating(rating("a1", 5, "2024-01-01T00:00:00+00:00"), update("a1", 0, 5.0))
        .await;
    assert!(first.unwrap_err().is_conflict());

    store
        .append_rating(rating("a1", 5, "2024-01-01T00:00:00+00:00"), update("a1", 0, 5.0))
        .await
        .unwrap();
    assert_eq!(store.rating_count(), 1);
}
