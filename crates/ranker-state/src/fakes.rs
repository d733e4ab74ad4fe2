//! In-memory fakes for storage traits (testing only)
//!
//! Provides `MemoryCatalogStore` (catalog + rating ledger) and
//! `MemoryRecommendationLog` that satisfy the trait contracts without any
//! external dependencies. Both carry a few knobs for driving failure paths.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::StorageError;
use crate::pagination::{Page, PageRequest};
use crate::storage_traits::*;

// ---------------------------------------------------------------------------
// MemoryCatalogStore
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct CatalogState {
    agents: HashMap<String, Agent>,
    ratings: Vec<RatingRecord>,
    next_rating_id: u64,
}

/// In-memory catalog and rating ledger.
///
/// One mutex guards agents and ratings together, which makes
/// `append_rating` atomic.
#[derive(Debug, Default)]
pub struct MemoryCatalogStore {
    state: Mutex<CatalogState>,
    registry: Mutex<BTreeMap<String, RegistryEntry>>,
    forced_conflicts: AtomicUsize,
    failing_reads: AtomicBool,
}

impl MemoryCatalogStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a store with agents.
    pub fn with_agents(agents: impl IntoIterator<Item = Agent>) -> Self {
        let store = Self::new();
        {
            let mut state = store.state.lock().unwrap();
            for agent in agents {
                state.agents.insert(agent.id.clone(), agent);
            }
        }
        store
    }

    /// Delete an agent out from under any in-flight operation.
    pub fn remove_agent(&self, id: &str) -> Option<Agent> {
        self.state.lock().unwrap().agents.remove(id)
    }

    /// Make the next `n` `append_rating` calls fail with a conflict.
    pub fn force_conflicts(&self, n: usize) {
        self.forced_conflicts.store(n, Ordering::SeqCst);
    }

    /// Make every read fail with a backend error until switched back off.
    pub fn fail_reads(&self, failing: bool) {
        self.failing_reads.store(failing, Ordering::SeqCst);
    }

    /// Number of ratings persisted so far.
    pub fn rating_count(&self) -> usize {
        self.state.lock().unwrap().ratings.len()
    }

    fn ensure_readable(&self) -> StorageResult<()> {
        if self.failing_reads.load(Ordering::SeqCst) {
            Err(StorageError::Backend("catalog read failed".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl CatalogStore for MemoryCatalogStore {
    async fn upsert_agent(&self, agent: Agent) -> StorageResult<()> {
        let mut state = self.state.lock().unwrap();
        let did_taken = state
            .agents
            .values()
            .any(|a| a.did == agent.did && a.id != agent.id);
        if did_taken {
            return Err(StorageError::Conflict {
                entity: "agent did",
                key: agent.did,
            });
        }
        state.agents.insert(agent.id.clone(), agent);
        Ok(())
    }

    async fn get_agent(&self, id: &str) -> StorageResult<Option<Agent>> {
        self.ensure_readable()?;
        Ok(self.state.lock().unwrap().agents.get(id).cloned())
    }

    async fn resolve_id_by_did(&self, did: &str) -> StorageResult<Option<String>> {
        self.ensure_readable()?;
        let state = self.state.lock().unwrap();
        Ok(state
            .agents
            .values()
            .find(|a| a.did == did)
            .map(|a| a.id.clone()))
    }

    async fn list_agents(&self, query: &AgentQuery) -> StorageResult<Page<Agent>> {
        self.ensure_readable()?;
        let mut matching: Vec<Agent> = {
            let state = self.state.lock().unwrap();
            state
                .agents
                .values()
                .filter(|a| match &query.category {
                    Some(c) => a.category.as_deref() == Some(c.as_str()),
                    None => true,
                })
                .cloned()
                .collect()
        };
        sort_agents(&mut matching, query.sort_by);
        Ok(Page::from_sorted(matching, query.page))
    }

    async fn all_agents(&self) -> StorageResult<Vec<Agent>> {
        self.ensure_readable()?;
        let mut agents: Vec<Agent> = self
            .state
            .lock()
            .unwrap()
            .agents
            .values()
            .cloned()
            .collect();
        agents.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(agents)
    }

    async fn put_registry_entry(&self, entry: RegistryEntry) -> StorageResult<()> {
        self.registry
            .lock()
            .unwrap()
            .insert(entry.id.clone(), entry);
        Ok(())
    }

    async fn get_registry_entry(&self, id: &str) -> StorageResult<Option<RegistryEntry>> {
        self.ensure_readable()?;
        Ok(self.registry.lock().unwrap().get(id).cloned())
    }

    async fn list_registry_entries(&self, limit: usize) -> StorageResult<Vec<RegistryEntry>> {
        self.ensure_readable()?;
        Ok(self
            .registry
            .lock()
            .unwrap()
            .values()
            .take(limit)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl RatingLedger for MemoryCatalogStore {
    async fn append_rating(
        &self,
        rating: NewRating,
        update: AggregateUpdate,
    ) -> StorageResult<RatingRecord> {
        let mut state = self.state.lock().unwrap();

        let agent = state
            .agents
            .get_mut(&update.agent_id)
            .ok_or_else(|| StorageError::not_found("agent", update.agent_id.clone()))?;

        let forced = self
            .forced_conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if forced || agent.num_ratings != update.expected_ratings {
            return Err(StorageError::Conflict {
                entity: "agent",
                key: update.agent_id,
            });
        }

        agent.num_ratings = update.num_ratings;
        agent.score_total = Some(update.score_total);
        agent.avg_score = update.avg_score;

        state.next_rating_id += 1;
        let record = RatingRecord::from_new(state.next_rating_id, rating);
        state.ratings.push(record.clone());
        Ok(record)
    }

    async fn list_ratings(
        &self,
        agent_id: &str,
        page: PageRequest,
    ) -> StorageResult<Page<RatingRecord>> {
        self.ensure_readable()?;
        let mut ratings: Vec<RatingRecord> = {
            let state = self.state.lock().unwrap();
            state
                .ratings
                .iter()
                .filter(|r| r.agent_id == agent_id)
                .cloned()
                .collect()
        };
        ratings.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then(b.id.cmp(&a.id)));
        Ok(Page::from_sorted(ratings, page))
    }
}

// ---------------------------------------------------------------------------
// MemoryRecommendationLog
// ---------------------------------------------------------------------------

/// In-memory recommendation log with an availability switch.
#[derive(Debug)]
pub struct MemoryRecommendationLog {
    events: Mutex<Vec<RecommendationEvent>>,
    curated: Mutex<HashMap<String, RecommendedAgent>>,
    available: AtomicBool,
}

impl Default for MemoryRecommendationLog {
    fn default() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
            curated: Mutex::new(HashMap::new()),
            available: AtomicBool::new(true),
        }
    }
}

impl MemoryRecommendationLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate the store going down (or coming back).
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn event_count(&self) -> usize {
        self.events.lock().unwrap().len()
    }

    fn ensure_available(&self) -> StorageResult<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StorageError::Unavailable(
                "recommendation store offline".into(),
            ))
        }
    }
}

#[async_trait]
impl RecommendationLog for MemoryRecommendationLog {
    async fn append_event(
        &self,
        did: &str,
        timestamp: DateTime<Utc>,
    ) -> StorageResult<RecommendationEvent> {
        self.ensure_available()?;
        let event = RecommendationEvent {
            id: Uuid::new_v4().to_string(),
            did: did.to_string(),
            timestamp,
        };
        self.events.lock().unwrap().push(event.clone());
        Ok(event)
    }

    async fn distinct_dids(&self) -> StorageResult<Vec<String>> {
        self.ensure_available()?;
        let events = self.events.lock().unwrap();
        let dids: BTreeSet<String> = events.iter().map(|e| e.did.clone()).collect();
        Ok(dids.into_iter().collect())
    }

    async fn events_for(&self, did: &str) -> StorageResult<Vec<RecommendationEvent>> {
        self.ensure_available()?;
        let mut events: Vec<RecommendationEvent> = self
            .events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.did == did)
            .cloned()
            .collect();
        events.sort_by_key(|e| e.timestamp);
        Ok(events)
    }

    async fn upsert_curated(&self, entry: RecommendedAgent) -> StorageResult<()> {
        self.ensure_available()?;
        self.curated
            .lock()
            .unwrap()
            .insert(entry.did.clone(), entry);
        Ok(())
    }

    async fn remove_curated(&self, did: &str) -> StorageResult<bool> {
        self.ensure_available()?;
        Ok(self.curated.lock().unwrap().remove(did).is_some())
    }

    async fn curated(&self) -> StorageResult<Vec<RecommendedAgent>> {
        self.ensure_available()?;
        let mut entries: Vec<RecommendedAgent> =
            self.curated.lock().unwrap().values().cloned().collect();
        sort_curated(&mut entries);
        Ok(entries)
    }
}
