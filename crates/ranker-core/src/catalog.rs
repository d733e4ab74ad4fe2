//! Catalog queries and registry passthrough.

use std::sync::Arc;

use ranker_state::{
    Agent, AgentQuery, CatalogStore, Page, PageRequest, RegistryEntry, StorageError,
    MAX_PAGE_SIZE,
};
use serde_json::Value;
use tracing::{instrument, warn};

use crate::error::{RankerError, Result};
use crate::obs::storage_failure;

pub const DEFAULT_REGISTRY_LIMIT: usize = 10;
pub const MAX_REGISTRY_LIMIT: usize = 50;

/// Reject pages below 1 and page sizes outside `1..=MAX_PAGE_SIZE`.
pub fn validate_page(page: PageRequest) -> Result<()> {
    if page.page < 1 {
        return Err(RankerError::validation("page must be at least 1"));
    }
    if !(1..=MAX_PAGE_SIZE).contains(&page.page_size) {
        return Err(RankerError::validation(format!(
            "page_size must be between 1 and {MAX_PAGE_SIZE}"
        )));
    }
    Ok(())
}

/// Read side of the catalog.
pub struct CatalogService {
    store: Arc<dyn CatalogStore>,
}

impl CatalogService {
    pub fn new(store: Arc<dyn CatalogStore>) -> Self {
        Self { store }
    }

    /// One page of agents, optionally filtered by category.
    #[instrument(skip(self), fields(category = ?query.category, sort_by = %query.sort_by))]
    pub async fn list_agents(&self, query: &AgentQuery) -> Result<Page<Agent>> {
        validate_page(query.page)?;
        let page = self
            .store
            .list_agents(query)
            .await
            .map_err(storage_failure("catalog.list"))?;
        Ok(page.map(present))
    }

    pub async fn get_agent(&self, id: &str) -> Result<Agent> {
        self.store
            .get_agent(id)
            .await
            .map_err(storage_failure("catalog.get"))?
            .map(present)
            .ok_or_else(|| RankerError::not_found("agent", id))
    }

    pub async fn resolve_id_by_did(&self, did: &str) -> Result<Option<String>> {
        self.store
            .resolve_id_by_did(did)
            .await
            .map_err(storage_failure("catalog.resolve_did"))
    }

    /// Insert or replace an agent (ingestion hook).
    pub async fn upsert_agent(&self, agent: Agent) -> Result<()> {
        self.store
            .upsert_agent(agent)
            .await
            .map_err(storage_failure("catalog.upsert"))
    }

    /// Store an opaque registry document (ingestion hook).
    pub async fn put_registry_entry(&self, id: &str, document: Value) -> Result<()> {
        self.store
            .put_registry_entry(RegistryEntry {
                id: id.to_string(),
                full_json: document,
            })
            .await
            .map_err(storage_failure("registry.put"))
    }

    /// The registry document for `id`; it must be a JSON object.
    pub async fn registry_entry(&self, id: &str) -> Result<Value> {
        let entry = self
            .store
            .get_registry_entry(id)
            .await
            .map_err(storage_failure("registry.get"))?
            .ok_or_else(|| RankerError::not_found("registry entry", id))?;
        if !entry.full_json.is_object() {
            return Err(StorageError::InvalidDocument {
                key: id.to_string(),
                reason: "registry document is not a JSON object".to_string(),
            }
            .into());
        }
        Ok(entry.full_json)
    }

    /// Up to `limit` registry documents ordered by id; non-objects are skipped.
    pub async fn registry_entries(&self, limit: usize) -> Result<Vec<Value>> {
        if !(1..=MAX_REGISTRY_LIMIT).contains(&limit) {
            return Err(RankerError::validation(format!(
                "limit must be between 1 and {MAX_REGISTRY_LIMIT}"
            )));
        }
        let entries = self
            .store
            .list_registry_entries(limit)
            .await
            .map_err(storage_failure("registry.list"))?;
        Ok(entries
            .into_iter()
            .filter_map(|e| {
                if e.full_json.is_object() {
                    Some(e.full_json)
                } else {
                    warn!(id = %e.id, "skipping registry entry that is not an object");
                    None
                }
            })
            .collect())
    }
}

/// Agents leave the service with `img_url` rewritten to the served image path.
fn present(mut agent: Agent) -> Agent {
    agent.img_url = agent.image_path();
    agent
}
