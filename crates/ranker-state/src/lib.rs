//! ranker-state: SurrealDB persistence for the agent ranker
//!
//! This crate owns every byte written to a database. Two independent store
//! instances are used:
//!
//! - the catalog store: agents, their rating aggregates, the rating ledger and
//!   opaque registry documents
//! - the recommendation store: recommendation events and the curated list
//!
//! ## Key Components
//!
//! - `CatalogStore` / `RatingLedger` / `RecommendationLog`: repository traits
//! - `SurrealCatalogStore` / `SurrealRecommendationLog`: SurrealDB backends
//! - `fakes`: in-memory backends for tests

pub mod connect;
mod error;
pub mod fakes;
mod migrations;
pub mod pagination;
mod schema;
pub mod storage_traits;
pub mod surreal_catalog;
pub mod surreal_recommendations;

pub use connect::{Credentials, StoreConfig};
pub use error::{StateError, StorageError};
pub use pagination::{Page, PageRequest, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
pub use storage_traits::{
    Agent, AgentQuery, AggregateUpdate, CatalogStore, NewRating, RatingLedger, RatingRecord,
    RecommendationEvent, RecommendationLog, RecommendedAgent, RegistryEntry, SortKey,
    StorageResult,
};
pub use surreal_catalog::SurrealCatalogStore;
pub use surreal_recommendations::SurrealRecommendationLog;

/// Result type for ranker-state operations
pub type Result<T> = std::result::Result<T, StateError>;
