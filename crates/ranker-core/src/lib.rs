//! Ranker Core Library
//!
//! Services over the `ranker-state` stores:
//!
//! - `aggregation`: rating submission and aggregate maintenance
//! - `catalog`: paginated catalog queries and registry passthrough
//! - `recommendation`: recommendation log with catalog validation
//! - `search`: offline index build and semantic query engine
//! - `context`: the process-wide `AppContext`

pub mod aggregation;
pub mod catalog;
pub mod config;
pub mod context;
pub mod error;
pub mod obs;
pub mod recommendation;
pub mod search;
pub mod telemetry;

pub use aggregation::{next_aggregate, rating_hash, round2, AggregationEngine, RatingInput};
pub use catalog::{validate_page, CatalogService};
pub use config::{ConfigError, EmbeddingConfig, EmbeddingProvider, RankerConfig};
pub use context::AppContext;
pub use error::{ErrorKind, RankerError, Result};
pub use recommendation::{RecommendationAck, RecommendationService};
pub use search::{
    build_artifacts, load_artifacts, write_artifacts, Encoder, HashingEncoder, HttpEncoder,
    IndexError, IndexStatus, QueryEngine, SearchHit,
};

pub use ranker_state::{
    Agent, AgentQuery, Page, PageRequest, RatingRecord, RecommendedAgent, SortKey,
};
