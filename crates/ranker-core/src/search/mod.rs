//! Semantic search over an offline-built vector index.
//!
//! - `encoder`: text → vector
//! - `index`: exact inner-product search
//! - `artifacts`: on-disk format
//! - `build`: catalog snapshot → artifacts
//! - `engine`: load state machine and query resolution

pub mod artifacts;
pub mod build;
pub mod encoder;
pub mod engine;
pub mod index;

pub use artifacts::{
    load_artifacts, write_artifacts, ArtifactSet, IndexError, IndexManifest, MetadataRecord,
};
pub use build::{agent_text, build_artifacts, BuildReport};
pub use encoder::{encoder_from_config, Encoder, EncoderError, HashingEncoder, HttpEncoder};
pub use engine::{IndexStatus, QueryEngine, SearchHit};
pub use index::{l2_normalize, FlatIpIndex, Neighbor};

pub const DEFAULT_TOP_K: usize = 3;
pub const MAX_TOP_K: usize = 50;
