//! SurrealDB schema migrations and initialization
//!
//! Both functions are idempotent (`IF NOT EXISTS`) and run on every connect.

use crate::{Result, StateError};
use surrealdb::engine::any::Any;
use surrealdb::Surreal;
use tracing::{debug, info};

/// Initialize the catalog store: agents, ratings and registry documents.
pub async fn init_catalog_schema(db: &Surreal<Any>) -> Result<()> {
    info!("Initializing catalog schema");

    init_agents_table(db).await?;
    init_ratings_table(db).await?;
    init_registry_table(db).await?;

    info!("catalog schema initialization complete");
    Ok(())
}

/// Initialize the recommendation store.
pub async fn init_recommendation_schema(db: &Surreal<Any>) -> Result<()> {
    info!("Initializing recommendation schema");

    init_recommendation_events_table(db).await?;
    init_recommended_agents_table(db).await?;

    info!("recommendation schema initialization complete");
    Ok(())
}

/// Initialize `agents` table
///
/// Schema:
/// ```text
/// TABLE agents {
///   agent_id:     STRING (unique)
///   name:         STRING
///   category:     STRING? (indexed)
///   description:  STRING
///   did:          STRING (unique)
///   url:          STRING?
///   price_usd:    FLOAT
///   avg_score:    FLOAT (indexed)
///   num_ratings:  INT (indexed)
///   score_total:  FLOAT?
///   img_url:      STRING?
/// }
/// ```
///
/// Aggregates are only written by the rating transaction.
async fn init_agents_table(db: &Surreal<Any>) -> Result<()> {
    debug!("Initializing agents table");

    let sql = r#"
        DEFINE TABLE IF NOT EXISTS agents SCHEMALESS
            PERMISSIONS
                FOR create FULL
                FOR read FULL
                FOR update FULL
                FOR delete FULL;

        DEFINE INDEX IF NOT EXISTS idx_agent_id ON TABLE agents COLUMNS agent_id UNIQUE;
        DEFINE INDEX IF NOT EXISTS idx_agent_did ON TABLE agents COLUMNS did UNIQUE;
        DEFINE INDEX IF NOT EXISTS idx_agent_category ON TABLE agents COLUMNS category;
        DEFINE INDEX IF NOT EXISTS idx_agent_avg_score ON TABLE agents COLUMNS avg_score;
        DEFINE INDEX IF NOT EXISTS idx_agent_num_ratings ON TABLE agents COLUMNS num_ratings;
    "#;

    run_ddl(db, "agents", sql).await?;
    info!("✓ agents table initialized");
    Ok(())
}

/// Initialize `ratings` table
///
/// Schema:
/// ```text
/// TABLE ratings {
///   seq:        INT (unique, monotonic, from counters:ratings)
///   agent_id:   STRING (indexed)
///   user_id:    STRING?
///   score:      INT (1..=5)
///   comment:    STRING
///   timestamp:  STRING (RFC 3339, UTC)
///   hash:       STRING (hex sha256)
/// }
/// ```
///
/// Append-only: updates and deletes are refused.
async fn init_ratings_table(db: &Surreal<Any>) -> Result<()> {
    debug!("Initializing ratings table");

    let sql = r#"
        DEFINE TABLE IF NOT EXISTS ratings SCHEMALESS
            PERMISSIONS
                FOR create FULL
                FOR read FULL
                FOR update NONE
                FOR delete NONE;

        DEFINE INDEX IF NOT EXISTS idx_rating_seq ON TABLE ratings COLUMNS seq UNIQUE;
        DEFINE INDEX IF NOT EXISTS idx_rating_agent ON TABLE ratings COLUMNS agent_id;
        DEFINE INDEX IF NOT EXISTS idx_rating_agent_ts ON TABLE ratings COLUMNS agent_id, timestamp;

        DEFINE TABLE IF NOT EXISTS counters SCHEMALESS;
    "#;

    run_ddl(db, "ratings", sql).await?;
    info!("✓ ratings table initialized");
    Ok(())
}

/// Initialize `registry` table (opaque documents keyed by agent id)
async fn init_registry_table(db: &Surreal<Any>) -> Result<()> {
    debug!("Initializing registry table");

    let sql = r#"
        DEFINE TABLE IF NOT EXISTS registry SCHEMALESS;
        DEFINE INDEX IF NOT EXISTS idx_registry_entry_id ON TABLE registry COLUMNS entry_id UNIQUE;
    "#;

    run_ddl(db, "registry", sql).await?;
    info!("✓ registry table initialized");
    Ok(())
}

/// Initialize `recommendation_events` table
///
/// Schema:
/// ```text
/// TABLE recommendation_events {
///   event_id:   STRING (uuid, unique)
///   did:        STRING (indexed)
///   timestamp:  DATETIME
/// }
/// ```
async fn init_recommendation_events_table(db: &Surreal<Any>) -> Result<()> {
    debug!("Initializing recommendation_events table");

    let sql = r#"
        DEFINE TABLE IF NOT EXISTS recommendation_events SCHEMALESS
            PERMISSIONS
                FOR create FULL
                FOR read FULL
                FOR update NONE
                FOR delete NONE;

        DEFINE INDEX IF NOT EXISTS idx_event_id ON TABLE recommendation_events COLUMNS event_id UNIQUE;
        DEFINE INDEX IF NOT EXISTS idx_event_did ON TABLE recommendation_events COLUMNS did;
    "#;

    run_ddl(db, "recommendation_events", sql).await?;
    info!("✓ recommendation_events table initialized");
    Ok(())
}

/// Initialize `recommended_agents` table (curated list keyed by DID)
async fn init_recommended_agents_table(db: &Surreal<Any>) -> Result<()> {
    debug!("Initializing recommended_agents table");

    let sql = r#"
        DEFINE TABLE IF NOT EXISTS recommended_agents SCHEMALESS;
        DEFINE INDEX IF NOT EXISTS idx_curated_did ON TABLE recommended_agents COLUMNS did UNIQUE;
        DEFINE INDEX IF NOT EXISTS idx_curated_rank ON TABLE recommended_agents COLUMNS rank;
    "#;

    run_ddl(db, "recommended_agents", sql).await?;
    info!("✓ recommended_agents table initialized");
    Ok(())
}

/// Run one table's DDL; any failure is a schema setup error for that table.
async fn run_ddl(db: &Surreal<Any>, table: &str, sql: &str) -> Result<()> {
    let setup = |e: surrealdb::Error| StateError::SchemaSetup(format!("{table}: {e}"));
    db.query(sql).await.map_err(setup)?.check().map_err(setup)?;
    Ok(())
}
