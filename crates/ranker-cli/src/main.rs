//! Ranker CLI
//!
//! The `ranker` command operates the agent catalog from a terminal.
//!
//! ## Commands
//!
//! - `import`: load agents and registry documents from a JSON file
//! - `agents`: list or show catalog entries
//! - `rate` / `ratings`: submit and list ratings
//! - `search`: semantic search over the built index
//! - `build-index`: encode the catalog and write index artifacts
//! - `recommend` / `curated`: recommendation log and curated list
//! - `registry`: raw registry documents

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use ranker_core::aggregation::RatingInput;
use ranker_core::catalog::DEFAULT_REGISTRY_LIMIT;
use ranker_core::config::LoggingSection;
use ranker_core::telemetry::init_from_config;
use ranker_core::{AppContext, RankerConfig};
use ranker_state::{Agent, AgentQuery, PageRequest, SortKey, DEFAULT_PAGE_SIZE};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "ranker")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Agent catalog ranking and semantic search", long_about = None)]
struct Cli {
    /// Path to the TOML config file
    #[arg(long, global = true, default_value = "ranker.toml", env = "RANKER_CONFIG")]
    config: PathBuf,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load agents and registry documents from a JSON file
    Import {
        /// File with `{"agents": [...], "registry": {"<id>": {...}}}`
        file: PathBuf,
    },

    /// Browse the catalog
    Agents {
        #[command(subcommand)]
        action: AgentsAction,
    },

    /// Rate an agent (1-5)
    Rate {
        /// Agent id, or a DID with --did
        target: String,

        /// Treat TARGET as a DID
        #[arg(long)]
        did: bool,

        #[arg(short, long)]
        score: u8,

        #[arg(short, long)]
        comment: Option<String>,

        #[arg(short, long)]
        user: Option<String>,
    },

    /// List ratings of an agent, newest first
    Ratings {
        /// Agent id, or a DID with --did
        target: String,

        /// Treat TARGET as a DID
        #[arg(long)]
        did: bool,

        #[arg(long, default_value_t = 1)]
        page: u32,

        #[arg(long, default_value_t = DEFAULT_PAGE_SIZE)]
        page_size: u32,
    },

    /// Semantic search over agent names and descriptions
    Search {
        query: String,

        /// Number of results (defaults to `search.default_top_k`)
        #[arg(short = 'k', long)]
        top_k: Option<usize>,
    },

    /// Encode the catalog and write index artifacts
    BuildIndex,

    /// Recommendation log
    Recommend {
        #[command(subcommand)]
        action: RecommendAction,
    },

    /// Curated recommendation list
    Curated {
        #[command(subcommand)]
        action: CuratedAction,
    },

    /// Raw registry documents
    Registry {
        #[command(subcommand)]
        action: RegistryAction,
    },
}

#[derive(Subcommand)]
enum AgentsAction {
    /// One page of agents, best first
    List {
        #[arg(long)]
        category: Option<String>,

        /// avg_score or num_ratings
        #[arg(long, default_value = "avg_score")]
        sort_by: SortKey,

        #[arg(long, default_value_t = 1)]
        page: u32,

        #[arg(long, default_value_t = DEFAULT_PAGE_SIZE)]
        page_size: u32,
    },

    /// Show one agent
    Get { id: String },
}

#[derive(Subcommand)]
enum RecommendAction {
    /// Record a recommendation for a DID
    Add { did: String },

    /// Every DID ever recommended
    List,
}

#[derive(Subcommand)]
enum CuratedAction {
    /// Insert or re-rank an entry
    Set {
        did: String,

        #[arg(short, long, default_value_t = 0)]
        rank: i64,

        #[arg(short, long)]
        note: Option<String>,
    },

    /// Remove an entry
    Remove { did: String },

    /// Show the curated list in rank order
    List,
}

#[derive(Subcommand)]
enum RegistryAction {
    /// Show one registry document
    Get { id: String },

    /// Registry documents ordered by id
    List {
        #[arg(short, long, default_value_t = DEFAULT_REGISTRY_LIMIT)]
        limit: usize,
    },
}

/// `[logging]` with the `--verbose` and `--json` flags applied on top.
fn logging_for(cli: &Cli, configured: &LoggingSection) -> LoggingSection {
    let mut logging = configured.clone();
    if cli.verbose {
        logging.level = "debug".to_string();
    }
    logging.json |= cli.json;
    logging
}

/// Shape of an `import` file.
#[derive(Debug, Default, Deserialize)]
struct ImportFile {
    #[serde(default)]
    agents: Vec<Agent>,
    #[serde(default)]
    registry: BTreeMap<String, Value>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = RankerConfig::load(&cli.config)
        .with_context(|| format!("Failed to load config from {}", cli.config.display()))?;

    init_from_config(&logging_for(&cli, &config.logging));

    if config.catalog.url.starts_with("mem://") {
        warn!("catalog store is in-memory; nothing written by this command will persist");
    }

    let ctx = AppContext::init(config)
        .await
        .context("Failed to initialise ranker")?;

    let result = match cli.command {
        Commands::Import { file } => cmd_import(&ctx, &file).await,
        Commands::Agents { action } => match action {
            AgentsAction::List {
                category,
                sort_by,
                page,
                page_size,
            } => cmd_agents_list(&ctx, category, sort_by, PageRequest::new(page, page_size)).await,
            AgentsAction::Get { id } => cmd_agents_get(&ctx, &id).await,
        },
        Commands::Rate {
            target,
            did,
            score,
            comment,
            user,
        } => {
            let mut input = RatingInput::new(score);
            if let Some(comment) = comment {
                input = input.with_comment(comment);
            }
            if let Some(user) = user {
                input = input.with_user(user);
            }
            cmd_rate(&ctx, &target, did, input).await
        }
        Commands::Ratings {
            target,
            did,
            page,
            page_size,
        } => cmd_ratings(&ctx, &target, did, PageRequest::new(page, page_size)).await,
        Commands::Search { query, top_k } => cmd_search(&ctx, &query, top_k).await,
        Commands::BuildIndex => cmd_build_index(&ctx).await,
        Commands::Recommend { action } => match action {
            RecommendAction::Add { did } => cmd_recommend_add(&ctx, &did).await,
            RecommendAction::List => cmd_recommend_list(&ctx).await,
        },
        Commands::Curated { action } => match action {
            CuratedAction::Set { did, rank, note } => {
                cmd_curated_set(&ctx, &did, rank, note).await
            }
            CuratedAction::Remove { did } => cmd_curated_remove(&ctx, &did).await,
            CuratedAction::List => cmd_curated_list(&ctx).await,
        },
        Commands::Registry { action } => match action {
            RegistryAction::Get { id } => cmd_registry_get(&ctx, &id).await,
            RegistryAction::List { limit } => cmd_registry_list(&ctx, limit).await,
        },
    };

    ctx.shutdown().await;
    result
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn read_import_file(path: &Path) -> Result<ImportFile> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read import file {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("Invalid import file {}", path.display()))
}

/// Load agents and registry documents
async fn cmd_import(ctx: &AppContext, file: &Path) -> Result<()> {
    let import = read_import_file(file)?;
    let agents = import.agents.len();
    let documents = import.registry.len();

    for agent in import.agents {
        let id = agent.id.clone();
        ctx.catalog
            .upsert_agent(agent)
            .await
            .with_context(|| format!("Failed to import agent {id}"))?;
    }
    for (id, document) in import.registry {
        ctx.catalog
            .put_registry_entry(&id, document)
            .await
            .with_context(|| format!("Failed to import registry document {id}"))?;
    }

    info!(agents, documents, "import finished");
    println!("Imported {agents} agents and {documents} registry documents");
    Ok(())
}

async fn cmd_agents_list(
    ctx: &AppContext,
    category: Option<String>,
    sort_by: SortKey,
    page: PageRequest,
) -> Result<()> {
    let query = AgentQuery {
        category,
        sort_by,
        page,
    };
    let result = ctx.catalog.list_agents(&query).await?;

    if result.items.is_empty() {
        println!("No agents on page {} ({} total)", result.page, result.total_items);
        return Ok(());
    }

    for agent in &result.items {
        println!(
            "{:<24} {:>5.2} ({:>4} ratings)  {}",
            agent.id, agent.avg_score, agent.num_ratings, agent.name
        );
    }
    println!();
    println!(
        "Page {}/{} - {} agents",
        result.page,
        page.page_count(result.total_items).max(1),
        result.total_items
    );
    Ok(())
}

async fn cmd_agents_get(ctx: &AppContext, id: &str) -> Result<()> {
    let agent = ctx.catalog.get_agent(id).await?;
    print_json(&agent)
}

async fn cmd_rate(ctx: &AppContext, target: &str, by_did: bool, input: RatingInput) -> Result<()> {
    let record = if by_did {
        ctx.ratings.submit_rating_by_did(target, input).await?
    } else {
        ctx.ratings.submit_rating(target, input).await?
    };
    let agent = ctx.catalog.get_agent(&record.agent_id).await?;

    println!("Rating {} recorded for {}", record.id, record.agent_id);
    println!("  hash:    {}", record.hash);
    println!(
        "  average: {:.2} over {} ratings",
        agent.avg_score, agent.num_ratings
    );
    Ok(())
}

async fn cmd_ratings(
    ctx: &AppContext,
    target: &str,
    by_did: bool,
    page: PageRequest,
) -> Result<()> {
    let result = if by_did {
        ctx.ratings.ratings_for_did(target, page).await?
    } else {
        ctx.ratings.ratings_for_agent(target, page).await?
    };
    print_json(&result)
}

async fn cmd_search(ctx: &AppContext, query: &str, top_k: Option<usize>) -> Result<()> {
    let top_k = top_k.unwrap_or(ctx.config.search.default_top_k);
    let hits = ctx.search.search(query, top_k).await?;

    if hits.is_empty() {
        println!("No matches for '{query}'");
        return Ok(());
    }
    for (rank, hit) in hits.iter().enumerate() {
        println!("{:>2}. {:.4}  {}  {}", rank + 1, hit.score, hit.did, hit.name);
        if !hit.description.is_empty() {
            println!("              {}", hit.description);
        }
    }
    Ok(())
}

async fn cmd_build_index(ctx: &AppContext) -> Result<()> {
    let report = ctx.build_index().await.context("Index build failed")?;

    println!(
        "Indexed {} agents into {}",
        report.indexed,
        ctx.config.search.artifacts_dir.display()
    );
    if !report.skipped.is_empty() {
        println!("Skipped (no text or DID): {}", report.skipped.join(", "));
    }
    Ok(())
}

async fn cmd_recommend_add(ctx: &AppContext, did: &str) -> Result<()> {
    let ack = ctx.recommendations.add_recommendation(did).await?;
    print_json(&ack)
}

async fn cmd_recommend_list(ctx: &AppContext) -> Result<()> {
    let dids = ctx.recommendations.list_recommended_dids().await?;
    if dids.is_empty() {
        println!("No recommendations recorded");
    }
    for did in dids {
        println!("{did}");
    }
    Ok(())
}

async fn cmd_curated_set(
    ctx: &AppContext,
    did: &str,
    rank: i64,
    note: Option<String>,
) -> Result<()> {
    let entry = ctx.recommendations.set_curated(did, rank, note).await?;
    println!("Curated {} at rank {}", entry.did, entry.rank);
    Ok(())
}

async fn cmd_curated_remove(ctx: &AppContext, did: &str) -> Result<()> {
    ctx.recommendations.remove_curated(did).await?;
    println!("Removed {did} from the curated list");
    Ok(())
}

async fn cmd_curated_list(ctx: &AppContext) -> Result<()> {
    let entries = ctx.recommendations.curated().await?;
    if entries.is_empty() {
        println!("Curated list is empty");
    }
    for entry in entries {
        match entry.note {
            Some(note) => println!("{:>4}  {}  ({})", entry.rank, entry.did, note),
            None => println!("{:>4}  {}", entry.rank, entry.did),
        }
    }
    Ok(())
}

async fn cmd_registry_get(ctx: &AppContext, id: &str) -> Result<()> {
    let document = ctx.catalog.registry_entry(id).await?;
    print_json(&document)
}

async fn cmd_registry_list(ctx: &AppContext, limit: usize) -> Result<()> {
    let documents = ctx.catalog.registry_entries(limit).await?;
    print_json(&documents)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use std::io::Write;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn flags_override_logging_section() {
        let configured = LoggingSection {
            json: false,
            level: "warn".to_string(),
        };

        let cli = Cli::try_parse_from(["ranker", "curated", "list"]).unwrap();
        assert_eq!(logging_for(&cli, &configured), configured);

        let cli = Cli::try_parse_from(["ranker", "-v", "--json", "curated", "list"]).unwrap();
        let logging = logging_for(&cli, &configured);
        assert_eq!(logging.level, "debug");
        assert!(logging.json);
    }

    #[test]
    fn parses_rate_by_did() {
        let cli = Cli::try_parse_from([
            "ranker", "rate", "did:masumi:a", "--did", "-s", "4", "-c", "fast",
        ])
        .unwrap();
        match cli.command {
            Commands::Rate {
                target,
                did,
                score,
                comment,
                user,
            } => {
                assert_eq!(target, "did:masumi:a");
                assert!(did);
                assert_eq!(score, 4);
                assert_eq!(comment.as_deref(), Some("fast"));
                assert!(user.is_none());
            }
            _ => panic!("expected rate"),
        }
    }

    #[test]
    fn sort_key_is_parsed_by_name() {
        let cli = Cli::try_parse_from(["ranker", "agents", "list", "--sort-by", "num_ratings"])
            .unwrap();
        match cli.command {
            Commands::Agents {
                action: AgentsAction::List { sort_by, page, .. },
            } => {
                assert_eq!(sort_by, SortKey::NumRatings);
                assert_eq!(page, 1);
            }
            _ => panic!("expected agents list"),
        }

        assert!(Cli::try_parse_from(["ranker", "agents", "list", "--sort-by", "price"]).is_err());
    }

    #[test]
    fn import_file_accepts_partial_documents() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"agents": [{{"id": "a1", "name": "Alpha", "did": "did:a1", "avg_score": 4.5, "num_ratings": 2}}]}}"#
        )
        .unwrap();

        let import = read_import_file(file.path()).unwrap();
        assert_eq!(import.agents.len(), 1);
        assert_eq!(import.agents[0].num_ratings, 2);
        assert!(import.registry.is_empty());
    }

    #[tokio::test]
    async fn import_then_query_in_memory() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = RankerConfig::default();
        config.search.artifacts_dir = dir.path().join("index");
        let ctx = AppContext::init(config).await.unwrap();

        let path = dir.path().join("import.json");
        std::fs::write(
            &path,
            r#"{
                "agents": [
                    {"id": "a1", "name": "Alpha", "did": "did:a1", "category": "Finance"},
                    {"id": "a2", "name": "Beta", "did": "did:a2", "category": "Finance"}
                ],
                "registry": {"a1": {"name": "Alpha", "version": 3}}
            }"#,
        )
        .unwrap();

        cmd_import(&ctx, &path).await.unwrap();
        cmd_rate(&ctx, "did:a2", true, RatingInput::new(5))
            .await
            .unwrap();

        let agent = ctx.catalog.get_agent("a2").await.unwrap();
        assert_eq!(agent.num_ratings, 1);
        assert_eq!(
            ctx.catalog.registry_entry("a1").await.unwrap()["version"],
            3
        );

        cmd_build_index(&ctx).await.unwrap();
        assert!(dir.path().join("index").join("index.json").exists());
    }
}
