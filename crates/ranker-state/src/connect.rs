//! Store connections
//!
//! Both stores (catalog + ledger, recommendations) are SurrealDB instances
//! reached through the `any` engine, so the same code serves `mem://`,
//! `surrealkv://<path>` and `ws(s)://` endpoints.

use surrealdb::engine::any::Any;
use surrealdb::opt::auth::{Database, Root};
use surrealdb::Surreal;
use tracing::{debug, info, instrument};

use crate::error::StateError;
use crate::Result;

/// Login for a remote store.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
    /// Root user (true) or database user (false)
    pub is_root: bool,
}

/// Where a store lives and how to log into it.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// `mem://`, `surrealkv://<path>`, `ws://host:port`, `wss://...`
    pub url: String,
    pub namespace: String,
    pub database: String,
    pub credentials: Option<Credentials>,
}

impl StoreConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            namespace: "ranker".to_string(),
            database: "main".to_string(),
            credentials: None,
        }
    }

    /// Ephemeral in-process store.
    pub fn in_memory() -> Self {
        Self::new("mem://")
    }

    pub fn with_namespace(mut self, ns: impl Into<String>) -> Self {
        self.namespace = ns.into();
        self
    }

    pub fn with_database(mut self, db: impl Into<String>) -> Self {
        self.database = db.into();
        self
    }

    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
        is_root: bool,
    ) -> Self {
        self.credentials = Some(Credentials {
            username: username.into(),
            password: password.into(),
            is_root,
        });
        self
    }

    /// Local directory for `surrealkv://` URLs.
    pub fn local_path(&self) -> Option<&str> {
        self.url.strip_prefix("surrealkv://")
    }
}

/// Open a connection, sign in if needed and select namespace/database.
#[instrument(skip(config), fields(url = %config.url))]
pub async fn connect(config: &StoreConfig) -> Result<Surreal<Any>> {
    if let Some(path) = config.local_path() {
        std::fs::create_dir_all(path).map_err(|e| {
            StateError::Connection(format!(
                "Failed to create database directory {}: {}",
                path, e
            ))
        })?;
    }

    let db = surrealdb::engine::any::connect(config.url.as_str())
        .await
        .map_err(|e| StateError::Connection(format!("Failed to connect to {}: {}", config.url, e)))?;

    if let Some(creds) = &config.credentials {
        if creds.is_root {
            db.signin(Root {
                username: &creds.username,
                password: &creds.password,
            })
            .await
            .map_err(|e| StateError::Connection(format!("Root auth failed: {e}")))?;
        } else {
            db.signin(Database {
                namespace: &config.namespace,
                database: &config.database,
                username: &creds.username,
                password: &creds.password,
            })
            .await
            .map_err(|e| StateError::Connection(format!("DB auth failed: {e}")))?;
        }
        debug!("signed in");
    }

    db.use_ns(config.namespace.as_str())
        .use_db(config.database.as_str())
        .await
        .map_err(|e| StateError::Connection(e.to_string()))?;

    info!(ns = %config.namespace, db = %config.database, "store connected");
    Ok(db)
}
