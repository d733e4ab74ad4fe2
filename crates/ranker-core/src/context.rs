//! Process-wide application context
//!
//! Built once at startup: connects the catalog store, tries the
//! recommendation store (its absence only disables recommendations), and
//! loads the search index (its absence only disables search).

use std::sync::Arc;

use ranker_state::{
    CatalogStore, RatingLedger, RecommendationLog, SurrealCatalogStore,
    SurrealRecommendationLog,
};
use tracing::{info, warn};

use crate::aggregation::AggregationEngine;
use crate::catalog::CatalogService;
use crate::config::RankerConfig;
use crate::error::{RankerError, Result};
use crate::obs;
use crate::recommendation::RecommendationService;
use crate::search::{
    build_artifacts, encoder_from_config, write_artifacts, BuildReport, Encoder, QueryEngine,
};

pub struct AppContext {
    pub config: RankerConfig,
    pub catalog: CatalogService,
    pub ratings: AggregationEngine,
    pub recommendations: RecommendationService,
    pub search: Arc<QueryEngine>,
    store: Arc<dyn CatalogStore>,
    encoder: Arc<dyn Encoder>,
}

impl AppContext {
    /// Connect stores and load the index described by `config`.
    ///
    /// Fails only when the catalog store is unreachable or the encoder
    /// cannot be built.
    pub async fn init(config: RankerConfig) -> Result<Self> {
        let catalog = SurrealCatalogStore::connect(&config.catalog.store_config())
            .await
            .map_err(|e| RankerError::Storage(e.into()))?;
        let catalog = Arc::new(catalog);

        let recommendations: Option<Arc<dyn RecommendationLog>> =
            match SurrealRecommendationLog::connect(&config.recommendations.store_config()).await {
                Ok(log) => Some(Arc::new(log)),
                Err(e) => {
                    warn!(error = %e, "recommendation store unavailable; recommendations disabled");
                    None
                }
            };

        let encoder = encoder_from_config(&config.embedding)?;
        let search = QueryEngine::load(&config.search.artifacts_dir, Arc::clone(&encoder));
        if !search.is_ready() {
            warn!(status = ?search.status(), "search index not ready; search disabled");
        }

        let ctx = Self::from_parts(
            config,
            catalog.clone(),
            catalog,
            recommendations,
            encoder,
            search,
        );
        info!("application context ready");
        Ok(ctx)
    }

    /// Assemble a context from already constructed parts (tests, embedding).
    pub fn from_parts<S>(
        config: RankerConfig,
        store: Arc<S>,
        ledger: Arc<dyn RatingLedger>,
        recommendations: Option<Arc<dyn RecommendationLog>>,
        encoder: Arc<dyn Encoder>,
        search: QueryEngine,
    ) -> Self
    where
        S: CatalogStore + 'static,
    {
        let store: Arc<dyn CatalogStore> = store;
        Self {
            config,
            catalog: CatalogService::new(Arc::clone(&store)),
            ratings: AggregationEngine::new(Arc::clone(&store), ledger),
            recommendations: RecommendationService::new(Arc::clone(&store), recommendations),
            search: Arc::new(search),
            store,
            encoder,
        }
    }

    /// Snapshot the catalog, encode it and write artifacts to the configured
    /// directory. The running engine keeps serving its loaded index.
    pub async fn build_index(&self) -> Result<BuildReport> {
        let agents = self
            .store
            .all_agents()
            .await
            .map_err(obs::storage_failure("index.snapshot"))?;
        let (set, report) = build_artifacts(&agents, self.encoder.as_ref()).await?;
        write_artifacts(&self.config.search.artifacts_dir, &set)?;
        Ok(report)
    }

    pub fn encoder(&self) -> Arc<dyn Encoder> {
        Arc::clone(&self.encoder)
    }

    /// Release resources. Store connections close when the last handle drops.
    pub async fn shutdown(self) {
        info!(
            search_ready = self.search.is_ready(),
            recommendations = self.recommendations.is_available(),
            "application context shutting down"
        );
    }
}
