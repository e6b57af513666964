use std::{sync::Arc, time::Duration};

use anyhow::Result;

use crate::config::Config;
use crate::database::{get_pool, run_migrations};
use crate::flags::flag_store::FlagStore;
use crate::flags::pg_store::PgFlagStore;
use crate::health::{liveness_loop, HealthRegistry};
use crate::issue_tracker::github::GithubIssueTracker;
use crate::issue_tracker::IssueTracker;
use crate::rules::rule_engine::RuleEngine;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn FlagStore + Send + Sync>,
    pub tracker: Arc<dyn IssueTracker + Send + Sync>,
    pub engine: Arc<RuleEngine>,
    pub liveness: HealthRegistry,
    pub enable_metrics: bool,
}

impl AppState {
    /// Must be called from within a tokio runtime: it spawns the liveness loop.
    pub fn new(
        store: Arc<dyn FlagStore + Send + Sync>,
        tracker: Arc<dyn IssueTracker + Send + Sync>,
        engine: Arc<RuleEngine>,
        enable_metrics: bool,
    ) -> Self {
        let liveness = HealthRegistry::new("liveness");
        let simple_loop = liveness.register("simple_loop".to_string(), Duration::from_secs(30));
        tokio::spawn(liveness_loop(simple_loop));

        Self {
            store,
            tracker,
            engine,
            liveness,
            enable_metrics,
        }
    }

    pub async fn from_config(config: &Config) -> Result<Self> {
        let pool = match get_pool(&config.database_url, config.max_pg_connections).await {
            Ok(pool) => {
                tracing::info!("Successfully created Postgres client");
                pool
            }
            Err(e) => {
                tracing::error!(
                    error = %e,
                    max_connections = config.max_pg_connections,
                    "Failed to create Postgres client"
                );
                return Err(anyhow::anyhow!("Failed to create Postgres client: {}", e));
            }
        };

        if *config.run_migrations {
            run_migrations(&pool).await?;
            tracing::info!("Database migrations applied");
        }

        let tracker = GithubIssueTracker::new(config.github_settings())?;
        if config.github_token.is_empty() {
            tracing::warn!("GITHUB_TOKEN is not set, cleanup requests will fail");
        }

        let engine = RuleEngine::with_default_rules(config.stale_after_days);
        tracing::info!(rules = ?engine.rule_names(), "Expiration rules loaded");

        Ok(Self::new(
            Arc::new(PgFlagStore::from_pool(pool)),
            Arc::new(tracker),
            Arc::new(engine),
            *config.enable_metrics,
        ))
    }
}
