//! Application state management
//!
//! `AppState` bundles the config plus the core component instances (§2's ambient-stack
//! note: "the binary crate wires these ten components into a single `AppState` built at
//! startup"). Each component is constructed once and shared behind `Arc` so handlers can
//! cheaply clone the state out of axum's router.

use std::sync::Arc;

#[cfg(feature = "database")]
use sqlx::PgPool;
use tokio::sync::RwLock;

use crate::config::Config;
use crate::domain::memory_store::InMemoryStore;
use crate::domain::{EngineClient, JobManager, RuleFileManager, TokenAdmissionService};

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    config: Arc<Config>,

    #[cfg(feature = "database")]
    db_pool: Arc<RwLock<Option<PgPool>>>,

    store: Arc<InMemoryStore>,
    rule_file_manager: Arc<RuleFileManager>,
    engine_client: Arc<EngineClient>,
    jobs: Arc<JobManager>,
    tokens: Arc<TokenAdmissionService>,
}

impl AppState {
    /// Build application state from configuration, wiring up every core component.
    ///
    /// `db_pool` is `None` when the database connects lazily or is optional and not
    /// yet available; handlers backed by repositories must tolerate that.
    #[cfg(feature = "database")]
    pub fn new(config: Config, db_pool: Option<PgPool>) -> Self {
        let store = Arc::new(InMemoryStore::new());
        let rule_file_manager = Arc::new(RuleFileManager::new(config.rule_files.clone()));
        let engine_client = Arc::new(EngineClient::new(config.engine.clone()));
        let jobs = Arc::new(JobManager::new(config.jobs.clone()));
        let tokens = Arc::new(TokenAdmissionService::default());

        Self {
            config: Arc::new(config),
            db_pool: Arc::new(RwLock::new(db_pool)),
            store,
            rule_file_manager,
            engine_client,
            jobs,
            tokens,
        }
    }

    #[cfg(not(feature = "database"))]
    pub fn new(config: Config) -> Self {
        let store = Arc::new(InMemoryStore::new());
        let rule_file_manager = Arc::new(RuleFileManager::new(config.rule_files.clone()));
        let engine_client = Arc::new(EngineClient::new(config.engine.clone()));
        let jobs = Arc::new(JobManager::new(config.jobs.clone()));
        let tokens = Arc::new(TokenAdmissionService::default());

        Self {
            config: Arc::new(config),
            store,
            rule_file_manager,
            engine_client,
            jobs,
            tokens,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The in-memory entity store (§1: persistence is out of scope; the binary crate
    /// wires this concrete store so handlers have something to resolve policy against).
    pub fn store(&self) -> &Arc<InMemoryStore> {
        &self.store
    }

    #[cfg(feature = "database")]
    pub async fn db(&self) -> Option<PgPool> {
        self.db_pool.read().await.clone()
    }

    #[cfg(feature = "database")]
    pub async fn set_db(&self, pool: PgPool) {
        *self.db_pool.write().await = Some(pool);
    }

    pub fn rule_file_manager(&self) -> &Arc<RuleFileManager> {
        &self.rule_file_manager
    }

    pub fn engine_client(&self) -> &Arc<EngineClient> {
        &self.engine_client
    }

    pub fn jobs(&self) -> &Arc<JobManager> {
        &self.jobs
    }

    pub fn tokens(&self) -> &Arc<TokenAdmissionService> {
        &self.tokens
    }

    /// Get pool health metrics for the database pool, if configured.
    #[cfg(feature = "database")]
    pub async fn pool_health(&self) -> crate::pool_health::PoolHealthSummary {
        let mut summary = crate::pool_health::PoolHealthSummary::new();
        if let Some(pool) = self.db().await {
            if let Some(db_config) = &self.config.database {
                summary.database = Some(crate::pool_health::DatabasePoolHealth::from_pool(&pool, db_config));
            }
        }
        summary.healthy = summary.is_healthy();
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(feature = "database")]
    #[test]
    fn test_state_new_without_pool() {
        let config = Config::default();
        let state = AppState::new(config, None);
        assert_eq!(state.config().service.name, "aami-server");
    }
}
