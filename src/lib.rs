pub mod browser;
pub mod cache;
pub mod config;
pub mod database;
pub mod errors;
pub mod ledger;
pub mod models;
pub mod monitoring;
pub mod pipeline;
pub mod pool;
pub mod routes;

use std::sync::Arc;

use sqlx::PgPool;

use browser::BrowserBackend;
use cache::ArtifactCache;
use config::Settings;
use ledger::Ledger;
use monitoring::Engine;
use pipeline::Pipeline;
use pool::PoolManager;

/// Everything a route handler needs, shared behind `actix_web::web::Data`.
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub settings: Settings,
    pub pool_manager: Arc<PoolManager>,
    pub ledger: Arc<Ledger>,
    pub pipeline: Arc<Pipeline>,
    pub monitoring: Arc<Engine>,
}

impl AppState {
    pub fn new(db: PgPool, settings: Settings, backend: Arc<dyn BrowserBackend>) -> Self {
        let pool_manager = PoolManager::new(backend, settings.clone(), db.clone());
        let ledger = Arc::new(Ledger::new(db.clone()));
        let cache = ArtifactCache::new(db.clone());
        let monitoring = Engine::new(settings.clone(), db.clone());
        let pipeline = Arc::new(Pipeline::new(
            pool_manager.clone(),
            ledger.clone(),
            cache,
            db.clone(),
            settings.clone(),
        ));

        Self {
            db,
            settings,
            pool_manager,
            ledger,
            pipeline,
            monitoring,
        }
    }

    /// Reload durable state and accept RPCs only after that completes, per
    /// spec §9 ("startup reloads it under a concurrency barrier before
    /// accepting RPCs").
    pub async fn bootstrap(&self) {
        self.pool_manager.bootstrap().await;
    }
}
