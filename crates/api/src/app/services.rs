//! Infrastructure wiring for the API process.
//!
//! `build_services` assembles the analytics store (in-memory or Postgres,
//! selected by environment), the work queue, the reduction worker, and the
//! executor loop that drives it. Everything hangs off one `Arc<AppServices>`
//! handed to the router as an extension.

use std::sync::Arc;

use uuid::Uuid;

use sparkwatch_infra::{
    AnalyticsStore, EventReducer, InMemoryAnalyticsStore, InMemoryWorkQueue, IngestService,
    PostgresAnalyticsStore, WorkExecutor, WorkExecutorHandle, REDUCE_WORK_KIND,
};
use sparkwatch_infra::work::WorkExecutorConfig;

/// Environment-driven runtime configuration, read once at startup.
#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    pub use_persistent_stores: bool,
    pub database_url: Option<String>,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let use_persistent_stores = std::env::var("USE_PERSISTENT_STORES")
            .unwrap_or_else(|_| "false".to_string())
            .parse::<bool>()
            .unwrap_or(false);

        Self {
            use_persistent_stores,
            database_url: std::env::var("DATABASE_URL").ok(),
        }
    }
}

/// Shared service handles wired at startup.
pub struct AppServices {
    pub store: Arc<dyn AnalyticsStore>,
    pub queue: Arc<InMemoryWorkQueue>,
    pub ingest: IngestService<Arc<dyn AnalyticsStore>, Arc<InMemoryWorkQueue>>,
    /// Keeps the reduction loop alive; dropping it stops the executor.
    pub executor: WorkExecutorHandle,
}

pub async fn build_services(config: AppConfig) -> AppServices {
    let store: Arc<dyn AnalyticsStore> = if config.use_persistent_stores {
        let url = config
            .database_url
            .as_deref()
            .expect("DATABASE_URL must be set when USE_PERSISTENT_STORES=true");
        let pool = sqlx::PgPool::connect(url)
            .await
            .expect("Failed to connect to Postgres");
        let store = PostgresAnalyticsStore::new(pool);
        store
            .ensure_schema()
            .await
            .expect("Failed to create analytics schema");
        tracing::info!("analytics store: postgres");
        Arc::new(store)
    } else {
        tracing::info!("analytics store: in-memory");
        Arc::new(InMemoryAnalyticsStore::new())
    };

    let queue = InMemoryWorkQueue::arc();
    let ingest = IngestService::new(store.clone(), queue.clone());

    // One reducer identity per process so concurrent API instances sharing a
    // database never claim each other's events.
    let reducer = Arc::new(EventReducer::new(
        store.clone(),
        format!("reducer-{}", Uuid::now_v7()),
    ));
    let mut executor = WorkExecutor::new(queue.clone());
    executor.register_handler(REDUCE_WORK_KIND, move |_item| {
        let reducer = reducer.clone();
        async move { reducer.run().await }
    });
    let executor = executor.spawn(WorkExecutorConfig::default().with_name("analytics-reducer"));

    AppServices {
        store,
        queue,
        ingest,
        executor,
    }
}
