//! # API Context
//!
//! Shared application state: the lazily loaded analytics engine.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use commerce_analytics::error::Result as AnalyticsResult;
use commerce_analytics::{AnalyticsEngine, AnalyticsError, DatasetFiles, ReportParams};
use tokio::sync::OnceCell;

use crate::config::Config;
use crate::error::{ApiError, ApiResult};

/// Application context shared across resolvers and HTTP handlers.
///
/// The dataset is read once, on first use, and kept for the life of the
/// process. Source files are static, so the engine is never reloaded.
#[derive(Clone)]
pub struct ApiContext {
    engine: Arc<OnceCell<Mutex<AnalyticsEngine>>>,
    data_dir: PathBuf,
    files: DatasetFiles,
    params: ReportParams,
}

impl ApiContext {
    /// Create a context that loads the dataset described by `config` lazily.
    pub fn new(config: &Config) -> Self {
        Self {
            engine: Arc::new(OnceCell::new()),
            data_dir: config.data_dir.clone(),
            files: config.files.clone(),
            params: config.report_params(),
        }
    }

    /// Create a context around an engine that is already populated.
    pub fn with_engine(engine: AnalyticsEngine, params: ReportParams) -> Self {
        Self {
            engine: Arc::new(OnceCell::new_with(Some(Mutex::new(engine)))),
            data_dir: PathBuf::new(),
            files: DatasetFiles::default(),
            params,
        }
    }

    /// Default report parameters.
    pub fn params(&self) -> ReportParams {
        self.params
    }

    /// Whether the dataset has been loaded yet.
    pub fn is_loaded(&self) -> bool {
        self.engine.initialized()
    }

    /// Run a read-only query against the engine, loading it first if needed.
    ///
    /// DuckDB calls block, so the query runs on the blocking thread pool and
    /// async workers stay free while it holds the engine lock.
    pub async fn with_engine_query<T, F>(&self, query: F) -> ApiResult<T>
    where
        F: FnOnce(&AnalyticsEngine) -> AnalyticsResult<T> + Send + 'static,
        T: Send + 'static,
    {
        self.ensure_loaded().await?;
        let cell = Arc::clone(&self.engine);

        tokio::task::spawn_blocking(move || {
            let engine = cell
                .get()
                .ok_or_else(|| ApiError::Internal("analytics engine not loaded".to_string()))?;
            let guard = engine
                .lock()
                .map_err(|_| ApiError::Internal("analytics engine lock poisoned".to_string()))?;
            query(&guard).map_err(ApiError::from)
        })
        .await
        .map_err(|e| ApiError::Internal(format!("query task failed: {e}")))?
    }

    async fn ensure_loaded(&self) -> ApiResult<()> {
        self.engine
            .get_or_try_init(|| async {
                let dir = self.data_dir.clone();
                let files = self.files.clone();
                tracing::info!(dir = %dir.display(), "Loading dataset on first request");

                let engine = tokio::task::spawn_blocking(move || {
                    AnalyticsEngine::from_csv_dir(&dir, &files)
                })
                .await
                .map_err(|e| ApiError::Internal(format!("dataset load task failed: {e}")))?
                .map_err(|e| match e {
                    AnalyticsError::MissingInput(path) => {
                        ApiError::DatasetUnavailable(format!("missing {}", path.display()))
                    }
                    other => ApiError::from(other),
                })?;

                Ok(Mutex::new(engine))
            })
            .await
            .map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use commerce_domain::{NullKeyPolicy, Seller};

    #[tokio::test]
    async fn test_prepopulated_engine_is_loaded() {
        let engine = AnalyticsEngine::new_in_memory().unwrap();
        engine
            .ingest_seller(&Seller {
                seller_id: "S1".to_string(),
                state: Some("SP".to_string()),
            })
            .unwrap();

        let ctx = ApiContext::with_engine(engine, ReportParams::default());
        assert!(ctx.is_loaded());

        let policy = ctx.params().null_key_policy;
        let rows = ctx
            .with_engine_query(move |e| e.top_seller_states(10, policy))
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_queries_leave_runtime_responsive() {
        let engine = AnalyticsEngine::new_in_memory().unwrap();
        let ctx = ApiContext::with_engine(engine, ReportParams::default());

        // The first query holds the engine lock on the blocking pool while
        // the single runtime thread keeps polling the second future.
        let slow = ctx.with_engine_query(|e| {
            std::thread::sleep(std::time::Duration::from_millis(100));
            e.kpi_summary()
        });
        let ticker = async {
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            std::time::Instant::now()
        };
        let started = std::time::Instant::now();
        let (kpis, ticked_at) = tokio::join!(slow, ticker);

        assert_eq!(kpis.unwrap().total_orders, 0);
        assert!(ticked_at.duration_since(started) < std::time::Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_concurrent_queries_share_engine() {
        let engine = AnalyticsEngine::new_in_memory().unwrap();
        for (id, state) in [("S1", "SP"), ("S2", "RJ")] {
            engine
                .ingest_seller(&Seller {
                    seller_id: id.to_string(),
                    state: Some(state.to_string()),
                })
                .unwrap();
        }
        let ctx = ApiContext::with_engine(engine, ReportParams::default());

        let (states, kpis) = tokio::join!(
            ctx.with_engine_query(|e| e.top_seller_states(10, NullKeyPolicy::Drop)),
            ctx.with_engine_query(|e| e.kpi_summary()),
        );
        assert_eq!(states.unwrap().len(), 2);
        assert_eq!(kpis.unwrap().total_orders, 0);
    }

    #[tokio::test]
    async fn test_missing_dataset_is_unavailable() {
        let dir = std::env::temp_dir().join("commerce-dashboard-missing-dataset");
        let config = Config::from_lookup(|key| match key {
            "DATA_DIR" => Some(dir.display().to_string()),
            _ => None,
        })
        .unwrap();

        let ctx = ApiContext::new(&config);
        assert!(!ctx.is_loaded());

        let err = ctx.with_engine_query(|e| e.kpi_summary()).await.unwrap_err();
        assert!(matches!(err, ApiError::DatasetUnavailable(_)));
        // A failed load leaves the cell empty so a later request can retry
        assert!(!ctx.is_loaded());
    }
}
