//! # Dashboard Configuration
//!
//! Environment-based configuration for the dashboard service.

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;

use commerce_analytics::{DatasetFiles, ReportParams};
use commerce_domain::NullKeyPolicy;

use crate::error::{ApiError, ApiResult};

/// Dashboard service configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Server bind address
    pub server_addr: SocketAddr,

    /// Directory holding the dataset CSV files
    pub data_dir: PathBuf,

    /// File names inside `data_dir`
    pub files: DatasetFiles,

    /// Rows kept by the category and seller rankings
    pub default_limit: usize,

    /// Busiest states considered by the delay ratio ranking
    pub top_n_by_volume: usize,

    /// Treatment of missing category and state keys
    pub null_key_policy: NullKeyPolicy,

    /// Enable GraphQL Playground
    pub enable_playground: bool,

    /// Maximum query depth
    pub max_query_depth: usize,

    /// Maximum query complexity
    pub max_query_complexity: usize,

    /// Logging level
    pub log_level: String,

    /// CORS allowed origins
    pub cors_origins: Vec<String>,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> ApiResult<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> ApiResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = ReportParams::default();

        let server_addr = lookup("SERVER_ADDR")
            .unwrap_or_else(|| "0.0.0.0:8080".to_string())
            .parse()
            .map_err(|e| ApiError::Config(format!("invalid SERVER_ADDR: {e}")))?;

        let null_key_policy = lookup("DASHBOARD_NULL_KEYS")
            .map(|v| v.parse::<NullKeyPolicy>())
            .transpose()?
            .unwrap_or_default();

        let mut files = DatasetFiles::default();
        let overrides = [
            ("ORDERS_FILE", &mut files.orders),
            ("ORDER_ITEMS_FILE", &mut files.order_items),
            ("PRODUCTS_FILE", &mut files.products),
            ("CUSTOMERS_FILE", &mut files.customers),
            ("SELLERS_FILE", &mut files.sellers),
            ("REVIEWS_FILE", &mut files.reviews),
        ];
        for (key, slot) in overrides {
            if let Some(name) = lookup(key) {
                *slot = name;
            }
        }

        Ok(Self {
            server_addr,

            data_dir: lookup("DATA_DIR")
                .map_or_else(|| PathBuf::from("data"), PathBuf::from),

            files,

            default_limit: parse_or(&lookup, "DEFAULT_LIMIT", defaults.limit)?,

            top_n_by_volume: parse_or(&lookup, "TOP_N_BY_VOLUME", defaults.top_n_by_volume)?,

            null_key_policy,

            enable_playground: lookup("ENABLE_PLAYGROUND")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(true),

            max_query_depth: parse_or(&lookup, "MAX_QUERY_DEPTH", 10)?,

            max_query_complexity: parse_or(&lookup, "MAX_QUERY_COMPLEXITY", 1000)?,

            log_level: lookup("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),

            cors_origins: lookup("CORS_ORIGINS")
                .unwrap_or_else(|| "*".to_string())
                .split(',')
                .map(|s| s.trim().to_string())
                .collect(),
        })
    }

    /// Report parameters derived from the configured defaults.
    #[must_use]
    pub fn report_params(&self) -> ReportParams {
        ReportParams {
            limit: self.default_limit,
            top_n_by_volume: self.top_n_by_volume,
            null_key_policy: self.null_key_policy,
        }
    }
}

fn parse_or<F>(lookup: &F, key: &str, default: usize) -> ApiResult<usize>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(value) => value
            .parse()
            .map_err(|e| ApiError::Config(format!("invalid {key} '{value}': {e}"))),
        None => Ok(default),
    }
}
