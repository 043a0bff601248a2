//! # Commerce Dashboard API
//!
//! Request/response shell around the e-commerce aggregation layer.
//!
//! ## Features
//!
//! - **GraphQL**: every aggregate, KPIs and diagnostics, with chart mappings
//! - **Reports**: the whole dashboard as JSON or Markdown over plain HTTP
//! - **Lazy load**: the dataset is read once on first request and kept
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Axum HTTP Server                         │
//! │        (GraphQL Endpoint, Playground, Report Routes)        │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    ApiContext                               │
//! │          (OnceCell<Mutex<AnalyticsEngine>>, defaults)       │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │               DuckDB Analytics Engine                       │
//! │           (CSV tables, deliveries view, queries)            │
//! └─────────────────────────────────────────────────────────────┘
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod context;
pub mod error;
pub mod resolvers;
pub mod schema;

use async_graphql::{EmptyMutation, EmptySubscription, Schema};
use async_graphql_axum::{GraphQLRequest, GraphQLResponse};
use axum::{
    extract::{Query, State},
    http::{header, HeaderValue, Method},
    response::{Html, IntoResponse},
    routing::get,
    Json, Router,
};
use commerce_analytics::ReportParams;
use commerce_domain::{checked_limit, NullKeyPolicy};
use serde::Deserialize;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use config::Config;
pub use context::ApiContext;
pub use error::{ApiError, ApiResult};
pub use resolvers::QueryRoot;

/// GraphQL schema type
pub type ApiSchema = Schema<QueryRoot, EmptyMutation, EmptySubscription>;

/// Build the GraphQL schema with context
pub fn build_schema(ctx: ApiContext, max_depth: usize, max_complexity: usize) -> ApiSchema {
    Schema::build(QueryRoot, EmptyMutation, EmptySubscription)
        .data(ctx)
        .limit_depth(max_depth)
        .limit_complexity(max_complexity)
        .finish()
}

/// Application state for Axum handlers
#[derive(Clone)]
pub struct AppState {
    pub schema: ApiSchema,
    pub ctx: ApiContext,
}

/// GraphQL endpoint handler
pub async fn graphql_handler(
    State(state): State<AppState>,
    req: GraphQLRequest,
) -> GraphQLResponse {
    state.schema.execute(req.into_inner()).await.into()
}

/// GraphQL Playground HTML
pub async fn graphql_playground() -> impl IntoResponse {
    Html(async_graphql::http::playground_source(
        async_graphql::http::GraphQLPlaygroundConfig::new("/graphql"),
    ))
}

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "dataset_loaded": state.ctx.is_loaded(),
    }))
}

/// Optional overrides of the report defaults.
#[derive(Debug, Default, Deserialize)]
pub struct ReportQuery {
    pub limit: Option<i64>,
    pub top_n_by_volume: Option<i64>,
    pub null_keys: Option<String>,
}

impl ReportQuery {
    fn resolve(self, defaults: ReportParams) -> ApiResult<ReportParams> {
        Ok(ReportParams {
            limit: self.limit.map(checked_limit).transpose()?.unwrap_or(defaults.limit),
            top_n_by_volume: self
                .top_n_by_volume
                .map(checked_limit)
                .transpose()?
                .unwrap_or(defaults.top_n_by_volume),
            null_key_policy: self
                .null_keys
                .map(|v| v.parse::<NullKeyPolicy>())
                .transpose()?
                .unwrap_or(defaults.null_key_policy),
        })
    }
}

/// Whole dashboard as JSON
pub async fn report_json(
    State(state): State<AppState>,
    Query(query): Query<ReportQuery>,
) -> ApiResult<impl IntoResponse> {
    let params = query.resolve(state.ctx.params())?;
    let report = state
        .ctx
        .with_engine_query(move |e| e.generate_report(params))
        .await?;
    Ok(Json(report))
}

/// Whole dashboard as Markdown
pub async fn report_markdown(
    State(state): State<AppState>,
    Query(query): Query<ReportQuery>,
) -> ApiResult<impl IntoResponse> {
    let params = query.resolve(state.ctx.params())?;
    let markdown = state
        .ctx
        .with_engine_query(move |e| e.generate_report_markdown(params))
        .await?;
    Ok((
        [(header::CONTENT_TYPE, "text/markdown; charset=utf-8")],
        markdown,
    ))
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    if origins.iter().any(|o| o == "*") {
        return layer.allow_origin(Any);
    }

    let parsed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(v) => Some(v),
            Err(e) => {
                tracing::warn!(origin = %o, error = %e, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    layer.allow_origin(AllowOrigin::list(parsed))
}

/// Build the Axum router
pub fn build_router(schema: ApiSchema, ctx: ApiContext, config: &Config) -> Router {
    let state = AppState { schema, ctx };

    let graphql = if config.enable_playground {
        get(graphql_playground).post(graphql_handler)
    } else {
        axum::routing::post(graphql_handler)
    };

    Router::new()
        // GraphQL endpoint
        .route("/graphql", graphql)
        // Reports
        .route("/report.json", get(report_json))
        .route("/report.md", get(report_markdown))
        // Health check
        .route("/health", get(health_check))
        .route("/", get(|| async { "E-Commerce Delivery Analytics API" }))
        // State and middleware
        .with_state(state)
        .layer(cors_layer(&config.cors_origins))
        .layer(TraceLayer::new_for_http())
}

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use commerce_analytics::AnalyticsEngine;
    use commerce_domain::{Customer, Order};
    use tower::ServiceExt;

    fn test_config() -> Config {
        Config::from_lookup(|_| None).unwrap()
    }

    fn app() -> Router {
        let engine = AnalyticsEngine::new_in_memory().unwrap();
        let at = |d| {
            chrono::NaiveDate::from_ymd_opt(2018, 4, d)
                .unwrap()
                .and_hms_opt(8, 0, 0)
                .unwrap()
        };
        engine
            .ingest_order(&Order {
                order_id: "o1".to_string(),
                customer_id: "c1".to_string(),
                purchase_timestamp: Some(at(1)),
                delivered_timestamp: Some(at(12)),
                estimated_delivery_date: Some(at(10)),
            })
            .unwrap();
        engine
            .ingest_customer(&Customer {
                customer_id: "c1".to_string(),
                state: Some("BA".to_string()),
            })
            .unwrap();

        let config = test_config();
        let ctx = ApiContext::with_engine(engine, config.report_params());
        let schema = build_schema(ctx.clone(), config.max_query_depth, config.max_query_complexity);
        build_router(schema, ctx, &config)
    }

    async fn get_body(app: Router, uri: &str) -> (StatusCode, String) {
        let res = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = res.status();
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn test_health() {
        let (status, body) = get_body(app(), "/health").await;
        assert_eq!(status, StatusCode::OK);
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["dataset_loaded"], true);
    }

    #[tokio::test]
    async fn test_report_markdown() {
        let (status, body) = get_body(app(), "/report.md").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("## Delay Ratio of the Busiest States"));
        assert!(body.contains("| BA | 1 | 1 | 1.000 |"));
    }

    #[tokio::test]
    async fn test_report_json_with_overrides() {
        let (status, body) = get_body(app(), "/report.json?limit=3&null_keys=keep").await;
        assert_eq!(status, StatusCode::OK);
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["params"]["limit"], 3);
        assert_eq!(json["params"]["null_key_policy"], "keep");
        assert_eq!(json["kpis"]["delivered_orders"], 1);
    }

    #[tokio::test]
    async fn test_report_defaults_to_drop() {
        let (status, body) = get_body(app(), "/report.json").await;
        assert_eq!(status, StatusCode::OK);
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["params"]["null_key_policy"], "drop");
    }

    #[tokio::test]
    async fn test_report_rejects_bad_policy() {
        let (status, body) = get_body(app(), "/report.json?null_keys=sometimes").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body.contains("INVALID_INPUT"));
    }
}
