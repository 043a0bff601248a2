//! # GraphQL Query Resolver
//!
//! Read operations for the dashboard API.

use async_graphql::{Context, ErrorExtensions, Object, Result};
use commerce_analytics::ReportParams;
use commerce_domain::{self as domain, checked_limit};

use crate::context::ApiContext;
use crate::error::ApiError;
use crate::schema::*;

/// GraphQL Query root
pub struct QueryRoot;

/// Resolve an optional limit argument against the configured default.
fn resolve_limit(limit: Option<i32>, default: usize) -> Result<usize, ApiError> {
    match limit {
        Some(n) => Ok(checked_limit(i64::from(n))?),
        None => Ok(default),
    }
}

fn resolve_policy(policy: Option<NullKeyPolicy>, params: ReportParams) -> domain::NullKeyPolicy {
    policy.map_or(params.null_key_policy, Into::into)
}

#[Object]
impl QueryRoot {
    // =========================================================================
    // AGGREGATES
    // =========================================================================

    /// Product categories with the fewest units sold, ascending
    #[graphql(name = "lowSalesCategories")]
    async fn low_sales_categories(
        &self,
        ctx: &Context<'_>,
        #[graphql(desc = "Rows to return (default from configuration)")]
        limit: Option<i32>,
        #[graphql(desc = "Treatment of unresolved categories")]
        null_keys: Option<NullKeyPolicy>,
    ) -> Result<Vec<CategorySales>> {
        let api_ctx = ctx.data::<ApiContext>()?;
        let params = api_ctx.params();
        let limit = resolve_limit(limit, params.limit).map_err(|e| e.extend())?;
        let policy = resolve_policy(null_keys, params);

        tracing::debug!(limit, %policy, "Fetching low sales categories");

        let rows = api_ctx
            .with_engine_query(move |e| e.low_sales_categories(limit, policy))
            .await
            .map_err(|e| e.extend())?;
        Ok(rows.into_iter().map(CategorySales::from).collect())
    }

    /// States with the most distinct sellers, descending
    #[graphql(name = "topSellerStates")]
    async fn top_seller_states(
        &self,
        ctx: &Context<'_>,
        #[graphql(desc = "Rows to return (default from configuration)")]
        limit: Option<i32>,
        #[graphql(desc = "Treatment of sellers without a state")]
        null_keys: Option<NullKeyPolicy>,
    ) -> Result<Vec<SellerStateCount>> {
        let api_ctx = ctx.data::<ApiContext>()?;
        let params = api_ctx.params();
        let limit = resolve_limit(limit, params.limit).map_err(|e| e.extend())?;
        let policy = resolve_policy(null_keys, params);

        let rows = api_ctx
            .with_engine_query(move |e| e.top_seller_states(limit, policy))
            .await
            .map_err(|e| e.extend())?;
        Ok(rows.into_iter().map(SellerStateCount::from).collect())
    }

    /// Mean review score of on-time versus delayed deliveries
    ///
    /// Returns zero, one or two rows; on-time first.
    #[graphql(name = "delayVsReview")]
    async fn delay_vs_review(&self, ctx: &Context<'_>) -> Result<Vec<ReviewByDelivery>> {
        let api_ctx = ctx.data::<ApiContext>()?;
        let rows = api_ctx
            .with_engine_query(|e| e.delay_vs_review())
            .await
            .map_err(|e| e.extend())?;
        Ok(rows.into_iter().map(ReviewByDelivery::from).collect())
    }

    /// Delay ratio among the busiest customer states, descending
    #[graphql(name = "stateDelayRatio")]
    async fn state_delay_ratio(
        &self,
        ctx: &Context<'_>,
        #[graphql(desc = "Busiest states to consider (default from configuration)")]
        top_n_by_volume: Option<i32>,
        #[graphql(desc = "Treatment of customers without a state")]
        null_keys: Option<NullKeyPolicy>,
    ) -> Result<Vec<StateDelayRatio>> {
        let api_ctx = ctx.data::<ApiContext>()?;
        let params = api_ctx.params();
        let top_n =
            resolve_limit(top_n_by_volume, params.top_n_by_volume).map_err(|e| e.extend())?;
        let policy = resolve_policy(null_keys, params);

        let rows = api_ctx
            .with_engine_query(move |e| e.state_delay_ratio(top_n, policy))
            .await
            .map_err(|e| e.extend())?;
        Ok(rows.into_iter().map(StateDelayRatio::from).collect())
    }

    // =========================================================================
    // SUMMARIES
    // =========================================================================

    /// Headline figures
    async fn kpis(&self, ctx: &Context<'_>) -> Result<Kpis> {
        let api_ctx = ctx.data::<ApiContext>()?;
        let kpis = api_ctx
            .with_engine_query(|e| e.kpi_summary())
            .await
            .map_err(|e| e.extend())?;
        Ok(kpis.into())
    }

    /// Delivery time statistics, null when nothing was delivered
    #[graphql(name = "deliveryTimeStats")]
    async fn delivery_time_stats(&self, ctx: &Context<'_>) -> Result<Option<DeliveryTimeStats>> {
        let api_ctx = ctx.data::<ApiContext>()?;
        let stats = api_ctx
            .with_engine_query(|e| e.delivery_time_stats())
            .await
            .map_err(|e| e.extend())?;
        Ok(stats.map(Into::into))
    }

    /// Rows dropped or left unresolved by the joins
    #[graphql(name = "joinDiagnostics")]
    async fn join_diagnostics(&self, ctx: &Context<'_>) -> Result<JoinDiagnostics> {
        let api_ctx = ctx.data::<ApiContext>()?;
        let diagnostics = api_ctx
            .with_engine_query(|e| e.join_diagnostics())
            .await
            .map_err(|e| e.extend())?;
        Ok(diagnostics.into())
    }

    /// Every dashboard table with its chart mapping
    async fn dashboard(
        &self,
        ctx: &Context<'_>,
        #[graphql(desc = "Rows per ranking (default from configuration)")]
        limit: Option<i32>,
        #[graphql(desc = "Busiest states to consider (default from configuration)")]
        top_n_by_volume: Option<i32>,
        #[graphql(desc = "Treatment of missing keys")]
        null_keys: Option<NullKeyPolicy>,
    ) -> Result<Dashboard> {
        let api_ctx = ctx.data::<ApiContext>()?;
        let defaults = api_ctx.params();
        let params = ReportParams {
            limit: resolve_limit(limit, defaults.limit).map_err(|e| e.extend())?,
            top_n_by_volume: resolve_limit(top_n_by_volume, defaults.top_n_by_volume)
                .map_err(|e| e.extend())?,
            null_key_policy: resolve_policy(null_keys, defaults),
        };

        let report = api_ctx
            .with_engine_query(move |e| e.generate_report(params))
            .await
            .map_err(|e| e.extend())?;
        Ok(report.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build_schema;
    use chrono::NaiveDate;
    use commerce_analytics::AnalyticsEngine;
    use commerce_domain::{Order, Review, Seller};

    fn context() -> ApiContext {
        let engine = AnalyticsEngine::new_in_memory().unwrap();
        for (id, state) in [("S1", Some("SP")), ("S2", Some("SP")), ("S3", Some("PR")), ("S4", None)] {
            engine
                .ingest_seller(&Seller {
                    seller_id: id.to_string(),
                    state: state.map(String::from),
                })
                .unwrap();
        }

        let at = |d| NaiveDate::from_ymd_opt(2018, 2, d).unwrap().and_hms_opt(9, 0, 0).unwrap();
        for (id, delivered, score) in [("o1", 20, 1.0), ("o2", 22, 2.0), ("o3", 5, 5.0)] {
            engine
                .ingest_order(&Order {
                    order_id: id.to_string(),
                    customer_id: format!("c-{id}"),
                    purchase_timestamp: Some(at(1)),
                    delivered_timestamp: Some(at(delivered)),
                    estimated_delivery_date: Some(at(15)),
                })
                .unwrap();
            engine
                .ingest_review(&Review {
                    order_id: id.to_string(),
                    review_score: Some(score),
                })
                .unwrap();
        }

        ApiContext::with_engine(engine, ReportParams::default())
    }

    #[tokio::test]
    async fn test_top_seller_states_query() {
        let schema = build_schema(context(), 10, 1000);
        let res = schema
            .execute("{ topSellerStates(nullKeys: DROP) { state sellerCount } }")
            .await;
        assert!(res.errors.is_empty(), "{:?}", res.errors);

        let data = res.data.into_json().unwrap();
        assert_eq!(
            data,
            serde_json::json!({
                "topSellerStates": [
                    { "state": "SP", "sellerCount": 2 },
                    { "state": "PR", "sellerCount": 1 }
                ]
            })
        );
    }

    #[tokio::test]
    async fn test_null_state_has_label() {
        let schema = build_schema(context(), 10, 1000);
        let res = schema
            .execute("{ topSellerStates(nullKeys: KEEP) { state label } }")
            .await;
        let data = res.data.into_json().unwrap();
        let rows = data["topSellerStates"].as_array().unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[2]["state"], serde_json::Value::Null);
        assert_eq!(rows[2]["label"], "(unknown)");
    }

    #[tokio::test]
    async fn test_delay_vs_review_query() {
        let schema = build_schema(context(), 10, 1000);
        let res = schema
            .execute("{ delayVsReview { status meanReviewScore } }")
            .await;
        let data = res.data.into_json().unwrap();
        assert_eq!(
            data,
            serde_json::json!({
                "delayVsReview": [
                    { "status": "ON_TIME", "meanReviewScore": 5.0 },
                    { "status": "DELAYED", "meanReviewScore": 1.5 }
                ]
            })
        );
    }

    #[tokio::test]
    async fn test_negative_limit_is_rejected() {
        let schema = build_schema(context(), 10, 1000);
        let res = schema.execute("{ lowSalesCategories(limit: -1) { total_sales: totalSales } }").await;
        assert_eq!(res.errors.len(), 1);
        let ext = res.errors[0].extensions.as_ref().unwrap();
        assert_eq!(ext.get("code"), Some(&async_graphql::Value::from("INVALID_INPUT")));
    }

    #[tokio::test]
    async fn test_default_policy_drops_missing_state() {
        let schema = build_schema(context(), 10, 1000);
        let res = schema.execute("{ topSellerStates { state } }").await;
        assert!(res.errors.is_empty(), "{:?}", res.errors);

        let data = res.data.into_json().unwrap();
        let rows = data["topSellerStates"].as_array().unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| !r["state"].is_null()));
    }

    #[tokio::test]
    async fn test_invalid_top_n_carries_status() {
        let schema = build_schema(context(), 10, 1000);
        let res = schema
            .execute("{ stateDelayRatio(topNByVolume: -3) { state } }")
            .await;
        assert_eq!(res.errors.len(), 1);
        let ext = res.errors[0].extensions.as_ref().unwrap();
        assert_eq!(ext.get("code"), Some(&async_graphql::Value::from("INVALID_INPUT")));
        assert_eq!(ext.get("status"), Some(&async_graphql::Value::from(400)));
    }

    #[tokio::test]
    async fn test_dashboard_query() {
        let schema = build_schema(context(), 10, 1000);
        let res = schema
            .execute(
                "{ dashboard(limit: 1) { nullKeyPolicy kpis { totalOrders } \
                   topSellerStates { chart { xField yField } rows { state } } \
                   diagnostics { deliveriesWithoutReview } } }",
            )
            .await;
        assert!(res.errors.is_empty(), "{:?}", res.errors);

        let data = res.data.into_json().unwrap();
        let dashboard = &data["dashboard"];
        assert_eq!(dashboard["nullKeyPolicy"], "DROP");
        assert_eq!(dashboard["kpis"]["totalOrders"], 3);
        assert_eq!(dashboard["topSellerStates"]["chart"]["xField"], "seller_count");
        assert_eq!(dashboard["topSellerStates"]["rows"].as_array().unwrap().len(), 1);
        assert_eq!(dashboard["diagnostics"]["deliveriesWithoutReview"], 0);
    }
}
