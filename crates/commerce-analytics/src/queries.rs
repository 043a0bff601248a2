//! Predefined analytical queries.
//!
//! Each query reads the loaded tables and returns freshly built rows; the
//! engine state is never modified, so repeated calls with the same data
//! return identical results. Ties in every ranking are broken by the
//! grouping key so the ordering is fully deterministic.

use commerce_domain::{
    CategorySales, DeliveryStatus, DeliveryTimeStats, JoinDiagnostics, KpiSummary, NullKeyPolicy,
    ReviewByDelivery, SellerStateCount, StateDelayRatio,
};
use duckdb::params;
use statrs::statistics::{Data, Distribution, Median};

use crate::engine::AnalyticsEngine;
use crate::error::{AnalyticsError, Result};

/// Default number of rows kept by the ranking queries.
pub const DEFAULT_LIMIT: usize = 10;

impl AnalyticsEngine {
    /// Product categories with the fewest units sold, ascending.
    ///
    /// Order items are left-joined to products, so items whose product is
    /// unknown carry no category and are grouped according to `policy`.
    pub fn low_sales_categories(
        &self,
        limit: usize,
        policy: NullKeyPolicy,
    ) -> Result<Vec<CategorySales>> {
        self.category_sales_ranked(Some(limit), policy)
    }

    /// Unit sales of every category, ascending, without truncation.
    pub fn category_sales(&self, policy: NullKeyPolicy) -> Result<Vec<CategorySales>> {
        self.category_sales_ranked(None, policy)
    }

    fn category_sales_ranked(
        &self,
        limit: Option<usize>,
        policy: NullKeyPolicy,
    ) -> Result<Vec<CategorySales>> {
        let query = format!(
            r#"
            SELECT
                p.product_category_name AS category,
                COUNT(*) AS total_sales
            FROM order_items i
            LEFT JOIN products p ON i.product_id = p.product_id
            {filter}
            GROUP BY category
            ORDER BY total_sales ASC, category ASC NULLS LAST
            {limit}
            "#,
            filter = null_filter(policy, "p.product_category_name"),
            limit = limit_clause(limit)?,
        );

        let mut stmt = self.conn.prepare(&query)?;
        let rows = stmt.query_map([], |row| {
            Ok(CategorySales {
                category: row.get(0)?,
                total_sales: row.get(1)?,
            })
        })?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(AnalyticsError::from)
    }

    /// States with the most distinct sellers, descending.
    pub fn top_seller_states(
        &self,
        limit: usize,
        policy: NullKeyPolicy,
    ) -> Result<Vec<SellerStateCount>> {
        self.seller_states_ranked(Some(limit), policy)
    }

    /// Distinct seller count of every state, descending, without truncation.
    pub fn seller_state_counts(&self, policy: NullKeyPolicy) -> Result<Vec<SellerStateCount>> {
        self.seller_states_ranked(None, policy)
    }

    fn seller_states_ranked(
        &self,
        limit: Option<usize>,
        policy: NullKeyPolicy,
    ) -> Result<Vec<SellerStateCount>> {
        let query = format!(
            r#"
            SELECT
                seller_state AS state,
                COUNT(DISTINCT seller_id) AS seller_count
            FROM sellers
            {filter}
            GROUP BY state
            ORDER BY seller_count DESC, state ASC NULLS LAST
            {limit}
            "#,
            filter = null_filter(policy, "seller_state"),
            limit = limit_clause(limit)?,
        );

        let mut stmt = self.conn.prepare(&query)?;
        let rows = stmt.query_map([], |row| {
            Ok(SellerStateCount {
                state: row.get(0)?,
                seller_count: row.get(1)?,
            })
        })?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(AnalyticsError::from)
    }

    /// Mean review score of on-time versus delayed deliveries.
    ///
    /// Deliveries without a review are dropped by the inner join. Returns at
    /// most two rows, on-time first; a status with no scored review is
    /// omitted.
    pub fn delay_vs_review(&self) -> Result<Vec<ReviewByDelivery>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT
                d.is_delayed,
                AVG(r.review_score) AS mean_score,
                COUNT(r.review_score) AS review_count
            FROM deliveries d
            INNER JOIN order_reviews r ON d.order_id = r.order_id
            GROUP BY d.is_delayed
            HAVING COUNT(r.review_score) > 0
            ORDER BY d.is_delayed
            "#,
        )?;

        let rows = stmt.query_map([], |row| {
            Ok(ReviewByDelivery {
                status: DeliveryStatus::from_delayed(row.get(0)?),
                mean_review_score: row.get(1)?,
                review_count: row.get(2)?,
            })
        })?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(AnalyticsError::from)
    }

    /// Delay ratio of the busiest customer states.
    ///
    /// Selection happens in two stages: the `top_n_by_volume` states with
    /// the most delivered orders are kept first, and only that subset is
    /// ranked by delay ratio. A low volume state never appears, whatever
    /// its ratio.
    pub fn state_delay_ratio(
        &self,
        top_n_by_volume: usize,
        policy: NullKeyPolicy,
    ) -> Result<Vec<StateDelayRatio>> {
        let query = format!(
            r#"
            WITH state_delay AS (
                SELECT
                    c.customer_state AS state,
                    COUNT(*) AS total_orders,
                    CAST(SUM(CASE WHEN d.is_delayed THEN 1 ELSE 0 END) AS BIGINT) AS delayed_orders
                FROM deliveries d
                INNER JOIN customers c ON d.customer_id = c.customer_id
                {filter}
                GROUP BY state
            ),
            by_volume AS (
                SELECT *
                FROM state_delay
                ORDER BY total_orders DESC, state ASC NULLS LAST
                LIMIT ?
            )
            SELECT state, total_orders, delayed_orders
            FROM by_volume
            ORDER BY
                CAST(delayed_orders AS DOUBLE) / total_orders DESC,
                total_orders DESC,
                state ASC NULLS LAST
            "#,
            filter = null_filter(policy, "c.customer_state"),
        );

        let mut stmt = self.conn.prepare(&query)?;
        let rows = stmt.query_map(params![to_sql_limit(top_n_by_volume)?], |row| {
            Ok(StateDelayRatio::new(row.get(0)?, row.get(1)?, row.get(2)?))
        })?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(AnalyticsError::from)
    }

    /// Headline KPIs: order volume, delay share and mean review score.
    pub fn kpi_summary(&self) -> Result<KpiSummary> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT
                (SELECT COUNT(*) FROM orders) AS total_orders,
                (SELECT COUNT(*) FROM deliveries) AS delivered_orders,
                (SELECT AVG(CASE WHEN is_delayed THEN 1 ELSE 0 END) * 100 FROM deliveries) AS delay_pct,
                (SELECT AVG(review_score) FROM order_reviews) AS mean_review_score
            "#,
        )?;

        let mut rows = stmt.query([])?;
        let row = rows
            .next()?
            .ok_or_else(|| AnalyticsError::Query("KPI query returned no rows".to_string()))?;

        Ok(KpiSummary {
            total_orders: row.get(0)?,
            delivered_orders: row.get(1)?,
            delay_pct: row.get(2)?,
            mean_review_score: row.get(3)?,
        })
    }

    /// Descriptive statistics of delivery time over delivered orders.
    ///
    /// Returns `None` when no delivered order has a purchase timestamp.
    pub fn delivery_time_stats(&self) -> Result<Option<DeliveryTimeStats>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT delivery_time_days
            FROM deliveries
            WHERE delivery_time_days IS NOT NULL
            ORDER BY delivery_time_days
            "#,
        )?;
        let days = stmt
            .query_map([], |row| row.get::<_, i64>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let (Some(&min_days), Some(&max_days)) = (days.first(), days.last()) else {
            return Ok(None);
        };

        let count = days.len();
        let data = Data::new(days.iter().map(|&d| d as f64).collect::<Vec<_>>());
        let mean_days = data
            .mean()
            .ok_or_else(|| AnalyticsError::Conversion("mean of delivery times".to_string()))?;
        // Sample deviation is undefined for a single observation
        let std_dev_days = data.std_dev().filter(|v| v.is_finite()).unwrap_or(0.0);

        tracing::debug!(count, mean_days, "Computed delivery time statistics");

        Ok(Some(DeliveryTimeStats {
            count: i64::try_from(count)
                .map_err(|e| AnalyticsError::Conversion(e.to_string()))?,
            mean_days,
            median_days: data.median(),
            std_dev_days,
            min_days,
            max_days,
        }))
    }

    /// Count the rows each join drops or leaves unresolved.
    pub fn join_diagnostics(&self) -> Result<JoinDiagnostics> {
        let diagnostics = self.conn.query_row(
            r#"
            SELECT
                (SELECT COUNT(*) FROM orders
                    WHERE order_delivered_customer_date IS NULL),
                (SELECT COUNT(*) FROM order_items i
                    WHERE NOT EXISTS (SELECT 1 FROM products p WHERE p.product_id = i.product_id)),
                (SELECT COUNT(*) FROM deliveries d
                    WHERE NOT EXISTS (SELECT 1 FROM order_reviews r WHERE r.order_id = d.order_id)),
                (SELECT COUNT(*) FROM deliveries d
                    WHERE NOT EXISTS (SELECT 1 FROM customers c WHERE c.customer_id = d.customer_id))
            "#,
            [],
            |row| {
                Ok(JoinDiagnostics {
                    undelivered_orders: row.get(0)?,
                    items_without_product: row.get(1)?,
                    deliveries_without_review: row.get(2)?,
                    deliveries_without_customer: row.get(3)?,
                })
            },
        )?;

        if diagnostics != JoinDiagnostics::default() {
            tracing::debug!(?diagnostics, "Joins dropped or left rows unresolved");
        }

        Ok(diagnostics)
    }
}

/// `WHERE` clause removing NULL keys under [`NullKeyPolicy::Drop`].
fn null_filter(policy: NullKeyPolicy, column: &str) -> String {
    match policy {
        NullKeyPolicy::Keep => String::new(),
        NullKeyPolicy::Drop => format!("WHERE {column} IS NOT NULL"),
    }
}

fn limit_clause(limit: Option<usize>) -> Result<String> {
    Ok(match limit {
        Some(n) => format!("LIMIT {}", to_sql_limit(n)?),
        None => String::new(),
    })
}

fn to_sql_limit(limit: usize) -> Result<i64> {
    i64::try_from(limit)
        .map_err(|_| AnalyticsError::InvalidParameter(format!("limit {limit} out of range")))
}
