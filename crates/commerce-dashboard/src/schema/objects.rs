//! # GraphQL Output Types
//!
//! Object type definitions for GraphQL responses.

use async_graphql::SimpleObject;
use commerce_analytics as analytics;
use commerce_domain as domain;

use super::enums::*;

// =============================================================================
// AGGREGATE ROWS
// =============================================================================

/// Units sold in one product category
#[derive(Debug, Clone, SimpleObject)]
pub struct CategorySales {
    /// Category name, null when the product or its category is unknown
    pub category: Option<String>,
    /// Display label, never null
    pub label: String,
    /// Units sold (order item rows)
    pub total_sales: i64,
}

impl From<domain::CategorySales> for CategorySales {
    fn from(row: domain::CategorySales) -> Self {
        Self {
            label: domain::key_label(row.category.as_deref()).to_string(),
            category: row.category,
            total_sales: row.total_sales,
        }
    }
}

/// Distinct sellers in one state
#[derive(Debug, Clone, SimpleObject)]
pub struct SellerStateCount {
    pub state: Option<String>,
    pub label: String,
    pub seller_count: i64,
}

impl From<domain::SellerStateCount> for SellerStateCount {
    fn from(row: domain::SellerStateCount) -> Self {
        Self {
            label: domain::key_label(row.state.as_deref()).to_string(),
            state: row.state,
            seller_count: row.seller_count,
        }
    }
}

/// Mean review score for a delivery status
#[derive(Debug, Clone, SimpleObject)]
pub struct ReviewByDelivery {
    pub status: DeliveryStatus,
    /// Display label of the status
    pub label: String,
    pub mean_review_score: f64,
    /// Reviews contributing to the mean
    pub review_count: i64,
}

impl From<domain::ReviewByDelivery> for ReviewByDelivery {
    fn from(row: domain::ReviewByDelivery) -> Self {
        Self {
            status: row.status.into(),
            label: row.status.label().to_string(),
            mean_review_score: row.mean_review_score,
            review_count: row.review_count,
        }
    }
}

/// Delay share of one customer state
#[derive(Debug, Clone, SimpleObject)]
pub struct StateDelayRatio {
    pub state: Option<String>,
    pub label: String,
    pub total_orders: i64,
    pub delayed_orders: i64,
    /// Delayed share of delivered orders (0.0 - 1.0)
    pub delay_ratio: f64,
}

impl From<domain::StateDelayRatio> for StateDelayRatio {
    fn from(row: domain::StateDelayRatio) -> Self {
        Self {
            label: domain::key_label(row.state.as_deref()).to_string(),
            state: row.state,
            total_orders: row.total_orders,
            delayed_orders: row.delayed_orders,
            delay_ratio: row.delay_ratio,
        }
    }
}

// =============================================================================
// SUMMARY TYPES
// =============================================================================

/// Headline figures
#[derive(Debug, Clone, SimpleObject)]
pub struct Kpis {
    pub total_orders: i64,
    pub delivered_orders: i64,
    /// Delayed share of delivered orders in percent
    pub delay_pct: Option<f64>,
    pub mean_review_score: Option<f64>,
}

impl From<domain::KpiSummary> for Kpis {
    fn from(k: domain::KpiSummary) -> Self {
        Self {
            total_orders: k.total_orders,
            delivered_orders: k.delivered_orders,
            delay_pct: k.delay_pct,
            mean_review_score: k.mean_review_score,
        }
    }
}

/// Delivery time in days
#[derive(Debug, Clone, SimpleObject)]
pub struct DeliveryTimeStats {
    pub count: i64,
    pub mean_days: f64,
    pub median_days: f64,
    pub std_dev_days: f64,
    pub min_days: i64,
    pub max_days: i64,
}

impl From<domain::DeliveryTimeStats> for DeliveryTimeStats {
    fn from(s: domain::DeliveryTimeStats) -> Self {
        Self {
            count: s.count,
            mean_days: s.mean_days,
            median_days: s.median_days,
            std_dev_days: s.std_dev_days,
            min_days: s.min_days,
            max_days: s.max_days,
        }
    }
}

/// Rows dropped or left unresolved by the joins
#[derive(Debug, Clone, SimpleObject)]
pub struct JoinDiagnostics {
    pub undelivered_orders: i64,
    pub items_without_product: i64,
    pub deliveries_without_review: i64,
    pub deliveries_without_customer: i64,
}

impl From<domain::JoinDiagnostics> for JoinDiagnostics {
    fn from(d: domain::JoinDiagnostics) -> Self {
        Self {
            undelivered_orders: d.undelivered_orders,
            items_without_product: d.items_without_product,
            deliveries_without_review: d.deliveries_without_review,
            deliveries_without_customer: d.deliveries_without_customer,
        }
    }
}

// =============================================================================
// DASHBOARD
// =============================================================================

/// Horizontal bar chart mapping of a table
#[derive(Debug, Clone, SimpleObject)]
pub struct ChartMapping {
    pub title: String,
    /// Field plotted along the bar length
    pub x_field: String,
    /// Field labelling each bar
    pub y_field: String,
    pub x_label: String,
    pub y_label: Option<String>,
}

impl From<analytics::ChartMapping> for ChartMapping {
    fn from(c: analytics::ChartMapping) -> Self {
        Self {
            title: c.title,
            x_field: c.x_field,
            y_field: c.y_field,
            x_label: c.x_label,
            y_label: c.y_label,
        }
    }
}

/// Lowest selling categories with their chart
#[derive(Debug, Clone, SimpleObject)]
pub struct CategorySalesSection {
    pub chart: ChartMapping,
    pub rows: Vec<CategorySales>,
}

/// Seller states with their chart
#[derive(Debug, Clone, SimpleObject)]
pub struct SellerStateSection {
    pub chart: ChartMapping,
    pub rows: Vec<SellerStateCount>,
}

/// Review scores by delivery status with their chart
#[derive(Debug, Clone, SimpleObject)]
pub struct ReviewByDeliverySection {
    pub chart: ChartMapping,
    pub rows: Vec<ReviewByDelivery>,
}

/// State delay ratios with their chart
#[derive(Debug, Clone, SimpleObject)]
pub struct StateDelaySection {
    pub chart: ChartMapping,
    pub rows: Vec<StateDelayRatio>,
}

/// Complete dashboard payload
#[derive(Debug, Clone, SimpleObject)]
pub struct Dashboard {
    pub generated_at: String,
    pub null_key_policy: NullKeyPolicy,
    pub kpis: Kpis,
    pub low_sales_categories: CategorySalesSection,
    pub top_seller_states: SellerStateSection,
    pub delay_vs_review: ReviewByDeliverySection,
    pub state_delay_ratio: StateDelaySection,
    pub delivery_time: Option<DeliveryTimeStats>,
    pub diagnostics: JoinDiagnostics,
}

fn rows<T, U: From<T>>(rows: Vec<T>) -> Vec<U> {
    rows.into_iter().map(U::from).collect()
}

impl From<analytics::DashboardReport> for Dashboard {
    fn from(r: analytics::DashboardReport) -> Self {
        Self {
            generated_at: r.generated_at,
            null_key_policy: r.params.null_key_policy.into(),
            kpis: r.kpis.into(),
            low_sales_categories: CategorySalesSection {
                chart: r.low_sales_categories.chart.into(),
                rows: rows(r.low_sales_categories.rows),
            },
            top_seller_states: SellerStateSection {
                chart: r.top_seller_states.chart.into(),
                rows: rows(r.top_seller_states.rows),
            },
            delay_vs_review: ReviewByDeliverySection {
                chart: r.delay_vs_review.chart.into(),
                rows: rows(r.delay_vs_review.rows),
            },
            state_delay_ratio: StateDelaySection {
                chart: r.state_delay_ratio.chart.into(),
                rows: rows(r.state_delay_ratio.rows),
            },
            delivery_time: r.delivery_time.map(Into::into),
            diagnostics: r.diagnostics.into(),
        }
    }
}
