//! Report generation for analytics data.

use std::fmt::Write as _;

use commerce_domain::{
    key_label, CategorySales, DeliveryTimeStats, JoinDiagnostics, KpiSummary, NullKeyPolicy,
    ReviewByDelivery, SellerStateCount, StateDelayRatio,
};
use serde::{Deserialize, Serialize};

use crate::engine::AnalyticsEngine;
use crate::error::{AnalyticsError, Result};
use crate::queries::DEFAULT_LIMIT;

/// Parameters shared by every table of a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportParams {
    /// Rows kept by the category and seller rankings.
    pub limit: usize,
    /// Busiest states considered by the delay ratio ranking.
    pub top_n_by_volume: usize,
    /// Treatment of missing category and state keys.
    pub null_key_policy: NullKeyPolicy,
}

impl Default for ReportParams {
    fn default() -> Self {
        Self {
            limit: DEFAULT_LIMIT,
            top_n_by_volume: DEFAULT_LIMIT,
            null_key_policy: NullKeyPolicy::default(),
        }
    }
}

/// How a table maps onto a horizontal bar chart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChartMapping {
    /// Chart heading.
    pub title: String,
    /// Row field plotted along the bar length.
    pub x_field: String,
    /// Row field labelling each bar.
    pub y_field: String,
    /// Axis caption for the bar length.
    pub x_label: String,
    /// Axis caption for the bars, if the chart shows one.
    pub y_label: Option<String>,
}

impl ChartMapping {
    fn new(title: &str, x_field: &str, y_field: &str, x_label: &str, y_label: Option<&str>) -> Self {
        Self {
            title: title.to_string(),
            x_field: x_field.to_string(),
            y_field: y_field.to_string(),
            x_label: x_label.to_string(),
            y_label: y_label.map(String::from),
        }
    }
}

/// One aggregate table with its chart mapping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartSection<T> {
    /// How `rows` is drawn.
    pub chart: ChartMapping,
    /// Aggregate rows in display order.
    pub rows: Vec<T>,
}

/// Everything the dashboard shows, computed in one pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardReport {
    /// RFC 3339 generation time.
    pub generated_at: String,
    /// Parameters the tables were computed with.
    pub params: ReportParams,
    /// Headline figures.
    pub kpis: KpiSummary,
    /// Categories with the fewest units sold.
    pub low_sales_categories: ChartSection<CategorySales>,
    /// States with the most sellers.
    pub top_seller_states: ChartSection<SellerStateCount>,
    /// Mean review score, on time versus delayed.
    pub delay_vs_review: ChartSection<ReviewByDelivery>,
    /// Delay ratio of the busiest customer states.
    pub state_delay_ratio: ChartSection<StateDelayRatio>,
    /// Delivery time statistics; `None` when nothing was delivered.
    pub delivery_time: Option<DeliveryTimeStats>,
    /// Rows excluded or unresolved by the joins.
    pub diagnostics: JoinDiagnostics,
}

impl AnalyticsEngine {
    /// Generate the complete dashboard report.
    pub fn generate_report(&self, params: ReportParams) -> Result<DashboardReport> {
        let policy = params.null_key_policy;

        let report = DashboardReport {
            generated_at: chrono::Utc::now().to_rfc3339(),
            params,
            kpis: self.kpi_summary()?,
            low_sales_categories: ChartSection {
                chart: ChartMapping::new(
                    "Lowest Selling Product Categories",
                    "total_sales",
                    "category",
                    "Units sold",
                    None,
                ),
                rows: self.low_sales_categories(params.limit, policy)?,
            },
            top_seller_states: ChartSection {
                chart: ChartMapping::new(
                    "States with the Most Sellers",
                    "seller_count",
                    "state",
                    "Sellers",
                    Some("State"),
                ),
                rows: self.top_seller_states(params.limit, policy)?,
            },
            delay_vs_review: ChartSection {
                chart: ChartMapping::new(
                    "Review Score by Delivery Punctuality",
                    "mean_review_score",
                    "status",
                    "Mean review score",
                    None,
                ),
                rows: self.delay_vs_review()?,
            },
            state_delay_ratio: ChartSection {
                chart: ChartMapping::new(
                    "Delay Ratio of the Busiest States",
                    "delay_ratio",
                    "state",
                    "Delay ratio",
                    Some("State"),
                ),
                rows: self.state_delay_ratio(params.top_n_by_volume, policy)?,
            },
            delivery_time: self.delivery_time_stats()?,
            diagnostics: self.join_diagnostics()?,
        };

        tracing::info!(
            limit = params.limit,
            top_n_by_volume = params.top_n_by_volume,
            policy = %policy,
            "Dashboard report generated"
        );

        Ok(report)
    }

    /// Generate report as JSON string.
    pub fn generate_report_json(&self, params: ReportParams) -> Result<String> {
        let report = self.generate_report(params)?;
        report.to_json()
    }

    /// Generate Markdown report.
    pub fn generate_report_markdown(&self, params: ReportParams) -> Result<String> {
        Ok(self.generate_report(params)?.to_markdown())
    }
}

impl DashboardReport {
    /// Serialize as pretty-printed JSON.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| AnalyticsError::Conversion(e.to_string()))
    }

    /// Render every section as Markdown tables.
    #[must_use]
    pub fn to_markdown(&self) -> String {
        // Writing to a String never fails
        let mut md = String::new();
        md.push_str("# E-Commerce Delivery Analytics\n\n");
        let _ = writeln!(md, "**Generated:** {}\n", self.generated_at);

        md.push_str("## Key Figures\n\n");
        md.push_str("| Metric | Value |\n");
        md.push_str("|--------|-------|\n");
        let _ = writeln!(md, "| Total Orders | {} |", self.kpis.total_orders);
        let _ = writeln!(md, "| Delivered Orders | {} |", self.kpis.delivered_orders);
        let _ = writeln!(md, "| Delayed Deliveries | {} |", optional(self.kpis.delay_pct, "%"));
        let _ = writeln!(
            md,
            "| Mean Review Score | {} |",
            optional(self.kpis.mean_review_score, "")
        );
        if let Some(ref stats) = self.delivery_time {
            let _ = writeln!(md, "| Mean Delivery Time | {:.1} days |", stats.mean_days);
            let _ = writeln!(md, "| Median Delivery Time | {:.1} days |", stats.median_days);
        }
        md.push('\n');

        let section = &self.low_sales_categories;
        if !section.rows.is_empty() {
            let _ = writeln!(md, "## {}\n", section.chart.title);
            md.push_str("| Category | Units Sold |\n");
            md.push_str("|----------|------------|\n");
            for row in &section.rows {
                let _ = writeln!(
                    md,
                    "| {} | {} |",
                    key_label(row.category.as_deref()),
                    row.total_sales
                );
            }
            md.push('\n');
        }

        let section = &self.top_seller_states;
        if !section.rows.is_empty() {
            let _ = writeln!(md, "## {}\n", section.chart.title);
            md.push_str("| State | Sellers |\n");
            md.push_str("|-------|---------|\n");
            for row in &section.rows {
                let _ = writeln!(md, "| {} | {} |", key_label(row.state.as_deref()), row.seller_count);
            }
            md.push('\n');
        }

        let section = &self.delay_vs_review;
        if !section.rows.is_empty() {
            let _ = writeln!(md, "## {}\n", section.chart.title);
            md.push_str("| Status | Mean Review Score | Reviews |\n");
            md.push_str("|--------|-------------------|---------|\n");
            for row in &section.rows {
                let _ = writeln!(
                    md,
                    "| {} | {:.2} | {} |",
                    row.status.label(),
                    row.mean_review_score,
                    row.review_count
                );
            }
            md.push('\n');
        }

        let section = &self.state_delay_ratio;
        if !section.rows.is_empty() {
            let _ = writeln!(md, "## {}\n", section.chart.title);
            md.push_str("| State | Orders | Delayed | Delay Ratio |\n");
            md.push_str("|-------|--------|---------|-------------|\n");
            for row in &section.rows {
                let _ = writeln!(
                    md,
                    "| {} | {} | {} | {:.3} |",
                    key_label(row.state.as_deref()),
                    row.total_orders,
                    row.delayed_orders,
                    row.delay_ratio
                );
            }
            md.push('\n');
        }

        md.push_str("---\n");
        let _ = writeln!(
            md,
            "*Excluded by joins: {} undelivered orders, {} deliveries without review, \
             {} deliveries without customer. {} items reference unknown products.*",
            self.diagnostics.undelivered_orders,
            self.diagnostics.deliveries_without_review,
            self.diagnostics.deliveries_without_customer,
            self.diagnostics.items_without_product,
        );

        md
    }
}

fn optional(value: Option<f64>, unit: &str) -> String {
    value.map_or_else(|| "N/A".to_string(), |v| format!("{v:.2}{unit}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use commerce_domain::{Order, OrderItem, Product, Review, Seller};

    #[test]
    fn test_empty_report() {
        let engine = AnalyticsEngine::new_in_memory().unwrap();
        let report = engine.generate_report(ReportParams::default()).unwrap();
        assert!(report.low_sales_categories.rows.is_empty());
        assert!(report.delay_vs_review.rows.is_empty());
        assert!(report.delivery_time.is_none());
        assert_eq!(report.kpis.total_orders, 0);
    }

    #[test]
    fn test_markdown_generation() {
        let engine = AnalyticsEngine::new_in_memory().unwrap();
        engine
            .ingest_seller(&Seller {
                seller_id: "S1".to_string(),
                state: None,
            })
            .unwrap();

        let params = ReportParams {
            null_key_policy: NullKeyPolicy::Keep,
            ..ReportParams::default()
        };
        let md = engine.generate_report_markdown(params).unwrap();
        assert!(md.contains("# E-Commerce Delivery Analytics"));
        assert!(md.contains("## States with the Most Sellers"));
        assert!(md.contains("| (unknown) | 1 |"));
        assert!(md.contains("| Delayed Deliveries | N/A |"));
        assert!(!md.contains("## Review Score by Delivery Punctuality"));
    }

    #[test]
    fn test_default_report_drops_unresolved_categories() {
        let engine = AnalyticsEngine::new_in_memory().unwrap();
        for (id, category) in [("p1", "a"), ("p2", "b")] {
            engine
                .ingest_product(&Product {
                    product_id: id.to_string(),
                    category_name: Some(category.to_string()),
                })
                .unwrap();
        }
        for product in ["p1", "p1", "p2", "p2", "p2", "ghost"] {
            engine
                .ingest_order_item(&OrderItem {
                    order_id: "o".to_string(),
                    product_id: product.to_string(),
                })
                .unwrap();
        }

        let report = engine.generate_report(ReportParams::default()).unwrap();
        assert_eq!(report.params.null_key_policy, NullKeyPolicy::Drop);

        let rows: Vec<_> = report
            .low_sales_categories
            .rows
            .iter()
            .map(|r| (r.category.as_deref(), r.total_sales))
            .collect();
        assert_eq!(rows, vec![(Some("a"), 2), (Some("b"), 3)]);
        assert_eq!(report.diagnostics.items_without_product, 1);
    }

    #[test]
    fn test_json_round_trip() {
        let engine = AnalyticsEngine::new_in_memory().unwrap();
        let purchased = chrono::NaiveDate::from_ymd_opt(2017, 10, 2)
            .unwrap()
            .and_hms_opt(10, 56, 33)
            .unwrap();
        engine
            .ingest_order(&Order {
                order_id: "o1".to_string(),
                customer_id: "c1".to_string(),
                purchase_timestamp: Some(purchased),
                delivered_timestamp: Some(purchased + chrono::Duration::days(8)),
                estimated_delivery_date: Some(purchased + chrono::Duration::days(16)),
            })
            .unwrap();
        engine
            .ingest_review(&Review {
                order_id: "o1".to_string(),
                review_score: Some(4.0),
            })
            .unwrap();

        let json = engine.generate_report_json(ReportParams::default()).unwrap();
        let parsed: DashboardReport = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.delay_vs_review.rows.len(), 1);
        assert_eq!(parsed.delay_vs_review.chart.x_field, "mean_review_score");
        assert_eq!(parsed.delivery_time.unwrap().max_days, 8);
        assert_eq!(parsed.params, ReportParams::default());
    }
}
