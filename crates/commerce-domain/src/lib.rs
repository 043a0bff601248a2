//! # E-Commerce Delivery Analytics - Domain Model
//!
//! Input entities of the marketplace export, the derived delivery record
//! and the aggregate rows produced by the analytics layer. These types are
//! the single source of truth across all layers: analytics engine, API
//! and report rendering.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Seconds in a calendar day, used for floored day differences.
const SECONDS_PER_DAY: i64 = 86_400;

// =============================================================================
// INPUT ENTITIES
// =============================================================================

/// A customer order as exported by the marketplace.
///
/// Every timestamp is optional: unparseable source values are carried as
/// `None` rather than rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub order_id: String,
    pub customer_id: String,
    pub purchase_timestamp: Option<NaiveDateTime>,
    pub delivered_timestamp: Option<NaiveDateTime>,
    pub estimated_delivery_date: Option<NaiveDateTime>,
}

/// One line item of an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub order_id: String,
    pub product_id: String,
}

/// Product catalogue entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub product_id: String,
    pub category_name: Option<String>,
}

/// Customer with their delivery state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    pub customer_id: String,
    pub state: Option<String>,
}

/// Seller with their registered state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Seller {
    pub seller_id: String,
    pub state: Option<String>,
}

/// Post-delivery review of an order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Review {
    pub order_id: String,
    pub review_score: Option<f64>,
}

// =============================================================================
// DERIVED ENTITIES
// =============================================================================

/// An order that reached the customer, with its delivery metrics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryRecord {
    pub order_id: String,
    pub customer_id: String,
    /// Whole days between purchase and delivery, floored. `None` when the
    /// purchase timestamp is missing.
    pub delivery_time_days: Option<i64>,
    pub is_delayed: bool,
}

impl DeliveryRecord {
    /// Derive a delivery record from an order.
    ///
    /// Returns `None` for orders without a delivered timestamp; those are
    /// never defaulted into the delivery set. A missing estimated date
    /// compares as not delayed.
    #[must_use]
    pub fn from_order(order: &Order) -> Option<Self> {
        let delivered = order.delivered_timestamp?;

        let delivery_time_days = order
            .purchase_timestamp
            .map(|purchased| (delivered - purchased).num_seconds().div_euclid(SECONDS_PER_DAY));

        let is_delayed = order
            .estimated_delivery_date
            .is_some_and(|estimated| delivered > estimated);

        Some(Self {
            order_id: order.order_id.clone(),
            customer_id: order.customer_id.clone(),
            delivery_time_days,
            is_delayed,
        })
    }

    #[must_use]
    pub fn status(&self) -> DeliveryStatus {
        DeliveryStatus::from_delayed(self.is_delayed)
    }
}

// =============================================================================
// ENUMS
// =============================================================================

/// Delivery outcome relative to the estimate quoted at purchase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeliveryStatus {
    OnTime,
    Delayed,
}

impl DeliveryStatus {
    #[must_use]
    pub fn from_delayed(is_delayed: bool) -> Self {
        if is_delayed {
            Self::Delayed
        } else {
            Self::OnTime
        }
    }

    #[must_use]
    pub fn is_delayed(self) -> bool {
        matches!(self, Self::Delayed)
    }

    /// Human readable label used on chart axes.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::OnTime => "On time",
            Self::Delayed => "Delayed",
        }
    }
}

/// How aggregations treat rows whose grouping key is missing.
///
/// Defaults to `Drop`, the way a plain group-by discards null keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NullKeyPolicy {
    /// Missing keys form a single group reported with key `None`.
    Keep,
    /// Rows with a missing key are removed before grouping.
    #[default]
    Drop,
}

impl NullKeyPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Keep => "keep",
            Self::Drop => "drop",
        }
    }
}

impl FromStr for NullKeyPolicy {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "keep" => Ok(Self::Keep),
            "drop" => Ok(Self::Drop),
            other => Err(DomainError::InvalidNullKeyPolicy(other.to_string())),
        }
    }
}

impl fmt::Display for NullKeyPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// AGGREGATE ROWS
// =============================================================================

/// Label used when rendering a missing grouping key.
pub const UNKNOWN_KEY_LABEL: &str = "(unknown)";

/// Render an optional grouping key for display.
#[must_use]
pub fn key_label(key: Option<&str>) -> &str {
    key.unwrap_or(UNKNOWN_KEY_LABEL)
}

/// Convert a caller supplied row limit, rejecting negative values.
pub fn checked_limit(value: i64) -> Result<usize, DomainError> {
    usize::try_from(value).map_err(|_| DomainError::InvalidLimit(value))
}

/// Unit sales of one product category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategorySales {
    pub category: Option<String>,
    pub total_sales: i64,
}

/// Distinct sellers registered in one state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SellerStateCount {
    pub state: Option<String>,
    pub seller_count: i64,
}

/// Mean review score for one delivery status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewByDelivery {
    pub status: DeliveryStatus,
    pub mean_review_score: f64,
    pub review_count: i64,
}

/// Delivered order volume and delay share of one customer state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateDelayRatio {
    pub state: Option<String>,
    pub total_orders: i64,
    pub delayed_orders: i64,
    pub delay_ratio: f64,
}

impl StateDelayRatio {
    /// Build a row, computing the ratio from the two counts.
    ///
    /// A group always holds at least one order, but an empty one yields a
    /// ratio of zero instead of NaN.
    #[must_use]
    pub fn new(state: Option<String>, total_orders: i64, delayed_orders: i64) -> Self {
        let delay_ratio = if total_orders > 0 {
            delayed_orders as f64 / total_orders as f64
        } else {
            0.0
        };
        Self {
            state,
            total_orders,
            delayed_orders,
            delay_ratio,
        }
    }
}

/// Headline figures shown above the charts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KpiSummary {
    /// All orders, delivered or not.
    pub total_orders: i64,
    pub delivered_orders: i64,
    /// Share of delivered orders that arrived late, in percent.
    pub delay_pct: Option<f64>,
    /// Mean score across every scored review.
    pub mean_review_score: Option<f64>,
}

/// Descriptive statistics of delivery time in days.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryTimeStats {
    pub count: i64,
    pub mean_days: f64,
    pub median_days: f64,
    pub std_dev_days: f64,
    pub min_days: i64,
    pub max_days: i64,
}

/// Rows dropped or left unresolved by the joins feeding the aggregates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct JoinDiagnostics {
    /// Orders without a delivered timestamp, excluded from delivery analysis.
    pub undelivered_orders: i64,
    /// Order items whose product is unknown (kept, category unresolved).
    pub items_without_product: i64,
    /// Delivered orders dropped by the review inner join.
    pub deliveries_without_review: i64,
    /// Delivered orders dropped by the customer inner join.
    pub deliveries_without_customer: i64,
}

// =============================================================================
// ERRORS
// =============================================================================

/// Domain-level errors
#[derive(Debug, thiserror::Error)]
pub enum DomainError {
    #[error("Invalid null key policy '{0}', expected 'keep' or 'drop'")]
    InvalidNullKeyPolicy(String),

    #[error("Invalid limit: {0}")]
    InvalidLimit(i64),
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn ts(day: u32, hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2018, 1, day)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
    }

    fn order(delivered: Option<NaiveDateTime>, estimated: Option<NaiveDateTime>) -> Order {
        Order {
            order_id: "o1".to_string(),
            customer_id: "c1".to_string(),
            purchase_timestamp: Some(ts(1, 12)),
            delivered_timestamp: delivered,
            estimated_delivery_date: estimated,
        }
    }

    #[test]
    fn test_undelivered_order_has_no_record() {
        assert!(DeliveryRecord::from_order(&order(None, Some(ts(10, 0)))).is_none());
    }

    #[test]
    fn test_delivery_days_are_floored() {
        // 1 day 23 hours counts as one day
        let record = DeliveryRecord::from_order(&order(Some(ts(3, 11)), Some(ts(10, 0)))).unwrap();
        assert_eq!(record.delivery_time_days, Some(1));
        assert!(!record.is_delayed);
        assert_eq!(record.status(), DeliveryStatus::OnTime);
    }

    #[test]
    fn test_late_delivery_is_delayed() {
        let record = DeliveryRecord::from_order(&order(Some(ts(12, 9)), Some(ts(10, 0)))).unwrap();
        assert!(record.is_delayed);
        assert_eq!(record.delivery_time_days, Some(10));
    }

    #[test]
    fn test_missing_estimate_is_not_delayed() {
        let record = DeliveryRecord::from_order(&order(Some(ts(12, 9)), None)).unwrap();
        assert!(!record.is_delayed);
    }

    #[test]
    fn test_missing_purchase_leaves_days_undefined() {
        let mut o = order(Some(ts(5, 0)), Some(ts(10, 0)));
        o.purchase_timestamp = None;
        let record = DeliveryRecord::from_order(&o).unwrap();
        assert_eq!(record.delivery_time_days, None);
    }

    #[test]
    fn test_null_key_policy_parsing() {
        assert_eq!("keep".parse::<NullKeyPolicy>().unwrap(), NullKeyPolicy::Keep);
        assert_eq!(" DROP ".parse::<NullKeyPolicy>().unwrap(), NullKeyPolicy::Drop);
        assert!("ignore".parse::<NullKeyPolicy>().is_err());
        assert_eq!(NullKeyPolicy::default(), NullKeyPolicy::Drop);
    }

    #[test]
    fn test_state_delay_ratio_bounds() {
        let row = StateDelayRatio::new(Some("SP".to_string()), 4, 1);
        assert!((row.delay_ratio - 0.25).abs() < f64::EPSILON);
        assert_eq!(StateDelayRatio::new(None, 0, 0).delay_ratio, 0.0);
    }

    #[test]
    fn test_status_serializes_screaming_case() {
        let json = serde_json::to_string(&DeliveryStatus::OnTime).unwrap();
        assert_eq!(json, "\"ON_TIME\"");
        assert_eq!(key_label(None), UNKNOWN_KEY_LABEL);
        assert_eq!(key_label(Some("SP")), "SP");
    }

    #[test]
    fn test_checked_limit() {
        assert_eq!(checked_limit(10).unwrap(), 10);
        assert_eq!(checked_limit(0).unwrap(), 0);
        assert!(matches!(checked_limit(-1), Err(DomainError::InvalidLimit(-1))));
    }
}
