//! # Commerce Analytics
//!
//! Aggregation layer for the e-commerce delivery dashboard.
//! Uses DuckDB as an embedded columnar engine over the marketplace export.
//!
//! ## Features
//!
//! - CSV loading with per-field coercion of malformed timestamps
//! - Lowest selling product categories
//! - States with the most distinct sellers
//! - Review score by delivery punctuality
//! - Delay ratio among the highest volume customer states
//! - Headline KPIs, delivery time statistics and join diagnostics

#![forbid(unsafe_code)]
#![warn(clippy::all, missing_docs)]

pub mod engine;
pub mod error;
pub mod queries;
pub mod reports;

pub use engine::{AnalyticsEngine, DatasetFiles, LoadSummary};
pub use error::AnalyticsError;
pub use reports::{ChartMapping, ChartSection, DashboardReport, ReportParams};
