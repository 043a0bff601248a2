//! # GraphQL Enum Types
//!
//! Enum definitions for the GraphQL schema.

use async_graphql::Enum;
use commerce_domain as domain;

/// Delivery outcome relative to the estimated date
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Enum)]
#[graphql(rename_items = "SCREAMING_SNAKE_CASE")]
pub enum DeliveryStatus {
    /// Delivered on or before the estimated date
    OnTime,
    /// Delivered after the estimated date
    Delayed,
}

impl From<domain::DeliveryStatus> for DeliveryStatus {
    fn from(s: domain::DeliveryStatus) -> Self {
        match s {
            domain::DeliveryStatus::OnTime => Self::OnTime,
            domain::DeliveryStatus::Delayed => Self::Delayed,
        }
    }
}

/// Treatment of rows whose grouping key is missing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Enum)]
#[graphql(rename_items = "SCREAMING_SNAKE_CASE")]
pub enum NullKeyPolicy {
    /// Missing keys form one group with a null key
    Keep,
    /// Rows with a missing key are excluded
    Drop,
}

impl From<domain::NullKeyPolicy> for NullKeyPolicy {
    fn from(p: domain::NullKeyPolicy) -> Self {
        match p {
            domain::NullKeyPolicy::Keep => Self::Keep,
            domain::NullKeyPolicy::Drop => Self::Drop,
        }
    }
}

impl From<NullKeyPolicy> for domain::NullKeyPolicy {
    fn from(p: NullKeyPolicy) -> Self {
        match p {
            NullKeyPolicy::Keep => Self::Keep,
            NullKeyPolicy::Drop => Self::Drop,
        }
    }
}
