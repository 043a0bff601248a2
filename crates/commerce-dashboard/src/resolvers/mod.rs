//! # GraphQL Resolvers Module
//!
//! The dashboard is read-only, so only a query root exists.

pub mod query;

pub use query::QueryRoot;
