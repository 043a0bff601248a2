//! # GraphQL Schema Module
//!
//! GraphQL type system for the dashboard API.

pub mod enums;
pub mod objects;

// Re-export all types
pub use enums::*;
pub use objects::*;
