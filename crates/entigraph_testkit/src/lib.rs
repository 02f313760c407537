//! # EntiGraph Testkit
//!
//! Test utilities for EntiGraph.
//!
//! This crate provides:
//! - Fixture types (accounts, customers, orders) and store helpers
//! - Property-based generators for random object graphs
//! - Stress helpers for concurrent saves and conflicting updates
//!
//! ## Usage
//!
//! ```rust
//! use entigraph_testkit::prelude::*;
//!
//! with_temp_store(|store| {
//!     let saved = store.save(&account(10)).unwrap();
//!     assert_eq!(saved.get("id").as_int(), Some(0));
//! });
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod stress;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::stress::*;
}

pub use fixtures::*;
pub use generators::*;
pub use stress::*;
