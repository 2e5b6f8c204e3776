//! # shelfdb Testkit
//!
//! Test utilities for shelfdb.
//!
//! This crate provides:
//! - Isolated factories over memory and file hosts
//! - Helpers that drive the open/upgrade protocol to completion
//! - Property-based test generators using proptest
//! - A model-checking harness for object stores and indexes
//! - Stress testing utilities
//!
//! ## Usage
//!
//! ```rust
//! use shelfdb_testkit::prelude::*;
//!
//! with_temp_factory(|factory| {
//!     let connection = scenarios::library(factory);
//!     assert_eq!(connection.object_store_names(), vec!["books".to_string()]);
//! });
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod integration;
pub mod stress;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::integration::*;
    pub use crate::stress::*;
}

pub use fixtures::*;
pub use generators::*;
pub use integration::*;
pub use stress::*;
