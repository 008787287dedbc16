//! # hoststore testkit
//!
//! Test utilities for hoststore.
//!
//! This crate provides:
//! - Store fixtures, in memory or file-backed, on a manual clock
//! - Property-based test generators using proptest
//! - A threaded stress harness for conflict behavior
//! - Key, timestamp and record test vectors
//!
//! ## Usage
//!
//! ```rust
//! use hoststore_testkit::prelude::*;
//!
//! let store = TestStore::memory();
//! store.set(&Context::new(), "k", "v", None).unwrap();
//! assert!(store.exists(&Context::new(), "k").unwrap());
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod stress;
pub mod vectors;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::stress::*;
    pub use crate::vectors::*;
    pub use hoststore_core::{Context, CoreError, Store, Ttl};
}

pub use fixtures::*;
pub use generators::*;
pub use stress::*;
pub use vectors::*;
