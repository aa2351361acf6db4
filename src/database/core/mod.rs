//! Core database infrastructure
//!
//! This module provides the foundational database components used by the runtime:
//! - `ConnectionManager`: lazily opened, tuned-once SQLite connection
//! - `normalize`: migration statement normalization

mod connection;
pub mod normalize;

pub use connection::{
    open_raw, ConnectionManager, StoreHandle, StoreLocation, Tuning, DEFAULT_BUSY_TIMEOUT,
};
pub use normalize::{normalize_statement, normalized_statements};
