//! # Knimin Common Library
//!
//! Shared code for the sample tracking tools:
//! - Error and result types
//! - Bootstrap configuration loading and root folder resolution
//! - Lookup store initialization (SQLite schema)

pub mod config;
pub mod db;
pub mod error;

pub use error::{Error, Result};
