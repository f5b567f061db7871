//! Test Helper Utilities
//!
//! Shared store seeding and mock external services for knimin-md tests

#![allow(dead_code, unused_imports)]

pub mod mocks;
pub mod store;

pub use mocks::{GeocodeAnswer, MockExporter, MockGeocoder};
pub use store::{create_test_db, seed_pulldown_store, tsv_rows};
