//! Lookup store database modules

pub mod init;

pub use init::{create_schema, init_database};
