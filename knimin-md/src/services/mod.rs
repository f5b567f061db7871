//! Pulldown pipeline services

pub mod batch_exporter;
pub mod classifier;
pub mod formatter;
pub mod geocode_cache;
pub mod geocoder;
pub mod pulldown;
pub mod survey_client;
