//! knimin-md: metadata pulldown for the American Gut sample tracking store
//!
//! Classifies requested barcodes, exports their survey answers in chunks,
//! geolocates and formats them into one tab-separated table per survey
//! type, and explains every barcode that produced no metadata.

pub mod config;
pub mod db;
pub mod error;
pub mod services;
pub mod table;
pub mod types;

pub use error::{PulldownError, Result};
pub use services::pulldown::{Pulldown, PulldownOptions, PulldownResult};
pub use types::{Cell, FailureReason, Location, Precision, SurveyKind};
