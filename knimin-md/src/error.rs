//! Error types for knimin-md
//!
//! Failure classes of a pulldown:
//! - Input errors (unknown external survey) are reported before any work
//! - Data-integrity errors (unknown body site) abort the survey type
//! - Survey export chunk failures abort the whole batch
//! - Geocoder quota exhaustion only ends a backfill run (not an error here)

use crate::services::survey_client::ExportError;
use thiserror::Error;

/// Pulldown pipeline error
#[derive(Debug, Error)]
pub enum PulldownError {
    /// Lookup store error
    #[error(transparent)]
    Store(#[from] knimin_common::Error),

    /// A chunked survey export request failed; no partial result is kept
    #[error("Batched export failed for batch_size={batch_size}: {source}")]
    BatchExport {
        batch_size: usize,
        #[source]
        source: ExportError,
    },

    /// Barcode records a sample site with no body-site lookup entry
    #[error("Unknown body site for barcode {barcode}: {site}")]
    UnknownBodySite { barcode: String, site: String },

    /// Requested external survey is not registered
    #[error("Unknown external survey: {0}")]
    UnknownExternalSurvey(String),

    /// Table serialization failure
    #[error("Output error: {0}")]
    Output(String),
}

impl From<csv::Error> for PulldownError {
    fn from(err: csv::Error) -> Self {
        PulldownError::Output(err.to_string())
    }
}

/// Result type for pulldown operations
pub type Result<T> = std::result::Result<T, PulldownError>;
