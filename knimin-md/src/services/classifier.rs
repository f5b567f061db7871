//! Consent/failure classification
//!
//! Barcodes are tested against a fixed precedence table of disqualifying
//! conditions. Each barcode receives the reason of the first condition it
//! meets and is then removed from the remaining set, so no barcode is
//! reported twice. The classifier only reads the store.

use crate::db::{barcodes, select_barcodes};
use crate::error::Result;
use crate::types::FailureReason;
use sqlx::SqlitePool;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

/// How a precedence step's query selects the failing barcodes
enum Selects {
    /// Query returns barcodes that pass; the rest fail
    Passing(&'static str),
    /// Query returns barcodes that fail
    Failing(&'static str),
}

/// Disqualifying conditions, highest precedence first
const PRECEDENCE: &[(FailureReason, Selects)] = &[
    (
        FailureReason::NotAgBarcode,
        Selects::Passing(
            "SELECT barcode FROM ag_kit_barcodes WHERE barcode IN ({ids}) \
             UNION SELECT barcode FROM ag_handout_barcodes WHERE barcode IN ({ids})",
        ),
    ),
    (
        FailureReason::UnassignedHandout,
        Selects::Passing("SELECT barcode FROM ag_kit_barcodes WHERE barcode IN ({ids})"),
    ),
    (
        FailureReason::Withdrawn,
        Selects::Failing(
            "SELECT barcode FROM ag_kit_barcodes WHERE barcode IN ({ids}) AND withdrawn = 1",
        ),
    ),
    (
        FailureReason::NotLogged,
        Selects::Failing(
            "SELECT barcode FROM ag_kit_barcodes WHERE barcode IN ({ids}) \
             AND (sample_date IS NULL OR TRIM(sample_date) = '')",
        ),
    ),
    (
        FailureReason::Environmental,
        Selects::Failing(
            "SELECT barcode FROM ag_kit_barcodes WHERE barcode IN ({ids}) \
             AND environment_sampled IS NOT NULL AND TRIM(environment_sampled) != ''",
        ),
    ),
    (
        FailureReason::NoConsent,
        Selects::Failing(
            "SELECT barcode FROM ag_kit_barcodes WHERE barcode IN ({ids}) AND survey_id IS NULL",
        ),
    ),
];

/// Assign one failure reason to every barcode
///
/// Barcodes that meet none of the disqualifying conditions are reported as
/// `FailureReason::Unknown`. An empty input never touches the store.
pub async fn classify(
    pool: &SqlitePool,
    barcodes: &BTreeSet<String>,
) -> Result<BTreeMap<String, FailureReason>> {
    let mut failures = BTreeMap::new();
    let mut remaining: BTreeSet<String> = barcodes.clone();

    for (reason, selects) in PRECEDENCE {
        if remaining.is_empty() {
            break;
        }
        let candidates: Vec<String> = remaining.iter().cloned().collect();
        let failing: BTreeSet<String> = match selects {
            Selects::Passing(sql) => {
                let passing = select_barcodes(pool, reason.as_str(), sql, &candidates).await?;
                remaining.difference(&passing).cloned().collect()
            }
            Selects::Failing(sql) => select_barcodes(pool, reason.as_str(), sql, &candidates).await?,
        };

        for barcode in failing {
            if remaining.remove(&barcode) {
                failures.insert(barcode, *reason);
            }
        }
    }

    for barcode in remaining {
        warn!(barcode = %barcode, "Barcode failed pulldown for an unknown reason");
        failures.insert(barcode, FailureReason::Unknown);
    }

    debug!(requested = barcodes.len(), failed = failures.len(), "Classified barcodes");
    Ok(failures)
}

/// Split barcodes into those with consent and the reasons the others lack it
///
/// Consented barcodes are those with a survey link, returned in input order.
pub async fn check_consent(
    pool: &SqlitePool,
    requested: &[String],
) -> Result<(Vec<String>, BTreeMap<String, FailureReason>)> {
    let consented_set = barcodes::get_consented(pool, requested).await?;

    let mut consented = Vec::new();
    let mut failed = BTreeSet::new();
    for barcode in requested {
        if consented_set.contains(barcode) {
            if !consented.contains(barcode) {
                consented.push(barcode.clone());
            }
        } else {
            failed.insert(barcode.clone());
        }
    }

    let failures = classify(pool, &failed).await?;
    Ok((consented, failures))
}
